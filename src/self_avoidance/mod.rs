use nalgebra::DVector;
use serde::{Serialize, Deserialize};
use crate::utils::utils_errors::ReactError;
use crate::utils::utils_math::{deg_to_rad, two_point_line_fit};

/// Calibration of the joint space self-avoidance half-spaces.  Angles are stored in degrees,
/// the form they are measured in on the robot.
///
/// The shoulder complex occupies joints `s, s+1, s+2` and the elbow/forearm joints `s+3, s+4`,
/// with `s = first_shoulder_joint`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelfAvoidanceCalibration {
    pub first_shoulder_joint: usize,
    /// Coefficient of the first cable length row, `c * (q[s] - q[s+1] - q[s+2])`.
    pub cable_coefficient: f64,
    pub cable_length_bounds_deg: (f64, f64),
    /// Bounds of `q[s+1] + q[s+2]`.
    pub cable_sum_bounds_deg: (f64, f64),
    /// Two `(q[s+2], q[s+1])` points on the torso clearance boundary.
    pub shoulder_line_points_deg: [(f64, f64); 2],
    /// Two `(q[s+3], q[s+4])` points on the forearm clearance boundary.
    pub elbow_line_points_deg: [(f64, f64); 2]
}
impl Default for SelfAvoidanceCalibration {
    fn default() -> Self {
        Self {
            first_shoulder_joint: 3,
            cable_coefficient: 1.71,
            cable_length_bounds_deg: (-366.57, 112.42),
            cable_sum_bounds_deg: (-66.6, 213.3),
            shoulder_line_points_deg: [(-37.0, 28.0), (80.0, 23.0)],
            elbow_line_points_deg: [(85.0, 90.0), (105.0, 40.0)]
        }
    }
}
impl SelfAvoidanceCalibration {
    /// Number of joints the rows reach into, counted from the base.
    pub fn required_dofs(&self) -> usize {
        self.first_shoulder_joint + 5
    }
    /// `(m, n)` of `q[s+1] = m * q[s+2] + n`, in radians.
    pub fn shoulder_line(&self) -> (f64, f64) {
        let [(x0, y0), (x1, y1)] = self.shoulder_line_points_deg;
        two_point_line_fit(deg_to_rad(x0), deg_to_rad(y0), deg_to_rad(x1), deg_to_rad(y1))
    }
    /// `(m, n)` of `q[s+4] = m * q[s+3] + n`, in radians.
    pub fn elbow_line(&self) -> (f64, f64) {
        let [(x0, y0), (x1, y1)] = self.elbow_line_points_deg;
        two_point_line_fit(deg_to_rad(x0), deg_to_rad(y0), deg_to_rad(x1), deg_to_rad(y1))
    }
}

/// One affine row `lower <= sum_j c_j * q1_j <= upper` over the predicted joint angles
/// `q1 = q0 + dt * v`.
#[derive(Clone, Debug, PartialEq)]
pub struct AvoidanceRow {
    pub name: &'static str,
    pub coefficients: Vec<(usize, f64)>,
    pub lower: f64,
    pub upper: f64
}
impl AvoidanceRow {
    pub fn evaluate(&self, q0: &DVector<f64>, v: &[f64], dt: f64) -> f64 {
        self.coefficients.iter().map(|(j, c)| c * (q0[*j] + dt * v[*j])).sum()
    }
}

/// The fixed set of linear self-collision approximations: two shoulder cable length rows,
/// torso clearance, and forearm clearance.  Everything is derived once at construction.
#[derive(Clone, Debug)]
pub struct AvoidanceConstraintSet {
    rows: Vec<AvoidanceRow>,
    shoulder_line: (f64, f64),
    elbow_line: (f64, f64)
}
impl AvoidanceConstraintSet {
    pub fn new(calibration: &SelfAvoidanceCalibration, num_dofs: usize) -> Result<Self, ReactError> {
        if calibration.required_dofs() > num_dofs {
            return Err(ReactError::new_dimension_mismatch_error_str(&format!("self avoidance rows reach joint {} but the chain has {} dofs", calibration.required_dofs() - 1, num_dofs), file!(), line!()));
        }

        let s = calibration.first_shoulder_joint;
        let e = s + 3;
        let c = calibration.cable_coefficient;
        let (shou_m, shou_n) = calibration.shoulder_line();
        let (elb_m, elb_n) = calibration.elbow_line();

        let rows = vec![
            AvoidanceRow {
                name: "shoulder cable length",
                coefficients: vec![(s, c), (s + 1, -c), (s + 2, -c)],
                lower: deg_to_rad(calibration.cable_length_bounds_deg.0),
                upper: deg_to_rad(calibration.cable_length_bounds_deg.1)
            },
            AvoidanceRow {
                name: "shoulder cable sum",
                coefficients: vec![(s + 1, 1.0), (s + 2, 1.0)],
                lower: deg_to_rad(calibration.cable_sum_bounds_deg.0),
                upper: deg_to_rad(calibration.cable_sum_bounds_deg.1)
            },
            AvoidanceRow {
                name: "torso clearance",
                coefficients: vec![(s + 1, 1.0), (s + 2, -shou_m)],
                lower: shou_n,
                upper: f64::INFINITY
            },
            AvoidanceRow {
                name: "forearm clearance",
                coefficients: vec![(e, -elb_m), (e + 1, 1.0)],
                lower: f64::NEG_INFINITY,
                upper: elb_n
            }
        ];

        Ok(Self { rows, shoulder_line: (shou_m, shou_n), elbow_line: (elb_m, elb_n) })
    }
    pub fn rows(&self) -> &Vec<AvoidanceRow> {
        &self.rows
    }
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }
    pub fn num_nonzeros(&self) -> usize {
        self.rows.iter().map(|r| r.coefficients.len()).sum()
    }
    pub fn shoulder_line(&self) -> (f64, f64) {
        self.shoulder_line
    }
    pub fn elbow_line(&self) -> (f64, f64) {
        self.elbow_line
    }
    /// Writes one residual per row into `out`.
    pub fn residuals(&self, q0: &DVector<f64>, v: &[f64], dt: f64, out: &mut [f64]) {
        for (row, o) in self.rows.iter().zip(out.iter_mut()) {
            *o = row.evaluate(q0, v, dt);
        }
    }
    /// `(row, col, value)` Jacobian entries with rows counted from `first_row`.  Constant in `v`.
    pub fn jacobian_triplets(&self, first_row: usize, dt: f64) -> Vec<(usize, usize, f64)> {
        let mut out_vec = Vec::with_capacity(self.num_nonzeros());
        for (k, row) in self.rows.iter().enumerate() {
            for (j, c) in &row.coefficients {
                out_vec.push((first_row + k, *j, c * dt));
            }
        }
        out_vec
    }
}
