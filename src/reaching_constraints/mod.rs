use nalgebra::{DMatrix, DVector, Vector3};
use crate::kinematic_chain::ChainStateSnapshot;
use crate::self_avoidance::AvoidanceConstraintSet;
use crate::utils::utils_errors::ReactError;
use crate::utils::utils_math::{rotation_error, rotation_from_axis_angle_applied_to};

/// Half widths of the constraint bands.
#[derive(Clone, Debug, PartialEq)]
pub struct ReachingTolerances {
    pub position: f64,
    pub orientation: f64,
    pub control_point: f64
}

/// Desired end effector twist `[(p_target - p0) / dt ; log(Rd R0^T) / dt]`, where the target
/// orientation `Rd` is the axis-angle `target[3..6]` applied to the current frame.
pub fn desired_velocity(snapshot: &ChainStateSnapshot, target: &DVector<f64>, dt: f64) -> Result<DVector<f64>, ReactError> {
    if target.len() != 6 {
        return Err(ReactError::new_dimension_mismatch_error("target pose", 6, target.len(), file!(), line!()));
    }
    let p_target = Vector3::new(target[0], target[1], target[2]);
    let axis_angle = Vector3::new(target[3], target[4], target[5]);
    let r_desired = rotation_from_axis_angle_applied_to(&axis_angle, snapshot.r0());
    let lin = (p_target - snapshot.p0()) / dt;
    let ang = rotation_error(&r_desired, snapshot.r0()) / dt;
    Ok(DVector::from_vec(vec![lin[0], lin[1], lin[2], ang[0], ang[1], ang[2]]))
}

/// An auxiliary body point linearized about the snapshot: its current position `p0`, its
/// `3 x k` position Jacobian over the first `k` joints, and where it should be.
#[derive(Clone, Debug)]
pub struct LinearizedControlPoint {
    pub x_desired: Vector3<f64>,
    pub p0: Vector3<f64>,
    pub jacobian: DMatrix<f64>
}
impl LinearizedControlPoint {
    pub fn num_joints(&self) -> usize {
        self.jacobian.ncols()
    }
    /// `x_desired - (p0 + dt J v[0..k])`
    pub fn error(&self, v: &[f64], dt: f64) -> Vector3<f64> {
        let mut predicted = self.p0;
        for j in 0..self.num_joints() {
            for r in 0..3 {
                predicted[r] += dt * self.jacobian[(r, j)] * v[j];
            }
        }
        self.x_desired - predicted
    }
}

#[derive(Clone, Debug, Default)]
struct EvaluationCache {
    x: Option<Vec<f64>>,
    residuals: Vec<f64>,
    jacobian_values: Vec<f64>,
    num_recomputes: usize
}

/// Residuals and sparse Jacobian of all constraint rows, in order: six reaching rows, the
/// optional control point row, and the optional self-avoidance rows.
///
/// Every row except the control point row is affine in `x`, so their Jacobian entries are
/// filled once.  Residuals and the control point entries are recomputed only when the
/// evaluation point changes.
#[derive(Clone, Debug)]
pub struct ConstraintEvaluator {
    num_dofs: usize,
    dt: f64,
    q0: DVector<f64>,
    jacobian: DMatrix<f64>,
    v_des: DVector<f64>,
    control_point: Option<LinearizedControlPoint>,
    avoidance: Option<AvoidanceConstraintSet>,
    structure: Vec<(usize, usize)>,
    control_point_entries: Option<(usize, usize)>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    cache: EvaluationCache
}
impl ConstraintEvaluator {
    pub fn new(snapshot: &ChainStateSnapshot, v_des: DVector<f64>, dt: f64, tolerances: &ReachingTolerances, control_point: Option<LinearizedControlPoint>, avoidance: Option<AvoidanceConstraintSet>) -> Result<Self, ReactError> {
        let d = snapshot.num_dofs();
        if v_des.len() != 6 {
            return Err(ReactError::new_dimension_mismatch_error("desired velocity", 6, v_des.len(), file!(), line!()));
        }
        if let Some(cp) = &control_point {
            if cp.jacobian.nrows() != 3 || cp.num_joints() > d {
                return Err(ReactError::new_dimension_mismatch_error_str(&format!("control point jacobian is {} x {} on a {} dof chain", cp.jacobian.nrows(), cp.num_joints(), d), file!(), line!()));
            }
        }

        let mut structure = vec![];
        let mut values = vec![];
        let mut lower = vec![];
        let mut upper = vec![];

        let jacobian = snapshot.jacobian().clone();
        for k in 0..6 {
            for j in 0..d {
                structure.push((k, j));
                values.push(-jacobian[(k, j)]);
            }
            structure.push((k, d + k));
            values.push(1.0);
            let tol = if k < 3 { tolerances.position } else { tolerances.orientation };
            lower.push(-tol);
            upper.push(tol);
        }

        let mut row = 6;
        let mut control_point_entries = None;
        if let Some(cp) = &control_point {
            control_point_entries = Some((values.len(), cp.num_joints()));
            for j in 0..cp.num_joints() {
                structure.push((row, j));
                values.push(0.0);
            }
            lower.push(0.0);
            upper.push(tolerances.control_point);
            row += 1;
        }

        if let Some(avoidance) = &avoidance {
            for (r, c, val) in avoidance.jacobian_triplets(row, dt) {
                structure.push((r, c));
                values.push(val);
            }
            for avoidance_row in avoidance.rows() {
                lower.push(avoidance_row.lower);
                upper.push(avoidance_row.upper);
            }
        }

        let cache = EvaluationCache { x: None, residuals: vec![0.0; lower.len()], jacobian_values: values, num_recomputes: 0 };

        Ok(Self {
            num_dofs: d,
            dt,
            q0: snapshot.q0().clone(),
            jacobian,
            v_des,
            control_point,
            avoidance,
            structure,
            control_point_entries,
            lower,
            upper,
            cache
        })
    }
    pub fn num_constraints(&self) -> usize {
        self.lower.len()
    }
    pub fn num_nonzeros(&self) -> usize {
        self.structure.len()
    }
    pub fn has_control_point(&self) -> bool {
        self.control_point.is_some()
    }
    pub fn has_avoidance(&self) -> bool {
        self.avoidance.is_some()
    }
    pub fn bounds(&self) -> (&Vec<f64>, &Vec<f64>) {
        (&self.lower, &self.upper)
    }
    pub fn desired_velocity(&self) -> &DVector<f64> {
        &self.v_des
    }
    /// `(row, col)` of every Jacobian nonzero, in the order `jacobian_values` fills them.
    pub fn jacobian_structure(&self) -> &Vec<(usize, usize)> {
        &self.structure
    }
    /// How many times residuals have been recomputed for a new point.
    pub fn num_recomputes(&self) -> usize {
        self.cache.num_recomputes
    }
    pub fn residuals(&mut self, x: &[f64], out: &mut [f64]) {
        self.update_cache(x);
        out.copy_from_slice(&self.cache.residuals);
    }
    pub fn jacobian_values(&mut self, x: &[f64], out: &mut [f64]) {
        self.update_cache(x);
        out.copy_from_slice(&self.cache.jacobian_values);
    }
    fn update_cache(&mut self, x: &[f64]) {
        if let Some(cached) = &self.cache.x {
            if cached.as_slice() == x { return; }
        }

        let d = self.num_dofs;
        let v = &x[0..d];
        let residuals = &mut self.cache.residuals;
        for k in 0..6 {
            let mut jv = 0.0;
            for j in 0..d { jv += self.jacobian[(k, j)] * v[j]; }
            residuals[k] = self.v_des[k] - jv + x[d + k];
        }

        let mut row = 6;
        if let (Some(cp), Some((start, k))) = (&self.control_point, self.control_point_entries) {
            let e = cp.error(v, self.dt);
            residuals[row] = e.dot(&e);
            for j in 0..k {
                let col = Vector3::new(cp.jacobian[(0, j)], cp.jacobian[(1, j)], cp.jacobian[(2, j)]);
                self.cache.jacobian_values[start + j] = -2.0 * self.dt * e.dot(&col);
            }
            row += 1;
        }

        if let Some(avoidance) = &self.avoidance {
            avoidance.residuals(&self.q0, v, self.dt, &mut residuals[row..]);
        }

        self.cache.x = Some(x.to_vec());
        self.cache.num_recomputes += 1;
    }
}
