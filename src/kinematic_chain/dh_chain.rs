use std::f64::consts::FRAC_PI_2;
use nalgebra::{DMatrix, DVector, Matrix4, Vector3};
use serde::{Serialize, Deserialize};
use crate::kinematic_chain::ChainModel;
use crate::utils::utils_console::{react_print, PrintColor, PrintMode};
use crate::utils::utils_errors::ReactError;
use crate::utils::utils_math::{deg_to_rad, rad_to_deg};

/// A revolute link described by standard Denavit-Hartenberg parameters.  Limits are in radians.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DHLink {
    pub a: f64,
    pub d: f64,
    pub alpha: f64,
    pub offset: f64,
    pub min: f64,
    pub max: f64
}
impl DHLink {
    pub fn new(a: f64, d: f64, alpha: f64, offset: f64, min: f64, max: f64) -> Self {
        Self { a, d, alpha, offset, min, max }
    }
    pub fn new_with_limits_in_degrees(a: f64, d: f64, alpha: f64, offset: f64, min_deg: f64, max_deg: f64) -> Self {
        Self::new(a, d, alpha, offset, deg_to_rad(min_deg), deg_to_rad(max_deg))
    }
    /// `Rz(theta + offset) * Tz(d) * Tx(a) * Rx(alpha)`
    pub fn transform(&self, theta: f64) -> Matrix4<f64> {
        let (st, ct) = (theta + self.offset).sin_cos();
        let (sa, ca) = self.alpha.sin_cos();
        return Matrix4::new(
            ct, -st * ca, st * sa, self.a * ct,
            st, ct * ca, -ct * sa, self.a * st,
            0.0, sa, ca, self.d,
            0.0, 0.0, 0.0, 1.0
        );
    }
}

/// Serial chain of revolute DH links with its current joint angles.
///
/// ## Example
/// ```
/// use nalgebra::DVector;
/// use optima_react::kinematic_chain::{ChainModel, DHChain};
///
/// let mut chain = DHChain::new_seven_dof_arm();
/// chain.set_joint_angles(&DVector::from_vec(vec![0.0, 0.5, 0.0, -1.2, 0.0, 0.8, 0.0])).expect("error");
/// let jacobian = chain.geometric_jacobian(None).expect("error");
/// assert_eq!(jacobian.shape(), (6, 7));
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DHChain {
    links: Vec<DHLink>,
    base_transform: Matrix4<f64>,
    joint_angles: DVector<f64>
}
impl DHChain {
    /// Joint angles start at zero clamped into each link's range.
    pub fn new(links: Vec<DHLink>) -> Self {
        Self::new_with_base_transform(links, Matrix4::identity())
    }
    pub fn new_with_base_transform(links: Vec<DHLink>, base_transform: Matrix4<f64>) -> Self {
        let joint_angles = DVector::from_iterator(links.len(), links.iter().map(|l| 0.0_f64.max(l.min).min(l.max)));
        Self { links, base_transform, joint_angles }
    }
    /// Seven joint anthropomorphic arm with spherical shoulder and wrist.
    pub fn new_seven_dof_arm() -> Self {
        let links = vec![
            DHLink::new_with_limits_in_degrees(0.0, 0.34, -FRAC_PI_2, 0.0, -170.0, 170.0),
            DHLink::new_with_limits_in_degrees(0.0, 0.0, FRAC_PI_2, 0.0, -120.0, 120.0),
            DHLink::new_with_limits_in_degrees(0.0, 0.4, FRAC_PI_2, 0.0, -170.0, 170.0),
            DHLink::new_with_limits_in_degrees(0.0, 0.0, -FRAC_PI_2, 0.0, -120.0, 120.0),
            DHLink::new_with_limits_in_degrees(0.0, 0.4, -FRAC_PI_2, 0.0, -170.0, 170.0),
            DHLink::new_with_limits_in_degrees(0.0, 0.0, FRAC_PI_2, 0.0, -120.0, 120.0),
            DHLink::new_with_limits_in_degrees(0.0, 0.126, 0.0, 0.0, -175.0, 175.0)
        ];
        Self::new(links)
    }
    /// Ten joint humanoid chain: three torso joints (pitch, roll, yaw) followed by a seven
    /// joint left arm (three shoulder joints, elbow, forearm pronosupination, two wrist joints).
    /// The shoulder starts at joint 3 and the elbow at joint 6, which is the layout the
    /// self-avoidance calibration assumes by default.
    pub fn new_humanoid_torso_and_arm() -> Self {
        let links = vec![
            DHLink::new_with_limits_in_degrees(0.032, 0.0, FRAC_PI_2, 0.0, -22.0, 84.0),
            DHLink::new_with_limits_in_degrees(0.0, -0.0055, FRAC_PI_2, -FRAC_PI_2, -39.0, 39.0),
            DHLink::new_with_limits_in_degrees(-0.0233647, -0.1433, FRAC_PI_2, deg_to_rad(105.0), -59.0, 59.0),
            DHLink::new_with_limits_in_degrees(0.0, 0.10774, FRAC_PI_2, -FRAC_PI_2, -95.5, 5.0),
            DHLink::new_with_limits_in_degrees(0.0, 0.0, -FRAC_PI_2, -FRAC_PI_2, 0.0, 160.8),
            DHLink::new_with_limits_in_degrees(0.0, 0.15228, -FRAC_PI_2, deg_to_rad(-105.0), -37.0, 100.0),
            DHLink::new_with_limits_in_degrees(-0.015, 0.0, FRAC_PI_2, 0.0, 5.5, 106.0),
            DHLink::new_with_limits_in_degrees(0.0, 0.1373, FRAC_PI_2, -FRAC_PI_2, -50.0, 50.0),
            DHLink::new_with_limits_in_degrees(0.0, 0.0, FRAC_PI_2, FRAC_PI_2, -65.0, 10.0),
            DHLink::new_with_limits_in_degrees(0.0625, -0.016, 0.0, 0.0, -25.0, 25.0)
        ];
        let base_transform = Matrix4::new(
            0.0, -1.0, 0.0, 0.0,
            0.0, 0.0, -1.0, 0.0,
            1.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0
        );
        Self::new_with_base_transform(links, base_transform)
    }
    pub fn links(&self) -> &Vec<DHLink> {
        &self.links
    }
    pub fn joint_angles(&self) -> &DVector<f64> {
        &self.joint_angles
    }
    /// Sets the joint angles, clamping each into its limits.  Returns the clamped angles.
    pub fn set_joint_angles(&mut self, q: &DVector<f64>) -> Result<DVector<f64>, ReactError> {
        if q.len() != self.links.len() {
            return Err(ReactError::new_dimension_mismatch_error("joint angles", self.links.len(), q.len(), file!(), line!()));
        }
        for (i, link) in self.links.iter().enumerate() {
            self.joint_angles[i] = q[i].max(link.min).min(link.max);
        }
        Ok(self.joint_angles.clone())
    }
    /// Frames `0..=d`: entry 0 is the base frame, entry `i + 1` the frame of link `i`.
    pub fn compute_frames(&self) -> Vec<Matrix4<f64>> {
        let mut out_vec = Vec::with_capacity(self.links.len() + 1);
        let mut t = self.base_transform;
        out_vec.push(t);
        for (link, theta) in self.links.iter().zip(self.joint_angles.iter()) {
            t = t * link.transform(*theta);
            out_vec.push(t);
        }
        out_vec
    }
    pub fn print_summary(&self) {
        let frames = self.compute_frames();
        for (i, link) in self.links.iter().enumerate() {
            react_print(&format!("Link {} ---> ", i), PrintMode::Print, PrintColor::Blue, true);
            react_print(&format!("a: {}, d: {}, alpha: {:.4}, offset: {:.4}, range: [{:.2}, {:.2}] deg, angle: {:.2} deg", link.a, link.d, link.alpha, link.offset, rad_to_deg(link.min), rad_to_deg(link.max), rad_to_deg(self.joint_angles[i])), PrintMode::Println, PrintColor::None, false);
            let f = &frames[i + 1];
            react_print(&format!("   > Position: [{:.4}, {:.4}, {:.4}]", f[(0, 3)], f[(1, 3)], f[(2, 3)]), PrintMode::Println, PrintColor::None, false);
        }
    }
}
impl ChainModel for DHChain {
    fn num_dofs(&self) -> usize {
        self.links.len()
    }
    fn joint_limits(&self) -> DMatrix<f64> {
        let mut out = DMatrix::zeros(self.links.len(), 2);
        for (i, link) in self.links.iter().enumerate() {
            out[(i, 0)] = link.min;
            out[(i, 1)] = link.max;
        }
        out
    }
    fn current_joint_angles(&self) -> DVector<f64> {
        self.joint_angles.clone()
    }
    fn end_effector_transform(&self) -> Matrix4<f64> {
        let mut t = self.base_transform;
        for (link, theta) in self.links.iter().zip(self.joint_angles.iter()) {
            t = t * link.transform(*theta);
        }
        t
    }
    fn link_transform(&self, link_idx: usize) -> Result<Matrix4<f64>, ReactError> {
        ReactError::new_check_for_idx_out_of_bound_error(link_idx, self.links.len(), file!(), line!())?;
        let mut t = self.base_transform;
        for i in 0..=link_idx {
            t = t * self.links[i].transform(self.joint_angles[i]);
        }
        Ok(t)
    }
    fn geometric_jacobian(&self, link_idx: Option<usize>) -> Result<DMatrix<f64>, ReactError> {
        if self.links.is_empty() {
            return Err(ReactError::new_generic_error_str("chain has no links", file!(), line!()));
        }
        let last = match link_idx {
            None => { self.links.len() - 1 }
            Some(idx) => {
                ReactError::new_check_for_idx_out_of_bound_error(idx, self.links.len(), file!(), line!())?;
                idx
            }
        };

        let frames = self.compute_frames();
        let tip = &frames[last + 1];
        let p = Vector3::new(tip[(0, 3)], tip[(1, 3)], tip[(2, 3)]);

        let mut out = DMatrix::zeros(6, last + 1);
        for j in 0..=last {
            // joint j turns about z of the frame that precedes it
            let f = &frames[j];
            let z = Vector3::new(f[(0, 2)], f[(1, 2)], f[(2, 2)]);
            let o = Vector3::new(f[(0, 3)], f[(1, 3)], f[(2, 3)]);
            let lin = z.cross(&(p - o));
            for r in 0..3 {
                out[(r, j)] = lin[r];
                out[(r + 3, j)] = z[r];
            }
        }
        Ok(out)
    }
}
