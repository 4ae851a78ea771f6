pub mod dh_chain;

use nalgebra::{DMatrix, DVector, Matrix3, Matrix4, Vector3};
use crate::utils::utils_errors::ReactError;

pub use dh_chain::{DHChain, DHLink};

/// The kinematic model the controller reasons about.  The controller never mutates the chain;
/// it reads one snapshot per solve through `ChainStateSnapshot::take`.
///
/// Link indices count actuated joints from the base, so `link_transform(i)` is the frame that
/// moves with joint `i`, and `link_transform(num_dofs() - 1)` is the last link of the chain.
pub trait ChainModel {
    fn num_dofs(&self) -> usize;
    /// `d x 2` matrix of `[min, max]` joint position limits.
    fn joint_limits(&self) -> DMatrix<f64>;
    fn current_joint_angles(&self) -> DVector<f64>;
    fn end_effector_transform(&self) -> Matrix4<f64>;
    fn link_transform(&self, link_idx: usize) -> Result<Matrix4<f64>, ReactError>;
    /// `6 x k` geometric Jacobian (linear rows first, then angular rows) of the end effector
    /// (`None`, `k = d`) or of the frame of link `link_idx` (`k = link_idx + 1`).
    fn geometric_jacobian(&self, link_idx: Option<usize>) -> Result<DMatrix<f64>, ReactError>;
}

/// Read-only copy of everything the reaching problem needs from the chain at the start of a
/// solve.
#[derive(Clone, Debug)]
pub struct ChainStateSnapshot {
    num_dofs: usize,
    joint_limits: DMatrix<f64>,
    q0: DVector<f64>,
    h0: Matrix4<f64>,
    p0: Vector3<f64>,
    r0: Matrix3<f64>,
    jacobian: DMatrix<f64>
}
impl ChainStateSnapshot {
    pub fn take(chain: &dyn ChainModel) -> Result<Self, ReactError> {
        let num_dofs = chain.num_dofs();
        let joint_limits = chain.joint_limits();
        if joint_limits.nrows() != num_dofs || joint_limits.ncols() != 2 {
            return Err(ReactError::new_dimension_mismatch_error_str(&format!("joint limits must be {} x 2, got {} x {}", num_dofs, joint_limits.nrows(), joint_limits.ncols()), file!(), line!()));
        }
        let q0 = chain.current_joint_angles();
        if q0.len() != num_dofs {
            return Err(ReactError::new_dimension_mismatch_error("current joint angles", num_dofs, q0.len(), file!(), line!()));
        }
        let jacobian = chain.geometric_jacobian(None)?;
        if jacobian.nrows() != 6 || jacobian.ncols() != num_dofs {
            return Err(ReactError::new_dimension_mismatch_error_str(&format!("end effector jacobian must be 6 x {}, got {} x {}", num_dofs, jacobian.nrows(), jacobian.ncols()), file!(), line!()));
        }
        let h0 = chain.end_effector_transform();
        let p0 = Vector3::new(h0[(0, 3)], h0[(1, 3)], h0[(2, 3)]);
        let r0: Matrix3<f64> = h0.fixed_slice::<3, 3>(0, 0).into_owned();

        Ok(Self {
            num_dofs,
            joint_limits,
            q0,
            h0,
            p0,
            r0,
            jacobian
        })
    }
    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }
    pub fn joint_limits(&self) -> &DMatrix<f64> {
        &self.joint_limits
    }
    pub fn q0(&self) -> &DVector<f64> {
        &self.q0
    }
    pub fn h0(&self) -> &Matrix4<f64> {
        &self.h0
    }
    pub fn p0(&self) -> &Vector3<f64> {
        &self.p0
    }
    pub fn r0(&self) -> &Matrix3<f64> {
        &self.r0
    }
    pub fn jacobian(&self) -> &DMatrix<f64> {
        &self.jacobian
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_copies_pose_and_jacobian() {
        let chain = DHChain::new_seven_dof_arm();
        let snapshot = ChainStateSnapshot::take(&chain).unwrap();
        assert_eq!(snapshot.num_dofs(), 7);
        assert_eq!(snapshot.jacobian().shape(), (6, 7));
        assert_eq!(snapshot.joint_limits().shape(), (7, 2));
        let h = chain.end_effector_transform();
        assert_eq!(snapshot.p0()[2], h[(2, 3)]);
        assert_eq!(snapshot.r0()[(1, 1)], h[(1, 1)]);
    }
}
