use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use nalgebra::{DMatrix, DVector, Vector3};
use serde::{Serialize, Deserialize};
use strum_macros::{Display, EnumString};
use crate::guarded_bounds::{GuardedBoundsComputer, VelocityBounds};
use crate::kinematic_chain::{ChainModel, ChainStateSnapshot};
use crate::nonlinear_optimization::{NlpBounds, NlpDimensions, NlpProblemInterface, OptimizerResult, SolverStatus};
use crate::reaching_constraints::{desired_velocity, ConstraintEvaluator, LinearizedControlPoint, ReachingTolerances};
use crate::reaching_objective::{ReachingObjective, ReachingWeights, SlackPenalty};
use crate::reactive_controller::config::ReactiveControllerConfig;
use crate::self_avoidance::AvoidanceConstraintSet;
use crate::utils::utils_console::{LogLevel, ReactLogEvent, ReactLogSink};
use crate::utils::utils_errors::ReactError;

/// Auxiliary body points the problem knows how to steer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum ControlPointType {
    Elbow
}

/// A requested auxiliary point.  `p0` is informational on input; the problem recomputes it from
/// the chain when it resolves the point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    pub type_tag: String,
    pub x_desired: Vector3<f64>,
    pub p0: Vector3<f64>
}
impl ControlPoint {
    pub fn new(type_tag: &str, x_desired: Vector3<f64>) -> Self {
        Self { type_tag: type_tag.to_string(), x_desired, p0: Vector3::new(-0.1, 0.0, 0.0) }
    }
    pub fn new_elbow(x_desired: Vector3<f64>) -> Self {
        Self::new("Elbow", x_desired)
    }
    pub fn control_point_type(&self) -> Option<ControlPointType> {
        ControlPointType::from_str(&self.type_tag).ok()
    }
}
impl Default for ControlPoint {
    fn default() -> Self {
        Self { type_tag: ControlPointType::Elbow.to_string(), x_desired: Vector3::new(-0.2, 0.0, 0.0), p0: Vector3::new(-0.1, 0.0, 0.0) }
    }
}
impl fmt::Display for ControlPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type: {}, x_desired: [{:.4}, {:.4}, {:.4}], p0: [{:.4}, {:.4}, {:.4}]", self.type_tag, self.x_desired[0], self.x_desired[1], self.x_desired[2], self.p0[0], self.p0[1], self.p0[2])
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum NlpState {
    Uninitialized,
    Initialized,
    Solving,
    Finalized
}

/// Serializable summary of how a problem is set up.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReactiveNlpParameters {
    pub state: NlpState,
    pub num_dofs: usize,
    pub dt: f64,
    pub orientation_control: bool,
    pub self_avoidance: bool,
    pub additional_control_points: bool,
    pub weights: ReachingWeights,
    pub slack_penalty: SlackPenalty,
    pub slack_bound: Option<f64>,
    pub position_tolerance: f64,
    pub orientation_tolerance: f64,
    pub control_point_tolerance: f64,
    pub num_variables: usize,
    /// Known once the problem is initialized.
    pub num_constraints: Option<usize>,
    pub num_jacobian_nonzeros: Option<usize>
}

/// Quantities derived from the chain snapshot at `init`, dropped at finalize.
#[derive(Clone, Debug)]
struct DerivedState {
    objective: ReachingObjective,
    constraints: ConstraintEvaluator,
    velocity_bounds: VelocityBounds,
    x_lower: Vec<f64>,
    x_upper: Vec<f64>,
    starting_point: Vec<f64>,
    control_point: Option<(ControlPoint, LinearizedControlPoint)>
}

#[derive(Clone, Debug)]
struct FinalizedSolution {
    joint_velocities: DVector<f64>,
    status: SolverStatus,
    objective_value: f64,
    constraint_violation: f64
}

/// The per-cycle reaching problem over `x = [v (d), s_p (3), s_o (3)]`.
///
/// Lifecycle: `Uninitialized -> init -> Initialized -> (first callback) -> Solving ->
/// accept_solution -> Finalized`.  One instance serves one solve.
pub struct ReactiveNlp<'a> {
    chain: &'a dyn ChainModel,
    config: ReactiveControllerConfig,
    dt: f64,
    num_dofs: usize,
    control_points: Vec<ControlPoint>,
    guarded_bounds: GuardedBoundsComputer,
    avoidance: Option<AvoidanceConstraintSet>,
    log_sink: Arc<dyn ReactLogSink>,
    state: NlpState,
    derived: Option<DerivedState>,
    solution: Option<FinalizedSolution>
}
impl<'a> ReactiveNlp<'a> {
    pub fn new(chain: &'a dyn ChainModel, config: &ReactiveControllerConfig, dt: f64, control_points: Vec<ControlPoint>, log_sink: Arc<dyn ReactLogSink>) -> Result<Self, ReactError> {
        let dt = if dt > 0.0 && dt.is_finite() { dt } else {
            log_sink.emit(ReactLogEvent::NonPositiveDt { given: dt, substituted: config.default_dt });
            config.default_dt
        };

        let num_dofs = chain.num_dofs();
        let guarded_bounds = GuardedBoundsComputer::new(&chain.joint_limits(), &config.guard);
        let avoidance = if config.self_avoidance {
            let required_dofs = config.self_avoidance_calibration.required_dofs();
            if required_dofs > num_dofs {
                log_sink.emit(ReactLogEvent::SelfAvoidanceUnavailable { required_dofs, num_dofs });
            }
            Some(AvoidanceConstraintSet::new(&config.self_avoidance_calibration, num_dofs)?)
        } else { None };

        Ok(Self {
            chain,
            config: config.clone(),
            dt,
            num_dofs,
            control_points,
            guarded_bounds,
            avoidance,
            log_sink,
            state: NlpState::Uninitialized,
            derived: None,
            solution: None
        })
    }
    /// Snapshots the chain and builds everything the evaluation callbacks need.
    ///
    /// `target_pose` is `[x, y, z, rx, ry, rz]`: a position and an axis-angle rotation applied to
    /// the current end effector orientation.  `velocity_limits` is `d x 2`.
    pub fn init(&mut self, target_pose: &DVector<f64>, starting_velocity: &DVector<f64>, velocity_limits: &DMatrix<f64>) -> Result<(), ReactError> {
        if self.state != NlpState::Uninitialized {
            return Err(ReactError::new_invalid_state_error("init", &self.state.to_string(), file!(), line!()));
        }
        let d = self.num_dofs;
        if target_pose.len() != 6 {
            return Err(ReactError::new_dimension_mismatch_error("target pose", 6, target_pose.len(), file!(), line!()));
        }
        if starting_velocity.len() != d {
            return Err(ReactError::new_dimension_mismatch_error("starting velocity", d, starting_velocity.len(), file!(), line!()));
        }
        if velocity_limits.nrows() != d || velocity_limits.ncols() != 2 {
            return Err(ReactError::new_dimension_mismatch_error_str(&format!("velocity limits must be {} x 2, got {} x {}", d, velocity_limits.nrows(), velocity_limits.ncols()), file!(), line!()));
        }
        for i in 0..d {
            if velocity_limits[(i, 0)] > velocity_limits[(i, 1)] {
                return Err(ReactError::new_dimension_mismatch_error_str(&format!("velocity limit of joint {} has lower {} > upper {}", i, velocity_limits[(i, 0)], velocity_limits[(i, 1)]), file!(), line!()));
            }
        }

        let snapshot = ChainStateSnapshot::take(self.chain)?;
        if snapshot.num_dofs() != d {
            return Err(ReactError::new_dimension_mismatch_error("chain dofs", d, snapshot.num_dofs(), file!(), line!()));
        }
        let v_des = desired_velocity(&snapshot, target_pose, self.dt)?;
        let control_point = self.resolve_control_point()?;
        let velocity_bounds = self.guarded_bounds.compute(snapshot.q0(), velocity_limits, self.log_sink.as_ref())?;

        let objective = ReachingObjective::new(starting_velocity, snapshot.q0(), self.dt, &self.config.weights, self.config.rest_posture.as_ref(), &self.config.slack_penalty, self.config.orientation_control)?;
        let tolerances = ReachingTolerances {
            position: self.config.position_tolerance,
            orientation: self.config.orientation_tolerance,
            control_point: self.config.control_point_tolerance
        };
        let constraints = ConstraintEvaluator::new(&snapshot, v_des, self.dt, &tolerances, control_point.as_ref().map(|c| c.1.clone()), self.avoidance.clone())?;

        let (slack_lower, slack_upper) = match self.config.slack_bound {
            None => { (f64::NEG_INFINITY, f64::INFINITY) }
            Some(b) => { (-b, b) }
        };
        let mut x_lower = velocity_bounds.lower.as_slice().to_vec();
        let mut x_upper = velocity_bounds.upper.as_slice().to_vec();
        x_lower.extend_from_slice(&[slack_lower; 6]);
        x_upper.extend_from_slice(&[slack_upper; 6]);

        let mut starting_point = vec![0.0; d + 6];
        for i in 0..d {
            starting_point[i] = starting_velocity[i].max(x_lower[i]).min(x_upper[i]);
        }

        self.log_sink.emit(ReactLogEvent::NlpInitialized {
            num_dofs: d,
            num_variables: d + 6,
            num_constraints: constraints.num_constraints(),
            dt: self.dt,
            num_control_points: if control_point.is_some() { 1 } else { 0 },
            self_avoidance: self.avoidance.is_some()
        });

        self.derived = Some(DerivedState {
            objective,
            constraints,
            velocity_bounds,
            x_lower,
            x_upper,
            starting_point,
            control_point
        });
        self.state = NlpState::Initialized;
        Ok(())
    }
    fn resolve_control_point(&self) -> Result<Option<(ControlPoint, LinearizedControlPoint)>, ReactError> {
        if !self.config.additional_control_points { return Ok(None); }
        if self.control_points.is_empty() {
            self.log_sink.emit(ReactLogEvent::ControlPointsListEmpty);
            return Ok(None);
        }

        let mut resolved = None;
        let mut num_recognized = 0;
        for control_point in &self.control_points {
            match control_point.control_point_type() {
                None => {
                    self.log_sink.emit(ReactLogEvent::ControlPointTypeUnrecognized { tag: control_point.type_tag.clone() });
                }
                Some(ControlPointType::Elbow) => {
                    if resolved.is_some() {
                        num_recognized += 1;
                        continue;
                    }
                    if let Some(linearized) = self.linearize_elbow(control_point)? {
                        num_recognized += 1;
                        resolved = Some(linearized);
                    }
                }
            }
        }
        if num_recognized > 1 {
            self.log_sink.emit(ReactLogEvent::ExtraControlPointsIgnored { supplied: num_recognized, used: 1 });
        }

        Ok(resolved)
    }
    /// `None` when the chain is too short to have an elbow.
    fn linearize_elbow(&self, control_point: &ControlPoint) -> Result<Option<(ControlPoint, LinearizedControlPoint)>, ReactError> {
        let d = self.num_dofs;
        let distal = self.config.elbow_distal_joints;
        if distal >= d {
            self.log_sink.emit(ReactLogEvent::new_message(LogLevel::Warn, &format!("elbow control point needs more than {} dofs, chain has {}; skipping it", distal, d)));
            return Ok(None);
        }
        let num_joints = d - distal;
        let link_idx = num_joints - 1;
        let h = self.chain.link_transform(link_idx)?;
        let jacobian = self.chain.geometric_jacobian(Some(link_idx))?;
        if jacobian.nrows() < 3 || jacobian.ncols() != num_joints {
            return Err(ReactError::new_dimension_mismatch_error_str(&format!("partial jacobian for link {} must be 6 x {}, got {} x {}", link_idx, num_joints, jacobian.nrows(), jacobian.ncols()), file!(), line!()));
        }
        let p0 = Vector3::new(h[(0, 3)], h[(1, 3)], h[(2, 3)]);
        let mut resolved = control_point.clone();
        resolved.p0 = p0;
        let linearized = LinearizedControlPoint {
            x_desired: control_point.x_desired,
            p0,
            jacobian: jacobian.rows(0, 3).into_owned()
        };
        Ok(Some((resolved, linearized)))
    }
    fn derived_for_callback(&mut self, function_name: &str) -> Result<&mut DerivedState, ReactError> {
        match self.state {
            NlpState::Initialized | NlpState::Solving => { }
            _ => { return Err(ReactError::new_invalid_state_error(function_name, &self.state.to_string(), file!(), line!())); }
        }
        self.state = NlpState::Solving;
        let state = self.state.to_string();
        self.derived.as_mut().ok_or_else(|| ReactError::new_invalid_state_error(function_name, &state, file!(), line!()))
    }
    fn derived_for_query(&self, function_name: &str) -> Result<&DerivedState, ReactError> {
        match self.state {
            NlpState::Initialized | NlpState::Solving => { }
            _ => { return Err(ReactError::new_invalid_state_error(function_name, &self.state.to_string(), file!(), line!())); }
        }
        self.derived.as_ref().ok_or_else(|| ReactError::new_invalid_state_error(function_name, &self.state.to_string(), file!(), line!()))
    }
    fn check_len(&self, what: &str, expected: usize, given: usize) -> Result<(), ReactError> {
        return if expected == given { Ok(()) } else {
            Err(ReactError::new_dimension_mismatch_error(what, expected, given, file!(), line!()))
        }
    }
    pub fn state(&self) -> NlpState {
        self.state
    }
    pub fn dt(&self) -> f64 {
        self.dt
    }
    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }
    pub fn velocity_bounds(&self) -> Result<&VelocityBounds, ReactError> {
        Ok(&self.derived_for_query("velocity_bounds")?.velocity_bounds)
    }
    pub fn desired_velocity(&self) -> Result<&DVector<f64>, ReactError> {
        Ok(self.derived_for_query("desired_velocity")?.constraints.desired_velocity())
    }
    /// The control point in use, with `p0` recomputed from the chain.
    pub fn active_control_point(&self) -> Result<Option<&ControlPoint>, ReactError> {
        Ok(self.derived_for_query("active_control_point")?.control_point.as_ref().map(|c| &c.0))
    }
    /// Number of times constraint residuals were recomputed for a new evaluation point.
    pub fn num_constraint_recomputes(&self) -> Result<usize, ReactError> {
        Ok(self.derived_for_query("num_constraint_recomputes")?.constraints.num_recomputes())
    }
    pub fn joint_velocities(&self) -> Result<&DVector<f64>, ReactError> {
        match &self.solution {
            Some(s) => { Ok(&s.joint_velocities) }
            None => { Err(ReactError::new_invalid_state_error("joint_velocities", &self.state.to_string(), file!(), line!())) }
        }
    }
    pub fn solution_status(&self) -> Option<SolverStatus> {
        self.solution.as_ref().map(|s| s.status)
    }
    pub fn solution_objective_value(&self) -> Option<f64> {
        self.solution.as_ref().map(|s| s.objective_value)
    }
    pub fn solution_constraint_violation(&self) -> Option<f64> {
        self.solution.as_ref().map(|s| s.constraint_violation)
    }
    pub fn parameters_summary(&self) -> ReactiveNlpParameters {
        let (num_constraints, num_jacobian_nonzeros) = match &self.derived {
            Some(derived) => { (Some(derived.constraints.num_constraints()), Some(derived.constraints.num_nonzeros())) }
            None => { (None, None) }
        };
        let additional_control_points = match &self.derived {
            Some(derived) => { derived.constraints.has_control_point() }
            None => { self.config.additional_control_points }
        };
        ReactiveNlpParameters {
            state: self.state,
            num_dofs: self.num_dofs,
            dt: self.dt,
            orientation_control: self.config.orientation_control,
            self_avoidance: match &self.derived {
                Some(derived) => { derived.constraints.has_avoidance() }
                None => { self.avoidance.is_some() }
            },
            additional_control_points,
            weights: self.config.weights.clone(),
            slack_penalty: self.config.slack_penalty.clone(),
            slack_bound: self.config.slack_bound,
            position_tolerance: self.config.position_tolerance,
            orientation_tolerance: self.config.orientation_tolerance,
            control_point_tolerance: self.config.control_point_tolerance,
            num_variables: self.num_dofs + 6,
            num_constraints,
            num_jacobian_nonzeros
        }
    }
}
impl<'a> NlpProblemInterface for ReactiveNlp<'a> {
    fn dimensions(&self) -> Result<NlpDimensions, ReactError> {
        let derived = self.derived_for_query("dimensions")?;
        Ok(NlpDimensions {
            num_variables: self.num_dofs + 6,
            num_constraints: derived.constraints.num_constraints(),
            num_jacobian_nonzeros: derived.constraints.num_nonzeros()
        })
    }
    fn bounds(&self) -> Result<NlpBounds, ReactError> {
        let derived = self.derived_for_query("bounds")?;
        let (g_lower, g_upper) = derived.constraints.bounds();
        Ok(NlpBounds {
            x_lower: derived.x_lower.clone(),
            x_upper: derived.x_upper.clone(),
            g_lower: g_lower.clone(),
            g_upper: g_upper.clone()
        })
    }
    fn starting_point(&self) -> Result<Vec<f64>, ReactError> {
        Ok(self.derived_for_query("starting_point")?.starting_point.clone())
    }
    fn objective(&mut self, x: &[f64]) -> Result<f64, ReactError> {
        self.check_len("x", self.num_dofs + 6, x.len())?;
        let derived = self.derived_for_callback("objective")?;
        Ok(derived.objective.value(x))
    }
    fn gradient(&mut self, x: &[f64], grad: &mut [f64]) -> Result<(), ReactError> {
        self.check_len("x", self.num_dofs + 6, x.len())?;
        self.check_len("gradient", self.num_dofs + 6, grad.len())?;
        let derived = self.derived_for_callback("gradient")?;
        derived.objective.gradient(x, grad);
        Ok(())
    }
    fn constraints(&mut self, x: &[f64], g: &mut [f64]) -> Result<(), ReactError> {
        self.check_len("x", self.num_dofs + 6, x.len())?;
        let derived = self.derived_for_callback("constraints")?;
        if g.len() != derived.constraints.num_constraints() {
            return Err(ReactError::new_dimension_mismatch_error("constraint residuals", derived.constraints.num_constraints(), g.len(), file!(), line!()));
        }
        derived.constraints.residuals(x, g);
        Ok(())
    }
    fn jacobian_structure(&self) -> Result<Vec<(usize, usize)>, ReactError> {
        Ok(self.derived_for_query("jacobian_structure")?.constraints.jacobian_structure().clone())
    }
    fn jacobian_values(&mut self, x: &[f64], values: &mut [f64]) -> Result<(), ReactError> {
        self.check_len("x", self.num_dofs + 6, x.len())?;
        let derived = self.derived_for_callback("jacobian_values")?;
        if values.len() != derived.constraints.num_nonzeros() {
            return Err(ReactError::new_dimension_mismatch_error("jacobian values", derived.constraints.num_nonzeros(), values.len(), file!(), line!()));
        }
        derived.constraints.jacobian_values(x, values);
        Ok(())
    }
    fn hessian_diagonal(&mut self, x: &[f64], diag: &mut [f64]) -> Result<bool, ReactError> {
        self.check_len("x", self.num_dofs + 6, x.len())?;
        self.check_len("hessian diagonal", self.num_dofs + 6, diag.len())?;
        let derived = self.derived_for_callback("hessian_diagonal")?;
        derived.objective.hessian_diagonal(x, diag);
        Ok(true)
    }
    fn accept_solution(&mut self, result: &OptimizerResult) -> Result<(), ReactError> {
        match self.state {
            NlpState::Initialized | NlpState::Solving => { }
            _ => { return Err(ReactError::new_invalid_state_error("accept_solution", &self.state.to_string(), file!(), line!())); }
        }
        let x = result.x_min();
        self.check_len("solution", self.num_dofs + 6, x.len())?;

        let joint_velocities = DVector::from_iterator(self.num_dofs, x.iter().take(self.num_dofs).cloned());
        self.log_sink.emit(ReactLogEvent::SolutionFinalized {
            status: result.status().to_string(),
            objective_value: result.objective_value(),
            constraint_violation: result.constraint_violation()
        });
        self.solution = Some(FinalizedSolution {
            joint_velocities,
            status: result.status(),
            objective_value: result.objective_value(),
            constraint_violation: result.constraint_violation()
        });
        self.derived = None;
        self.state = NlpState::Finalized;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::kinematic_chain::DHChain;
    use crate::utils::utils_console::{MemoryLogSink, NullLogSink};

    fn arm() -> DHChain {
        let mut chain = DHChain::new_seven_dof_arm();
        chain.set_joint_angles(&DVector::from_vec(vec![0.3, 0.5, -0.2, -1.2, 0.4, 0.8, 0.1])).unwrap();
        chain
    }

    fn humanoid() -> DHChain {
        let mut chain = DHChain::new_humanoid_torso_and_arm();
        chain.set_joint_angles(&DVector::from_vec(vec![0.1, 0.0, 0.1, -0.5, 0.6, 0.3, 1.0, 0.0, -0.2, 0.0])).unwrap();
        chain
    }

    fn current_pose(chain: &dyn ChainModel) -> DVector<f64> {
        let h = chain.end_effector_transform();
        DVector::from_vec(vec![h[(0, 3)], h[(1, 3)], h[(2, 3)], 0.0, 0.0, 0.0])
    }

    fn limits(d: usize, v: f64) -> DMatrix<f64> {
        DMatrix::from_fn(d, 2, |_, c| if c == 0 { -v } else { v })
    }

    #[test]
    fn init_sizes_the_problem() {
        let chain = arm();
        let mut nlp = ReactiveNlp::new(&chain, &ReactiveControllerConfig::default(), 0.05, vec![], Arc::new(NullLogSink)).unwrap();
        assert_eq!(nlp.state(), NlpState::Uninitialized);
        nlp.init(&current_pose(&chain), &DVector::zeros(7), &limits(7, 1.0)).unwrap();
        assert_eq!(nlp.state(), NlpState::Initialized);
        let dims = nlp.dimensions().unwrap();
        assert_eq!(dims, NlpDimensions { num_variables: 13, num_constraints: 6, num_jacobian_nonzeros: 48 });
        let bounds = nlp.bounds().unwrap();
        assert_eq!((bounds.x_lower[7], bounds.x_upper[12]), (0.0, 0.0));
        assert_eq!(bounds.g_lower[0], -1e-4);
        assert_eq!(bounds.g_upper[3], 0.4);
    }

    #[test]
    fn starting_point_is_clamped_into_the_bounds() {
        let chain = arm();
        let mut config = ReactiveControllerConfig::default();
        config.slack_bound = None;
        let mut nlp = ReactiveNlp::new(&chain, &config, 0.05, vec![], Arc::new(NullLogSink)).unwrap();
        let v0 = DVector::from_vec(vec![3.0, -3.0, 0.5, 0.0, 0.0, 0.0, 0.0]);
        nlp.init(&current_pose(&chain), &v0, &limits(7, 1.0)).unwrap();
        let x0 = nlp.starting_point().unwrap();
        assert_eq!(&x0[..3], &[1.0, -1.0, 0.5]);
        assert!(x0[7..].iter().all(|s| *s == 0.0));
        assert_eq!(nlp.bounds().unwrap().x_upper[8], f64::INFINITY);
    }

    #[test]
    fn mismatched_sizes_fail_init() {
        let chain = arm();
        let config = ReactiveControllerConfig::default();
        let mut nlp = ReactiveNlp::new(&chain, &config, 0.05, vec![], Arc::new(NullLogSink)).unwrap();
        assert!(nlp.init(&current_pose(&chain), &DVector::zeros(6), &limits(7, 1.0)).unwrap_err().is_dimension_mismatch());
        assert!(nlp.init(&DVector::zeros(5), &DVector::zeros(7), &limits(7, 1.0)).unwrap_err().is_dimension_mismatch());
        assert!(nlp.init(&current_pose(&chain), &DVector::zeros(7), &limits(6, 1.0)).unwrap_err().is_dimension_mismatch());
        let mut crossed = limits(7, 1.0);
        crossed[(2, 0)] = 2.0;
        assert!(nlp.init(&current_pose(&chain), &DVector::zeros(7), &crossed).unwrap_err().is_dimension_mismatch());
        assert_eq!(nlp.state(), NlpState::Uninitialized);
    }

    #[test]
    fn callbacks_outside_the_solve_are_rejected() {
        let chain = arm();
        let mut nlp = ReactiveNlp::new(&chain, &ReactiveControllerConfig::default(), 0.05, vec![], Arc::new(NullLogSink)).unwrap();
        let x = vec![0.0; 13];
        assert!(matches!(nlp.objective(&x), Err(ReactError::InvalidState(_))));
        assert!(matches!(nlp.dimensions(), Err(ReactError::InvalidState(_))));

        nlp.init(&current_pose(&chain), &DVector::zeros(7), &limits(7, 1.0)).unwrap();
        assert!(matches!(nlp.init(&current_pose(&chain), &DVector::zeros(7), &limits(7, 1.0)), Err(ReactError::InvalidState(_))));
        assert_relative_eq!(nlp.objective(&x).unwrap(), 0.0);
        assert_eq!(nlp.state(), NlpState::Solving);

        let mut result_x = DVector::zeros(13);
        result_x[0] = 0.25;
        nlp.accept_solution(&OptimizerResult::new(result_x, SolverStatus::Converged, 0.0, 0.0)).unwrap();
        assert_eq!(nlp.state(), NlpState::Finalized);
        assert_eq!(nlp.joint_velocities().unwrap().len(), 7);
        assert_eq!(nlp.joint_velocities().unwrap()[0], 0.25);
        assert_eq!(nlp.solution_status(), Some(SolverStatus::Converged));
        assert!(matches!(nlp.gradient(&x, &mut vec![0.0; 13]), Err(ReactError::InvalidState(_))));
        assert!(nlp.velocity_bounds().is_err());
    }

    #[test]
    fn non_positive_dt_is_replaced_with_a_warning() {
        let chain = arm();
        let sink = MemoryLogSink::new_arc(LogLevel::Warn);
        let nlp = ReactiveNlp::new(&chain, &ReactiveControllerConfig::default(), -0.1, vec![], sink.clone()).unwrap();
        assert_eq!(nlp.dt(), 0.05);
        assert!(sink.contains(|e| matches!(e, ReactLogEvent::NonPositiveDt { .. })));
    }

    #[test]
    fn empty_control_point_list_disables_the_extra_row() {
        let chain = humanoid();
        let mut config = ReactiveControllerConfig::default();
        config.additional_control_points = true;
        let sink = MemoryLogSink::new_arc(LogLevel::Warn);
        let mut nlp = ReactiveNlp::new(&chain, &config, 0.05, vec![], sink.clone()).unwrap();
        nlp.init(&current_pose(&chain), &DVector::zeros(10), &limits(10, 1.0)).unwrap();
        assert_eq!(nlp.dimensions().unwrap().num_constraints, 6);
        assert!(sink.contains(|e| *e == ReactLogEvent::ControlPointsListEmpty));
        assert!(!nlp.parameters_summary().additional_control_points);
    }

    #[test]
    fn first_recognized_elbow_point_is_used() {
        let chain = humanoid();
        let mut config = ReactiveControllerConfig::default();
        config.additional_control_points = true;
        config.self_avoidance = true;
        let sink = MemoryLogSink::new_arc(LogLevel::Warn);
        let points = vec![
            ControlPoint::new("Wrist", Vector3::new(0.0, 0.0, 0.0)),
            ControlPoint::new("elbow", Vector3::new(-0.1, -0.2, 0.1)),
            ControlPoint::default()
        ];
        let mut nlp = ReactiveNlp::new(&chain, &config, 0.05, points, sink.clone()).unwrap();
        nlp.init(&current_pose(&chain), &DVector::zeros(10), &limits(10, 1.0)).unwrap();

        let dims = nlp.dimensions().unwrap();
        assert_eq!(dims.num_constraints, 6 + 1 + 4);
        assert_eq!(dims.num_jacobian_nonzeros, 6 * 11 + 6 + 9);
        let active = nlp.active_control_point().unwrap().unwrap();
        assert_eq!(active.x_desired, Vector3::new(-0.1, -0.2, 0.1));
        let h = chain.link_transform(5).unwrap();
        assert_relative_eq!(active.p0[0], h[(0, 3)]);
        assert!(sink.contains(|e| matches!(e, ReactLogEvent::ControlPointTypeUnrecognized { tag } if tag == "Wrist")));
        assert!(sink.contains(|e| matches!(e, ReactLogEvent::ExtraControlPointsIgnored { supplied: 2, used: 1 })));

        let summary = nlp.parameters_summary();
        assert!(summary.self_avoidance && summary.additional_control_points);
        assert_eq!(summary.num_constraints, Some(11));
    }

    #[test]
    fn skipped_unrecognized_points_do_not_count_as_extra() {
        let chain = humanoid();
        let mut config = ReactiveControllerConfig::default();
        config.additional_control_points = true;
        let sink = MemoryLogSink::new_arc(LogLevel::Warn);
        let points = vec![
            ControlPoint::new("Wrist", Vector3::zeros()),
            ControlPoint::new_elbow(Vector3::new(-0.1, -0.2, 0.1)),
            ControlPoint::new("Shoulder", Vector3::zeros())
        ];
        let mut nlp = ReactiveNlp::new(&chain, &config, 0.05, points, sink.clone()).unwrap();
        nlp.init(&current_pose(&chain), &DVector::zeros(10), &limits(10, 1.0)).unwrap();

        assert_eq!(nlp.dimensions().unwrap().num_constraints, 7);
        assert!(!sink.contains(|e| matches!(e, ReactLogEvent::ExtraControlPointsIgnored { .. })));
        assert!(sink.contains(|e| matches!(e, ReactLogEvent::ControlPointTypeUnrecognized { tag } if tag == "Shoulder")));
    }

    #[test]
    fn self_avoidance_on_a_short_chain_is_a_dimension_mismatch() {
        let chain = arm();
        let mut config = ReactiveControllerConfig::default();
        config.self_avoidance = true;
        let sink = MemoryLogSink::new_arc(LogLevel::Warn);
        let e = ReactiveNlp::new(&chain, &config, 0.05, vec![], sink.clone()).err().unwrap();
        assert!(e.is_dimension_mismatch());
        assert!(sink.contains(|e| matches!(e, ReactLogEvent::SelfAvoidanceUnavailable { required_dofs: 8, num_dofs: 7 })));
    }

    #[test]
    fn constraint_cache_survives_repeated_points() {
        let chain = arm();
        let mut nlp = ReactiveNlp::new(&chain, &ReactiveControllerConfig::default(), 0.05, vec![], Arc::new(NullLogSink)).unwrap();
        nlp.init(&current_pose(&chain), &DVector::zeros(7), &limits(7, 1.0)).unwrap();
        let x = vec![0.1; 13];
        let mut g = vec![0.0; 6];
        let mut values = vec![0.0; 48];
        nlp.constraints(&x, &mut g).unwrap();
        nlp.jacobian_values(&x, &mut values).unwrap();
        assert_eq!(nlp.num_constraint_recomputes().unwrap(), 1);
    }

    #[test]
    fn control_point_display_names_the_type() {
        let s = format!("{}", ControlPoint::default());
        assert!(s.starts_with("type: Elbow"));
        assert!(s.contains("-0.2000"));
        assert_eq!(ControlPoint::new("ELBOW", Vector3::zeros()).control_point_type(), Some(ControlPointType::Elbow));
    }
}
