pub mod config;

use std::sync::Arc;
use std::time::Duration;
use nalgebra::{DMatrix, DVector};
use serde::{Serialize, Deserialize};
use crate::kinematic_chain::ChainModel;
use crate::nonlinear_optimization::{HessianMode, NonlinearOptimizer, NonlinearOptimizerType, SolverStatus};
use crate::nonlinear_optimization::scaling::ScalingMode;
use crate::reactive_controller::config::ReactiveControllerConfig;
use crate::reactive_nlp::{ControlPoint, ReactiveNlp, ReactiveNlpParameters};
use crate::utils::utils_console::{LogLevel, ReactLogEvent, ReactLogSink};
use crate::utils::utils_errors::ReactError;
use crate::utils::utils_math::dvector_rad_to_deg;

/// Runs one reaching problem per control cycle.  The controller holds configuration and solver
/// settings only; every call to `solve` builds a fresh problem from the chain's current state.
///
/// ## Example
/// ```
/// use std::sync::Arc;
/// use nalgebra::{DMatrix, DVector};
/// use optima_react::kinematic_chain::{ChainModel, DHChain};
/// use optima_react::reactive_controller::ReactiveController;
/// use optima_react::reactive_controller::config::ReactiveControllerConfig;
/// use optima_react::utils::utils_console::NullLogSink;
///
/// let mut chain = DHChain::new_seven_dof_arm();
/// chain.set_joint_angles(&DVector::from_vec(vec![0.3, 0.5, -0.2, -1.2, 0.4, 0.8, 0.1])).expect("error");
/// let h = chain.end_effector_transform();
/// let target = DVector::from_vec(vec![h[(0, 3)], h[(1, 3)], h[(2, 3)], 0.0, 0.0, 0.0]);
/// let limits = DMatrix::from_fn(7, 2, |_, c| if c == 0 { -1.0 } else { 1.0 });
///
/// let controller = ReactiveController::new(ReactiveControllerConfig::default(), Arc::new(NullLogSink));
/// let solution = controller.solve(&chain, &target, &DVector::zeros(7), &limits, 0.05, vec![]).expect("error");
/// assert_eq!(solution.joint_velocities().len(), 7);
/// ```
#[derive(Clone)]
pub struct ReactiveController {
    config: ReactiveControllerConfig,
    optimizer: NonlinearOptimizer,
    log_sink: Arc<dyn ReactLogSink>
}
impl ReactiveController {
    pub fn new(config: ReactiveControllerConfig, log_sink: Arc<dyn ReactLogSink>) -> Self {
        let config = config.validated(log_sink.as_ref());
        Self { config, optimizer: NonlinearOptimizer::new(NonlinearOptimizerType::OpEn), log_sink }
    }
    pub fn config(&self) -> &ReactiveControllerConfig {
        &self.config
    }
    /// Computes joint velocities that move the end effector toward `target_pose` within one
    /// cycle of length `dt`.
    ///
    /// Unless the configuration already sets one, the solve is capped at `dt` of wall-clock time.
    pub fn solve(&self, chain: &dyn ChainModel, target_pose: &DVector<f64>, starting_velocity: &DVector<f64>, velocity_limits: &DMatrix<f64>, dt: f64, control_points: Vec<ControlPoint>) -> Result<ReactiveSolution, ReactError> {
        let start = instant::Instant::now();

        let mut nlp = ReactiveNlp::new(chain, &self.config, dt, control_points, self.log_sink.clone())?;
        nlp.init(target_pose, starting_velocity, velocity_limits)?;
        let parameters_summary = nlp.parameters_summary();

        let mut parameters = self.config.optimizer.clone();
        if parameters.max_time.is_none() {
            parameters.set_max_time(Duration::from_secs_f64(nlp.dt()));
        }

        let result = self.optimizer.optimize(&mut nlp, &parameters)?;
        if !result.status().is_success() {
            self.log_sink.emit(ReactLogEvent::new_message(LogLevel::Warn, &format!("reaching solve ended with status {} (violation {:e})", result.status(), result.constraint_violation())));
        }

        Ok(ReactiveSolution {
            joint_velocities: nlp.joint_velocities()?.clone(),
            status: result.status(),
            objective_value: result.objective_value(),
            constraint_violation: result.constraint_violation(),
            num_outer_iterations: result.num_outer_iterations(),
            num_inner_iterations: result.num_inner_iterations(),
            solve_time: start.elapsed(),
            parameters: parameters_summary
        })
    }
    pub fn set_tolerance(&mut self, tolerance: f64) {
        if tolerance > 0.0 { self.config.optimizer.tolerance = tolerance; }
    }
    pub fn set_constraint_tolerance(&mut self, constraint_tolerance: f64) {
        if constraint_tolerance > 0.0 { self.config.optimizer.constraint_tolerance = constraint_tolerance; }
    }
    /// `0` means no iteration cap.
    pub fn set_max_iterations(&mut self, max_iterations: usize) {
        let max_iterations = if max_iterations == 0 { usize::MAX } else { max_iterations };
        self.config.optimizer.set_max_iterations(max_iterations);
    }
    pub fn set_max_time(&mut self, max_time: Option<Duration>) {
        self.config.optimizer.max_time = max_time;
    }
    pub fn set_verbosity(&mut self, verbosity: u8) {
        self.config.optimizer.verbosity = verbosity;
    }
    /// With `use_user_scaling == false` the solver falls back to gradient based scaling.
    pub fn set_user_scaling(&mut self, use_user_scaling: bool, objective: f64, variables: f64, constraints: f64) {
        self.config.optimizer.scaling = if use_user_scaling {
            ScalingMode::User { objective, variables, constraints }
        } else {
            ScalingMode::GradientBased
        };
    }
    pub fn set_hessian_mode(&mut self, hessian_mode: HessianMode) {
        self.config.optimizer.hessian_mode = hessian_mode;
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReactiveSolution {
    joint_velocities: DVector<f64>,
    status: SolverStatus,
    objective_value: f64,
    constraint_violation: f64,
    num_outer_iterations: usize,
    num_inner_iterations: usize,
    solve_time: Duration,
    parameters: ReactiveNlpParameters
}
impl ReactiveSolution {
    /// In rad/s.
    pub fn joint_velocities(&self) -> &DVector<f64> {
        &self.joint_velocities
    }
    pub fn joint_velocities_in_deg_per_second(&self) -> DVector<f64> {
        dvector_rad_to_deg(&self.joint_velocities)
    }
    pub fn status(&self) -> SolverStatus {
        self.status
    }
    pub fn objective_value(&self) -> f64 {
        self.objective_value
    }
    pub fn constraint_violation(&self) -> f64 {
        self.constraint_violation
    }
    pub fn num_outer_iterations(&self) -> usize {
        self.num_outer_iterations
    }
    pub fn num_inner_iterations(&self) -> usize {
        self.num_inner_iterations
    }
    /// Wall-clock time of problem construction plus the solve.
    pub fn solve_time(&self) -> Duration {
        self.solve_time
    }
    pub fn parameters(&self) -> &ReactiveNlpParameters {
        &self.parameters
    }
}
