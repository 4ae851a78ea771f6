pub mod scaling;

use std::cell::RefCell;
use std::time::Duration;
use nalgebra::DVector;
use serde::{Serialize, Deserialize};
use optimization_engine::{constraints, SolverError};
use optimization_engine::alm::{AlmCache, AlmFactory, AlmOptimizer, AlmProblem, NO_JACOBIAN_MAPPING, NO_MAPPING};
use optimization_engine::core::ExitStatus;
use optimization_engine::panoc::PANOCCache;
use crate::nonlinear_optimization::scaling::{ProblemScaling, ScalingMode};
use crate::utils::utils_console::{react_print, PrintColor, PrintMode};
use crate::utils::utils_errors::ReactError;

/// Sizes a problem reports to the solver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NlpDimensions {
    pub num_variables: usize,
    pub num_constraints: usize,
    pub num_jacobian_nonzeros: usize
}

/// Variable and constraint bounds.  Unbounded sides are `f64::INFINITY` / `f64::NEG_INFINITY`.
#[derive(Clone, Debug, PartialEq)]
pub struct NlpBounds {
    pub x_lower: Vec<f64>,
    pub x_upper: Vec<f64>,
    pub g_lower: Vec<f64>,
    pub g_upper: Vec<f64>
}

/// The contract between a nonlinear program and a solver backend.  The solver only ever talks
/// to a problem through this trait.
///
/// Evaluation callbacks take `&mut self` so that implementors can cache derived quantities per
/// evaluation point.
pub trait NlpProblemInterface {
    fn dimensions(&self) -> Result<NlpDimensions, ReactError>;
    fn bounds(&self) -> Result<NlpBounds, ReactError>;
    fn starting_point(&self) -> Result<Vec<f64>, ReactError>;
    fn objective(&mut self, x: &[f64]) -> Result<f64, ReactError>;
    fn gradient(&mut self, x: &[f64], grad: &mut [f64]) -> Result<(), ReactError>;
    fn constraints(&mut self, x: &[f64], g: &mut [f64]) -> Result<(), ReactError>;
    /// `(row, col)` pairs; `jacobian_values` fills values in the same order.
    fn jacobian_structure(&self) -> Result<Vec<(usize, usize)>, ReactError>;
    fn jacobian_values(&mut self, x: &[f64], values: &mut [f64]) -> Result<(), ReactError>;
    /// Writes the diagonal of the objective Hessian.  Returns `Ok(false)` when the problem does
    /// not provide one.
    fn hessian_diagonal(&mut self, _x: &[f64], _diag: &mut [f64]) -> Result<bool, ReactError> {
        Ok(false)
    }
    /// Receives the terminal status and the best iterate.  Called exactly once per solve.
    fn accept_solution(&mut self, result: &OptimizerResult) -> Result<(), ReactError>;
}

////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug)]
pub enum NonlinearOptimizer {
    OpEn(OpEnNonlinearOptimizer)
}
impl NonlinearOptimizer {
    pub fn new(t: NonlinearOptimizerType) -> Self {
        return match t {
            NonlinearOptimizerType::OpEn => { Self::OpEn(OpEnNonlinearOptimizer::new()) }
        }
    }
    pub fn optimize(&self, problem: &mut dyn NlpProblemInterface, parameters: &OptimizerParameters) -> Result<OptimizerResult, ReactError> {
        return match self {
            NonlinearOptimizer::OpEn(n) => { n.optimize(problem, parameters) }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NonlinearOptimizerType {
    OpEn
}
impl Default for NonlinearOptimizerType {
    fn default() -> Self {
        Self::OpEn
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////

/// Augmented Lagrangian method with PANOC inner solves.  Variable bounds become the box `U`,
/// constraint residuals become the mapping `F1` into the box `C = [g_l, g_u]`.
#[derive(Clone, Debug, Default)]
pub struct OpEnNonlinearOptimizer;
impl OpEnNonlinearOptimizer {
    pub fn new() -> Self {
        Self
    }
    pub fn optimize(&self, problem: &mut dyn NlpProblemInterface, parameters: &OptimizerParameters) -> Result<OptimizerResult, ReactError> {
        let dims = problem.dimensions()?;
        let bounds = problem.bounds()?;
        let x0 = problem.starting_point()?;
        let structure = problem.jacobian_structure()?;
        let n = dims.num_variables;
        let m = dims.num_constraints;
        if x0.len() != n || bounds.x_lower.len() != n || bounds.x_upper.len() != n {
            return Err(ReactError::new_dimension_mismatch_error("variable vectors", n, x0.len(), file!(), line!()));
        }
        if bounds.g_lower.len() != m || bounds.g_upper.len() != m {
            return Err(ReactError::new_dimension_mismatch_error("constraint bounds", m, bounds.g_lower.len(), file!(), line!()));
        }
        if x0.iter().any(|x| !x.is_finite()) {
            return Err(ReactError::new_solver_error("starting point is not finite", file!(), line!()));
        }
        if structure.len() != dims.num_jacobian_nonzeros {
            return Err(ReactError::new_dimension_mismatch_error("jacobian nonzeros", dims.num_jacobian_nonzeros, structure.len(), file!(), line!()));
        }

        let scaling = ProblemScaling::compute(problem, &x0, m, &structure, &parameters.scaling, &parameters.hessian_mode)?;
        let (z_lower, z_upper) = scaling.scale_bounds(&bounds.x_lower, &bounds.x_upper, &scaling.variables);
        let (c_lower, c_upper) = scaling.scale_bounds(&bounds.g_lower, &bounds.g_upper, &scaling.constraints);
        let mut u = vec![0.0; n];
        scaling.scale_variables(&x0, &mut u);

        let problem_cell = RefCell::new(problem);
        let lbfgs_memory = parameters.hessian_mode.lbfgs_memory();
        let tolerance = positive_or(parameters.tolerance, 1e-3);
        let delta_tolerance = positive_or(parameters.constraint_tolerance, 1e-4);

        let solver_result = {
            let f = |z: &[f64], cost: &mut f64| -> Result<(), SolverError> {
                let mut x = vec![0.0; n];
                scaling.unscale_variables(z, &mut x);
                let mut p = problem_cell.borrow_mut();
                let val = p.objective(&x).map_err(|_| SolverError::Cost)?;
                if !val.is_finite() { return Err(SolverError::NotFiniteComputation); }
                *cost = scaling.objective * val;
                Ok(())
            };
            let df = |z: &[f64], grad: &mut [f64]| -> Result<(), SolverError> {
                let mut x = vec![0.0; n];
                scaling.unscale_variables(z, &mut x);
                let mut grad_x = vec![0.0; n];
                let mut p = problem_cell.borrow_mut();
                p.gradient(&x, &mut grad_x).map_err(|_| SolverError::Cost)?;
                if grad_x.iter().any(|g| !g.is_finite()) { return Err(SolverError::NotFiniteComputation); }
                scaling.scale_gradient(&grad_x, grad);
                Ok(())
            };
            let f1 = |z: &[f64], f1u: &mut [f64]| -> Result<(), SolverError> {
                let mut x = vec![0.0; n];
                scaling.unscale_variables(z, &mut x);
                let mut g = vec![0.0; m];
                let mut p = problem_cell.borrow_mut();
                p.constraints(&x, &mut g).map_err(|_| SolverError::Cost)?;
                if g.iter().any(|v| !v.is_finite()) { return Err(SolverError::NotFiniteComputation); }
                scaling.scale_constraints(&g, f1u);
                Ok(())
            };
            let jf1_trans = |z: &[f64], d: &[f64], res: &mut [f64]| -> Result<(), SolverError> {
                let mut x = vec![0.0; n];
                scaling.unscale_variables(z, &mut x);
                let mut values = vec![0.0; structure.len()];
                let mut p = problem_cell.borrow_mut();
                p.jacobian_values(&x, &mut values).map_err(|_| SolverError::Cost)?;
                scaling.scaled_jacobian_transpose_product(&structure, &values, d, res);
                Ok(())
            };

            let set_u = constraints::Rectangle::new(Some(&z_lower), Some(&z_upper));
            let set_c = constraints::Rectangle::new(Some(&c_lower), Some(&c_upper));
            let set_y = constraints::Ball2::new(None, 1e12);

            let factory = AlmFactory::new(
                f,
                df,
                Some(f1),
                Some(jf1_trans),
                NO_MAPPING,
                NO_JACOBIAN_MAPPING,
                Some(set_c),
                0
            );

            let alm_problem = AlmProblem::new(
                set_u,
                Some(set_c),
                Some(set_y),
                |u: &[f64], xi: &[f64], cost: &mut f64| -> Result<(), SolverError> {
                    factory.psi(u, xi, cost)
                },
                |u: &[f64], xi: &[f64], grad: &mut [f64]| -> Result<(), SolverError> {
                    factory.d_psi(u, xi, grad)
                },
                Some(f1),
                NO_MAPPING,
                m,
                0
            );

            let panoc_cache = PANOCCache::new(n, tolerance, lbfgs_memory);
            let mut alm_cache = AlmCache::new(panoc_cache, m, 0);
            let mut alm_optimizer = AlmOptimizer::new(&mut alm_cache, alm_problem)
                .with_delta_tolerance(delta_tolerance)
                .with_epsilon_tolerance(tolerance)
                .with_initial_inner_tolerance(tolerance.max(0.1))
                .with_max_outer_iterations(parameters.max_outer_iterations.max(1))
                .with_max_inner_iterations(parameters.max_iterations.max(1));
            if let Some(a) = &parameters.max_time { alm_optimizer = alm_optimizer.with_max_duration(*a); }

            let solve_status = alm_optimizer.solve(&mut u);
            solve_status
        };

        let problem = problem_cell.into_inner();
        let mut x_min = vec![0.0; n];
        scaling.unscale_variables(&u, &mut x_min);
        let objective_value = problem.objective(&x_min).unwrap_or(f64::NAN);
        let mut g = vec![0.0; m];
        let constraint_violation = match problem.constraints(&x_min, &mut g) {
            Ok(()) => { constraint_violation(&g, &bounds.g_lower, &bounds.g_upper) }
            Err(_) => { f64::INFINITY }
        };

        let result = match solver_result {
            Ok(status) => {
                OptimizerResult {
                    x_min: DVector::from_vec(x_min),
                    status: SolverStatus::from_exit_status(status.exit_status(), constraint_violation, parameters),
                    objective_value,
                    constraint_violation,
                    num_outer_iterations: status.num_outer_iterations(),
                    num_inner_iterations: status.num_inner_iterations(),
                    solve_time: status.solve_time(),
                    message: None
                }
            }
            Err(e) => {
                OptimizerResult {
                    x_min: DVector::from_vec(x_min),
                    status: SolverStatus::NumericalError,
                    objective_value,
                    constraint_violation,
                    num_outer_iterations: 0,
                    num_inner_iterations: 0,
                    solve_time: Duration::from_secs(0),
                    message: Some(format!("{:?}", e))
                }
            }
        };

        if parameters.verbosity > 0 { result.print_summary(); }

        problem.accept_solution(&result)?;
        Ok(result)
    }
}

fn positive_or(a: f64, default: f64) -> f64 {
    return if a > 0.0 && a.is_finite() { a } else { default };
}

/// Largest amount by which `g` leaves `[lower, upper]`.
pub fn constraint_violation(g: &[f64], lower: &[f64], upper: &[f64]) -> f64 {
    let mut out = 0.0_f64;
    for i in 0..g.len() {
        if !g[i].is_finite() { return f64::INFINITY; }
        out = out.max(lower[i] - g[i]).max(g[i] - upper[i]);
    }
    out
}

////////////////////////////////////////////////////////////////////////////////////////////////////

/// Terminal status of a solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum SolverStatus {
    Converged,
    Acceptable,
    IterationLimit,
    TimeLimit,
    Infeasible,
    NumericalError
}
impl SolverStatus {
    pub fn from_exit_status(exit_status: ExitStatus, constraint_violation: f64, parameters: &OptimizerParameters) -> Self {
        return match exit_status {
            ExitStatus::Converged => {
                if constraint_violation <= parameters.constraint_tolerance { Self::Converged }
                else if constraint_violation <= parameters.acceptable_tolerance { Self::Acceptable }
                else { Self::Infeasible }
            }
            ExitStatus::NotConvergedIterations => { Self::IterationLimit }
            ExitStatus::NotConvergedOutOfTime => { Self::TimeLimit }
        }
    }
    /// `Converged` or `Acceptable`.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Converged | Self::Acceptable)
    }
}

#[derive(Clone, Debug)]
pub struct OptimizerResult {
    x_min: DVector<f64>,
    status: SolverStatus,
    objective_value: f64,
    constraint_violation: f64,
    num_outer_iterations: usize,
    num_inner_iterations: usize,
    solve_time: Duration,
    message: Option<String>
}
impl OptimizerResult {
    pub fn new(x_min: DVector<f64>, status: SolverStatus, objective_value: f64, constraint_violation: f64) -> Self {
        Self { x_min, status, objective_value, constraint_violation, num_outer_iterations: 0, num_inner_iterations: 0, solve_time: Duration::from_secs(0), message: None }
    }
    pub fn x_min(&self) -> &DVector<f64> {
        &self.x_min
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
    pub fn solve_time(&self) -> Duration {
        self.solve_time
    }
    pub fn message(&self) -> &Option<String> {
        &self.message
    }
    pub fn print_summary(&self) {
        let color = if self.status.is_success() { PrintColor::Green } else { PrintColor::Yellow };
        react_print("OpEn ALM ---> ", PrintMode::Print, PrintColor::Blue, true);
        react_print(&format!("{}", self.status), PrintMode::Println, color, true);
        react_print(&format!("   > f(x*): {:e}, violation: {:e}", self.objective_value, self.constraint_violation), PrintMode::Println, PrintColor::None, false);
        react_print(&format!("   > outer iterations: {}, inner iterations: {}, time: {:?}", self.num_outer_iterations, self.num_inner_iterations, self.solve_time), PrintMode::Println, PrintColor::None, false);
        if let Some(message) = &self.message {
            react_print(&format!("   > engine error: {}", message), PrintMode::Println, PrintColor::Red, false);
        }
    }
}

/// How second order information enters the solve.  PANOC always builds an L-BFGS model;
/// `ExactDiagonal` additionally preconditions variables with the square root of the diagonal
/// Hessian at the starting point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HessianMode {
    QuasiNewton { lbfgs_memory: usize },
    ExactDiagonal
}
impl Default for HessianMode {
    fn default() -> Self {
        Self::QuasiNewton { lbfgs_memory: DEFAULT_LBFGS_MEMORY }
    }
}
impl HessianMode {
    pub fn lbfgs_memory(&self) -> usize {
        match self {
            HessianMode::QuasiNewton { lbfgs_memory } => { (*lbfgs_memory).max(1) }
            HessianMode::ExactDiagonal => { DEFAULT_LBFGS_MEMORY }
        }
    }
}

pub const DEFAULT_LBFGS_MEMORY: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizerParameters {
    /// Inner (PANOC) convergence tolerance.
    pub tolerance: f64,
    /// Largest constraint violation still reported as `Acceptable`.
    pub acceptable_tolerance: f64,
    pub constraint_tolerance: f64,
    pub max_iterations: usize,
    pub max_outer_iterations: usize,
    pub max_time: Option<Duration>,
    pub hessian_mode: HessianMode,
    pub scaling: ScalingMode,
    pub verbosity: u8
}
impl OptimizerParameters {
    pub fn set_max_time(&mut self, max_time: Duration) {
        self.max_time = Some(max_time);
    }
    pub fn set_max_iterations(&mut self, max_iterations: usize) {
        self.max_iterations = max_iterations;
    }
    pub fn set_max_outer_iterations(&mut self, max_outer_iterations: usize) {
        self.max_outer_iterations = max_outer_iterations;
    }
}
impl Default for OptimizerParameters {
    fn default() -> Self {
        Self {
            tolerance: 1e-3,
            acceptable_tolerance: 1e-2,
            constraint_tolerance: 1e-4,
            max_iterations: 500,
            max_outer_iterations: 20,
            max_time: None,
            hessian_mode: HessianMode::default(),
            scaling: ScalingMode::default(),
            verbosity: 0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// min (x0 - 2)^2 + (x1 + 1)^2  s.t.  x0 + x1 in [0.5, 0.5],  x in [-5, 5]^2
    struct TinyProblem {
        accepted: Option<SolverStatus>,
        evaluations: usize
    }
    impl NlpProblemInterface for TinyProblem {
        fn dimensions(&self) -> Result<NlpDimensions, ReactError> {
            Ok(NlpDimensions { num_variables: 2, num_constraints: 1, num_jacobian_nonzeros: 2 })
        }
        fn bounds(&self) -> Result<NlpBounds, ReactError> {
            Ok(NlpBounds { x_lower: vec![-5.0; 2], x_upper: vec![5.0; 2], g_lower: vec![0.5], g_upper: vec![0.5] })
        }
        fn starting_point(&self) -> Result<Vec<f64>, ReactError> {
            Ok(vec![0.0, 0.0])
        }
        fn objective(&mut self, x: &[f64]) -> Result<f64, ReactError> {
            self.evaluations += 1;
            Ok((x[0] - 2.0).powi(2) + (x[1] + 1.0).powi(2))
        }
        fn gradient(&mut self, x: &[f64], grad: &mut [f64]) -> Result<(), ReactError> {
            grad[0] = 2.0 * (x[0] - 2.0);
            grad[1] = 2.0 * (x[1] + 1.0);
            Ok(())
        }
        fn constraints(&mut self, x: &[f64], g: &mut [f64]) -> Result<(), ReactError> {
            g[0] = x[0] + x[1];
            Ok(())
        }
        fn jacobian_structure(&self) -> Result<Vec<(usize, usize)>, ReactError> {
            Ok(vec![(0, 0), (0, 1)])
        }
        fn jacobian_values(&mut self, _x: &[f64], values: &mut [f64]) -> Result<(), ReactError> {
            values[0] = 1.0;
            values[1] = 1.0;
            Ok(())
        }
        fn hessian_diagonal(&mut self, _x: &[f64], diag: &mut [f64]) -> Result<bool, ReactError> {
            diag[0] = 2.0;
            diag[1] = 2.0;
            Ok(true)
        }
        fn accept_solution(&mut self, result: &OptimizerResult) -> Result<(), ReactError> {
            self.accepted = Some(result.status());
            Ok(())
        }
    }

    fn parameters() -> OptimizerParameters {
        let mut p = OptimizerParameters::default();
        p.tolerance = 1e-6;
        p.constraint_tolerance = 1e-5;
        p.max_time = Some(Duration::from_secs(5));
        p
    }

    #[test]
    fn alm_solves_an_equality_constrained_quadratic() {
        // optimum on the line x0 + x1 = 0.5: (1.75, -1.25)
        for hessian_mode in [HessianMode::default(), HessianMode::ExactDiagonal] {
            let mut problem = TinyProblem { accepted: None, evaluations: 0 };
            let mut p = parameters();
            p.hessian_mode = hessian_mode;
            let result = NonlinearOptimizer::new(NonlinearOptimizerType::OpEn).optimize(&mut problem, &p).unwrap();
            assert_abs_diff_eq!(result.x_min()[0], 1.75, epsilon = 1e-3);
            assert_abs_diff_eq!(result.x_min()[1], -1.25, epsilon = 1e-3);
            assert!(result.status().is_success());
            assert_eq!(problem.accepted, Some(result.status()));
            assert!(problem.evaluations > 0);
        }
    }

    #[test]
    fn user_scaling_does_not_move_the_optimum() {
        let mut problem = TinyProblem { accepted: None, evaluations: 0 };
        let mut p = parameters();
        p.scaling = ScalingMode::User { objective: 0.5, variables: 2.0, constraints: 3.0 };
        let result = OpEnNonlinearOptimizer::new().optimize(&mut problem, &p).unwrap();
        assert_abs_diff_eq!(result.x_min()[0], 1.75, epsilon = 1e-3);
        assert_abs_diff_eq!(result.x_min()[1], -1.25, epsilon = 1e-3);
    }

    #[test]
    fn status_mapping_grades_constraint_violation() {
        let p = OptimizerParameters::default();
        assert_eq!(SolverStatus::from_exit_status(ExitStatus::Converged, 1e-6, &p), SolverStatus::Converged);
        assert_eq!(SolverStatus::from_exit_status(ExitStatus::Converged, 1e-3, &p), SolverStatus::Acceptable);
        assert_eq!(SolverStatus::from_exit_status(ExitStatus::Converged, 1.0, &p), SolverStatus::Infeasible);
        assert_eq!(SolverStatus::from_exit_status(ExitStatus::NotConvergedOutOfTime, 0.0, &p), SolverStatus::TimeLimit);
        assert_eq!(SolverStatus::from_exit_status(ExitStatus::NotConvergedIterations, 0.0, &p), SolverStatus::IterationLimit);
    }

    #[test]
    fn violation_measures_distance_outside_the_box() {
        assert_eq!(constraint_violation(&[0.0, 2.0], &[-1.0, f64::NEG_INFINITY], &[1.0, 1.5]), 0.5);
        assert_eq!(constraint_violation(&[0.0], &[0.0], &[0.0]), 0.0);
        assert_eq!(constraint_violation(&[f64::NAN], &[0.0], &[0.0]), f64::INFINITY);
    }
}
