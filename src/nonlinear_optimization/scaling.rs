use serde::{Serialize, Deserialize};
use crate::nonlinear_optimization::{HessianMode, NlpProblemInterface};
use crate::utils::utils_errors::ReactError;

/// How the problem handed to the engine is rescaled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ScalingMode {
    None,
    /// Objective and constraint rows are scaled down so that their largest gradient entry at
    /// the starting point is at most `GRADIENT_SCALING_MAX`.
    GradientBased,
    User { objective: f64, variables: f64, constraints: f64 }
}
impl Default for ScalingMode {
    fn default() -> Self {
        Self::GradientBased
    }
}

pub const GRADIENT_SCALING_MAX: f64 = 100.0;
const HESSIAN_PRECONDITION_FLOOR: f64 = 1e-12;

/// Factors of the transformed problem: `z = variables * x`, `f_s = objective * f`,
/// `g_s = constraints * g`.  All factors are strictly positive.
#[derive(Clone, Debug, PartialEq)]
pub struct ProblemScaling {
    pub objective: f64,
    pub variables: Vec<f64>,
    pub constraints: Vec<f64>
}
impl ProblemScaling {
    pub fn new_identity(num_variables: usize, num_constraints: usize) -> Self {
        Self { objective: 1.0, variables: vec![1.0; num_variables], constraints: vec![1.0; num_constraints] }
    }
    /// Evaluates the problem at `x0` when the mode needs derivative information.
    pub fn compute(problem: &mut dyn NlpProblemInterface, x0: &[f64], num_constraints: usize, jacobian_structure: &[(usize, usize)], scaling_mode: &ScalingMode, hessian_mode: &HessianMode) -> Result<Self, ReactError> {
        let n = x0.len();
        let mut out_self = Self::new_identity(n, num_constraints);

        match scaling_mode {
            ScalingMode::None => { }
            ScalingMode::GradientBased => {
                let mut grad = vec![0.0; n];
                problem.gradient(x0, &mut grad)?;
                out_self.objective = gradient_scaling_factor(grad.iter().fold(0.0, |acc, g| acc.max(g.abs())));

                let mut values = vec![0.0; jacobian_structure.len()];
                problem.jacobian_values(x0, &mut values)?;
                let mut row_max = vec![0.0_f64; num_constraints];
                for ((r, _), v) in jacobian_structure.iter().zip(values.iter()) {
                    row_max[*r] = row_max[*r].max(v.abs());
                }
                out_self.constraints = row_max.iter().map(|m| gradient_scaling_factor(*m)).collect();
            }
            ScalingMode::User { objective, variables, constraints } => {
                out_self.objective = positive_or_one(*objective);
                out_self.variables = vec![positive_or_one(*variables); n];
                out_self.constraints = vec![positive_or_one(*constraints); num_constraints];
            }
        }

        if let HessianMode::ExactDiagonal = hessian_mode {
            let mut diag = vec![0.0; n];
            if problem.hessian_diagonal(x0, &mut diag)? {
                for (s, h) in out_self.variables.iter_mut().zip(diag.iter()) {
                    if *h > HESSIAN_PRECONDITION_FLOOR && h.is_finite() { *s *= h.sqrt(); }
                }
            }
        }

        Ok(out_self)
    }
    pub fn scale_variables(&self, x: &[f64], z: &mut [f64]) {
        for i in 0..x.len() { z[i] = self.variables[i] * x[i]; }
    }
    pub fn unscale_variables(&self, z: &[f64], x: &mut [f64]) {
        for i in 0..z.len() { x[i] = z[i] / self.variables[i]; }
    }
    pub fn scale_bounds(&self, lower: &[f64], upper: &[f64], factors: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let l = lower.iter().zip(factors.iter()).map(|(b, s)| b * s).collect();
        let u = upper.iter().zip(factors.iter()).map(|(b, s)| b * s).collect();
        (l, u)
    }
    /// `grad_z = objective * grad_x / variables`
    pub fn scale_gradient(&self, grad_x: &[f64], grad_z: &mut [f64]) {
        for i in 0..grad_x.len() { grad_z[i] = self.objective * grad_x[i] / self.variables[i]; }
    }
    pub fn scale_constraints(&self, g: &[f64], g_s: &mut [f64]) {
        for i in 0..g.len() { g_s[i] = self.constraints[i] * g[i]; }
    }
    /// `J_s^T d = (1 / variables) * (J^T (constraints * d))` from sparse triplets.
    pub fn scaled_jacobian_transpose_product(&self, structure: &[(usize, usize)], values: &[f64], d: &[f64], out: &mut [f64]) {
        out.iter_mut().for_each(|o| *o = 0.0);
        for ((r, c), v) in structure.iter().zip(values.iter()) {
            out[*c] += v * self.constraints[*r] * d[*r];
        }
        for (o, s) in out.iter_mut().zip(self.variables.iter()) { *o /= s; }
    }
}

fn gradient_scaling_factor(max_entry: f64) -> f64 {
    return if max_entry > GRADIENT_SCALING_MAX && max_entry.is_finite() { GRADIENT_SCALING_MAX / max_entry } else { 1.0 };
}

fn positive_or_one(a: f64) -> f64 {
    return if a > 0.0 && a.is_finite() { a } else { 1.0 };
}
