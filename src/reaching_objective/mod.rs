use nalgebra::DVector;
use serde::{Serialize, Deserialize};
use crate::utils::utils_errors::ReactError;

/// Nonnegative weights of the reaching objective.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReachingWeights {
    /// `w1`: deviation from the starting velocity.
    pub velocity: f64,
    /// `w2`: pull toward the rest posture.
    pub rest_posture: f64,
    /// `w3`: position reaching slack.
    pub position_slack: f64,
    /// `w4`: orientation reaching slack, only used with orientation control on.
    pub orientation_slack: f64
}
impl Default for ReachingWeights {
    fn default() -> Self {
        Self { velocity: 1.0, rest_posture: 0.0, position_slack: 1000.0, orientation_slack: 100.0 }
    }
}

/// How slack variables are penalized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SlackPenalty {
    /// `w * |s|`, differentiated with the subgradient `w * sign(s)` (zero at the kink).
    Abs,
    /// `w * (sqrt(s^2 + delta^2) - delta)`, a smooth surrogate of `w * |s|`.
    PseudoHuber { delta: f64 }
}
impl Default for SlackPenalty {
    fn default() -> Self {
        Self::PseudoHuber { delta: 1e-3 }
    }
}
impl SlackPenalty {
    pub fn value(&self, w: f64, s: f64) -> f64 {
        match self {
            SlackPenalty::Abs => { w * s.abs() }
            SlackPenalty::PseudoHuber { delta } => { w * ((s * s + delta * delta).sqrt() - delta) }
        }
    }
    pub fn derivative(&self, w: f64, s: f64) -> f64 {
        match self {
            SlackPenalty::Abs => {
                if s > 0.0 { w } else if s < 0.0 { -w } else { 0.0 }
            }
            SlackPenalty::PseudoHuber { delta } => { w * s / (s * s + delta * delta).sqrt() }
        }
    }
    pub fn second_derivative(&self, w: f64, s: f64) -> f64 {
        match self {
            SlackPenalty::Abs => { 0.0 }
            SlackPenalty::PseudoHuber { delta } => {
                let r = s * s + delta * delta;
                w * delta * delta / (r * r.sqrt())
            }
        }
    }
}

/// A comfortable posture the chain is biased toward, with a per-joint weight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RestPosture {
    pub positions: Vec<f64>,
    pub weights: Vec<f64>
}
impl RestPosture {
    pub fn new(positions: Vec<f64>, weights: Vec<f64>) -> Self {
        Self { positions, weights }
    }
    /// Zero posture with `weight` on the first `num_proximal` joints and nothing elsewhere.
    pub fn new_proximal(num_dofs: usize, num_proximal: usize, weight: f64) -> Self {
        let weights = (0..num_dofs).map(|i| if i < num_proximal { weight } else { 0.0 }).collect();
        Self { positions: vec![0.0; num_dofs], weights }
    }
    pub fn num_dofs(&self) -> usize {
        self.positions.len()
    }
}

/// Objective over `x = [v (d), s_p (3), s_o (3)]`:
///
/// `w1 (v.v - 2 v.v0) + P(w3, s_p) + [orientation] P(w4, s_o) + w2 sum_i rw_i^2 dt v_i (2 (q0_i - rest_i) + dt v_i)`
///
/// The rest posture term equals `w2 sum_i rw_i^2 ((rest_i - q1_i)^2 - (rest_i - q0_i)^2)` with
/// `q1 = q0 + dt v`, so its gradient pulls the predicted posture toward `rest`.
#[derive(Clone, Debug)]
pub struct ReachingObjective {
    num_dofs: usize,
    v0: DVector<f64>,
    q0: DVector<f64>,
    dt: f64,
    weights: ReachingWeights,
    rest_positions: DVector<f64>,
    rest_weights_squared: DVector<f64>,
    slack_penalty: SlackPenalty,
    orientation_control: bool
}
impl ReachingObjective {
    pub fn new(v0: &DVector<f64>, q0: &DVector<f64>, dt: f64, weights: &ReachingWeights, rest_posture: Option<&RestPosture>, slack_penalty: &SlackPenalty, orientation_control: bool) -> Result<Self, ReactError> {
        let num_dofs = q0.len();
        if v0.len() != num_dofs {
            return Err(ReactError::new_dimension_mismatch_error("starting velocity", num_dofs, v0.len(), file!(), line!()));
        }
        let (rest_positions, rest_weights_squared) = match rest_posture {
            None => { (DVector::zeros(num_dofs), DVector::zeros(num_dofs)) }
            Some(rest) => {
                if rest.positions.len() != num_dofs || rest.weights.len() != num_dofs {
                    return Err(ReactError::new_dimension_mismatch_error("rest posture", num_dofs, rest.positions.len().min(rest.weights.len()), file!(), line!()));
                }
                (DVector::from_column_slice(&rest.positions), DVector::from_iterator(num_dofs, rest.weights.iter().map(|w| w * w)))
            }
        };

        Ok(Self {
            num_dofs,
            v0: v0.clone(),
            q0: q0.clone(),
            dt,
            weights: weights.clone(),
            rest_positions,
            rest_weights_squared,
            slack_penalty: slack_penalty.clone(),
            orientation_control
        })
    }
    pub fn num_variables(&self) -> usize {
        self.num_dofs + 6
    }
    fn orientation_weight(&self) -> f64 {
        if self.orientation_control { self.weights.orientation_slack } else { 0.0 }
    }
    pub fn value(&self, x: &[f64]) -> f64 {
        let d = self.num_dofs;
        let w = &self.weights;
        let mut out = 0.0;
        for i in 0..d {
            let v = x[i];
            out += w.velocity * (v * v - 2.0 * v * self.v0[i]);
            out += w.rest_posture * self.rest_weights_squared[i] * self.dt * v * (2.0 * (self.q0[i] - self.rest_positions[i]) + self.dt * v);
        }
        let w4 = self.orientation_weight();
        for k in 0..3 {
            out += self.slack_penalty.value(w.position_slack, x[d + k]);
            if w4 != 0.0 { out += self.slack_penalty.value(w4, x[d + 3 + k]); }
        }
        out
    }
    pub fn gradient(&self, x: &[f64], grad: &mut [f64]) {
        let d = self.num_dofs;
        let w = &self.weights;
        for i in 0..d {
            let q1 = self.q0[i] + self.dt * x[i];
            grad[i] = 2.0 * w.velocity * (x[i] - self.v0[i]) - 2.0 * self.dt * w.rest_posture * self.rest_weights_squared[i] * (self.rest_positions[i] - q1);
        }
        let w4 = self.orientation_weight();
        for k in 0..3 {
            grad[d + k] = self.slack_penalty.derivative(w.position_slack, x[d + k]);
            grad[d + 3 + k] = if w4 != 0.0 { self.slack_penalty.derivative(w4, x[d + 3 + k]) } else { 0.0 };
        }
    }
    /// The Hessian is diagonal; this writes the diagonal.
    pub fn hessian_diagonal(&self, x: &[f64], diag: &mut [f64]) {
        let d = self.num_dofs;
        let w = &self.weights;
        for i in 0..d {
            diag[i] = 2.0 * w.velocity + 2.0 * self.dt * self.dt * w.rest_posture * self.rest_weights_squared[i];
        }
        let w4 = self.orientation_weight();
        for k in 0..3 {
            diag[d + k] = self.slack_penalty.second_derivative(w.position_slack, x[d + k]);
            diag[d + 3 + k] = if w4 != 0.0 { self.slack_penalty.second_derivative(w4, x[d + 3 + k]) } else { 0.0 };
        }
    }
}
