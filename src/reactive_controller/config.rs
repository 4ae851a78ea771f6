use std::path::Path;
use serde::{Serialize, Deserialize};
use crate::guarded_bounds::GuardParameters;
use crate::nonlinear_optimization::OptimizerParameters;
use crate::reaching_objective::{ReachingWeights, RestPosture, SlackPenalty};
use crate::self_avoidance::SelfAvoidanceCalibration;
use crate::utils::utils_console::{LogLevel, ReactLogEvent, ReactLogSink};
use crate::utils::utils_errors::ReactError;
use crate::utils::utils_traits::{SaveAndLoadable, ToAndFromRonString, ToAndFromTomlString};

/// Everything that shapes the per-cycle reaching problem.  Every field has a default, so a
/// config file only needs to name what it changes.
///
/// ## Example
/// ```
/// use optima_react::reactive_controller::config::ReactiveControllerConfig;
/// use optima_react::utils::utils_console::NullLogSink;
///
/// let config = ReactiveControllerConfig::load_validated_from_ron_string("(self_avoidance: true, weights: (velocity: 2.0, rest_posture: 0.0, position_slack: 1000.0, orientation_slack: 100.0))", &NullLogSink).expect("error");
/// assert!(config.self_avoidance);
/// assert_eq!(config.weights.velocity, 2.0);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactiveControllerConfig {
    pub weights: ReachingWeights,
    pub orientation_control: bool,
    pub self_avoidance: bool,
    pub additional_control_points: bool,
    pub position_tolerance: f64,
    pub orientation_tolerance: f64,
    pub control_point_tolerance: f64,
    /// Symmetric bound on every slack variable.  The default `Some(0.0)` pins the slacks so the
    /// reaching rows hold within their tolerance bands; `None` leaves slacks unbounded and lets
    /// the slack penalty trade reach against velocity.
    pub slack_bound: Option<f64>,
    pub slack_penalty: SlackPenalty,
    pub guard: GuardParameters,
    pub rest_posture: Option<RestPosture>,
    pub self_avoidance_calibration: SelfAvoidanceCalibration,
    /// Number of distal joints that do not move the "Elbow" control point.
    pub elbow_distal_joints: usize,
    /// Used in place of a non-positive `dt`.
    pub default_dt: f64,
    pub optimizer: OptimizerParameters,
    pub log_level: LogLevel
}
impl Default for ReactiveControllerConfig {
    fn default() -> Self {
        Self {
            weights: ReachingWeights::default(),
            orientation_control: true,
            self_avoidance: false,
            additional_control_points: false,
            position_tolerance: 1e-4,
            orientation_tolerance: 0.4,
            control_point_tolerance: 1e-4,
            slack_bound: Some(0.0),
            slack_penalty: SlackPenalty::default(),
            guard: GuardParameters::default(),
            rest_posture: None,
            self_avoidance_calibration: SelfAvoidanceCalibration::default(),
            elbow_distal_joints: 4,
            default_dt: 0.05,
            optimizer: OptimizerParameters::default(),
            log_level: LogLevel::default()
        }
    }
}
impl ReactiveControllerConfig {
    /// Replaces invalid numeric values with their defaults, reporting each replacement as a
    /// `ConfigValueClamped` event.
    pub fn validated(mut self, log_sink: &dyn ReactLogSink) -> Self {
        let d = Self::default();

        let check = |field: &str, value: &mut f64, default: f64, valid: bool| {
            if !valid {
                log_sink.emit(ReactLogEvent::ConfigValueClamped { field: field.to_string(), given: *value, substituted: default });
                *value = default;
            }
        };

        let w = self.weights.velocity;
        check("weights.velocity", &mut self.weights.velocity, d.weights.velocity, w >= 0.0 && w.is_finite());
        let w = self.weights.rest_posture;
        check("weights.rest_posture", &mut self.weights.rest_posture, d.weights.rest_posture, w >= 0.0 && w.is_finite());
        let w = self.weights.position_slack;
        check("weights.position_slack", &mut self.weights.position_slack, d.weights.position_slack, w >= 0.0 && w.is_finite());
        let w = self.weights.orientation_slack;
        check("weights.orientation_slack", &mut self.weights.orientation_slack, d.weights.orientation_slack, w >= 0.0 && w.is_finite());

        let t = self.position_tolerance;
        check("position_tolerance", &mut self.position_tolerance, d.position_tolerance, t > 0.0);
        let t = self.orientation_tolerance;
        check("orientation_tolerance", &mut self.orientation_tolerance, d.orientation_tolerance, t > 0.0);
        let t = self.control_point_tolerance;
        check("control_point_tolerance", &mut self.control_point_tolerance, d.control_point_tolerance, t > 0.0);
        let t = self.default_dt;
        check("default_dt", &mut self.default_dt, d.default_dt, t > 0.0 && t.is_finite());

        let r = self.guard.ratio;
        check("guard.ratio", &mut self.guard.ratio, d.guard.ratio, r > 0.0 && r <= 1.0);
        let s = self.guard.steepness;
        check("guard.steepness", &mut self.guard.steepness, d.guard.steepness, s > 0.0 && s.is_finite());

        if let SlackPenalty::PseudoHuber { delta } = &mut self.slack_penalty {
            let given = *delta;
            check("slack_penalty.delta", delta, 1e-3, given > 0.0);
        }
        if let Some(bound) = &mut self.slack_bound {
            let given = *bound;
            check("slack_bound", bound, 0.0, given >= 0.0);
        }

        let t = self.optimizer.tolerance;
        check("optimizer.tolerance", &mut self.optimizer.tolerance, d.optimizer.tolerance, t > 0.0);
        let t = self.optimizer.constraint_tolerance;
        check("optimizer.constraint_tolerance", &mut self.optimizer.constraint_tolerance, d.optimizer.constraint_tolerance, t > 0.0);
        let t = self.optimizer.acceptable_tolerance;
        check("optimizer.acceptable_tolerance", &mut self.optimizer.acceptable_tolerance, d.optimizer.acceptable_tolerance, t > 0.0);

        self
    }
    pub fn load_validated_from_ron_string(ron_string: &str, log_sink: &dyn ReactLogSink) -> Result<Self, ReactError> {
        Ok(Self::load_from_ron_string(ron_string)?.validated(log_sink))
    }
    pub fn load_validated_from_json_string(json_string: &str, log_sink: &dyn ReactLogSink) -> Result<Self, ReactError> {
        Ok(Self::load_from_json_string(json_string)?.validated(log_sink))
    }
    pub fn load_validated_from_toml_string(toml_string: &str, log_sink: &dyn ReactLogSink) -> Result<Self, ReactError> {
        Ok(Self::load_from_toml_string(toml_string)?.validated(log_sink))
    }
    /// Picks the format from the file extension (`ron`, `toml`, anything else is json).
    pub fn load_validated_from_path(path: &Path, log_sink: &dyn ReactLogSink) -> Result<Self, ReactError> {
        let s = std::fs::read_to_string(path).map_err(|e| ReactError::new_config_load_error("controller", &format!("Could not read {:?}: {}", path, e), file!(), line!()))?;
        return match path.extension().and_then(|e| e.to_str()) {
            Some("ron") => { Self::load_validated_from_ron_string(&s, log_sink) }
            Some("toml") => { Self::load_validated_from_toml_string(&s, log_sink) }
            _ => { Self::load_validated_from_json_string(&s, log_sink) }
        }
    }
}
