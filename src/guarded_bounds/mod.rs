use nalgebra::{DMatrix, DVector};
use serde::{Serialize, Deserialize};
use crate::utils::utils_console::{ReactLogEvent, ReactLogSink};
use crate::utils::utils_errors::ReactError;

/// Shape of the guard zones near each joint position limit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GuardParameters {
    /// Fraction of the joint range reserved for guarding.  The guard width on each side is
    /// `0.25 * ratio * (max - min)`.
    pub ratio: f64,
    /// Gain of the tanh blend inside the guard band.
    pub steepness: f64
}
impl Default for GuardParameters {
    fn default() -> Self {
        Self { ratio: 0.1, steepness: 10.0 }
    }
}

/// Per-joint thresholds, all in joint position units.
#[derive(Clone, Debug, PartialEq)]
pub struct JointGuard {
    pub width: f64,
    pub min_ext: f64,
    pub min_int: f64,
    pub min_cog: f64,
    pub max_ext: f64,
    pub max_int: f64,
    pub max_cog: f64
}
impl JointGuard {
    pub fn new(min: f64, max: f64, ratio: f64) -> Self {
        let width = 0.25 * ratio * (max - min);
        let min_ext = min + width;
        let min_int = min_ext + width;
        let max_ext = max - width;
        let max_int = max_ext - width;
        Self {
            width,
            min_ext,
            min_int,
            min_cog: 0.5 * (min_ext + min_int),
            max_ext,
            max_int,
            max_cog: 0.5 * (max_ext + max_int)
        }
    }
    pub fn is_degenerate(&self) -> bool {
        self.width <= f64::EPSILON
    }
    /// `(lower, upper)` factors in `[0, 1]` that scale the static velocity limits at joint
    /// position `q`.  Motion away from a nearby limit is left unrestricted.
    pub fn factors(&self, q: f64, steepness: f64) -> (f64, f64) {
        if self.is_degenerate() { return (0.0, 0.0); }

        return if q >= self.min_int && q <= self.max_int {
            (1.0, 1.0)
        } else if q < self.min_int {
            let lower = if q <= self.min_ext { 0.0 } else { 0.5 * (1.0 + (steepness * (q - self.min_cog) / self.width).tanh()) };
            (lower, 1.0)
        } else {
            let upper = if q >= self.max_ext { 0.0 } else { 0.5 * (1.0 + (-steepness * (q - self.max_cog) / self.width).tanh()) };
            (1.0, upper)
        }
    }
}

/// Velocity bounds for every joint, `lower[i] <= upper[i]`.
#[derive(Clone, Debug, PartialEq)]
pub struct VelocityBounds {
    pub lower: DVector<f64>,
    pub upper: DVector<f64>
}

/// Turns static velocity limits into state dependent bounds that shrink toward zero as a joint
/// approaches its position limits.  Guards are built once from the joint limits; `compute` is
/// called once per solve from the snapshot angles.
#[derive(Clone, Debug)]
pub struct GuardedBoundsComputer {
    guards: Vec<JointGuard>,
    steepness: f64
}
impl GuardedBoundsComputer {
    pub fn new(joint_limits: &DMatrix<f64>, parameters: &GuardParameters) -> Self {
        let guards = (0..joint_limits.nrows()).map(|i| JointGuard::new(joint_limits[(i, 0)], joint_limits[(i, 1)], parameters.ratio)).collect();
        Self { guards, steepness: parameters.steepness }
    }
    /// `velocity_limits` is `d x 2` (`[min, max]` per joint).  A joint whose blended bounds
    /// cross collapses to the endpoint of smaller magnitude, clamped back into its static range.
    pub fn compute(&self, q0: &DVector<f64>, velocity_limits: &DMatrix<f64>, log_sink: &dyn ReactLogSink) -> Result<VelocityBounds, ReactError> {
        let d = self.guards.len();
        if q0.len() != d {
            return Err(ReactError::new_dimension_mismatch_error("joint angles", d, q0.len(), file!(), line!()));
        }
        if velocity_limits.nrows() != d || velocity_limits.ncols() != 2 {
            return Err(ReactError::new_dimension_mismatch_error_str(&format!("velocity limits must be {} x 2, got {} x {}", d, velocity_limits.nrows(), velocity_limits.ncols()), file!(), line!()));
        }

        let mut lower = DVector::zeros(d);
        let mut upper = DVector::zeros(d);
        for (i, guard) in self.guards.iter().enumerate() {
            if guard.is_degenerate() {
                log_sink.emit(ReactLogEvent::DegenerateJointRange { joint_idx: i, min: guard.min_ext - guard.width, max: guard.max_ext + guard.width });
            }
            let (v_min, v_max) = (velocity_limits[(i, 0)], velocity_limits[(i, 1)]);
            let (f_lower, f_upper) = guard.factors(q0[i], self.steepness);
            let mut l = f_lower * v_min;
            let mut u = f_upper * v_max;
            if l > u {
                let closer = if l.abs() <= u.abs() { l } else { u };
                let resolved = closer.max(v_min).min(v_max);
                log_sink.emit(ReactLogEvent::DegenerateBound { joint_idx: i, lower: l, upper: u, resolved });
                l = resolved;
                u = resolved;
            }
            lower[i] = l;
            upper[i] = u;
        }

        Ok(VelocityBounds { lower, upper })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::utils::utils_console::{LogLevel, MemoryLogSink, NullLogSink};

    fn guard() -> JointGuard {
        JointGuard::new(-1.0, 1.0, 0.1)
    }

    #[test]
    fn interior_center_is_unrestricted() {
        assert_eq!(guard().factors(0.0, 10.0), (1.0, 1.0));
        let g = guard();
        assert_eq!(g.factors(g.min_int, 10.0), (1.0, 1.0));
        assert_eq!(g.factors(g.max_int, 10.0), (1.0, 1.0));
    }

    #[test]
    fn motion_into_the_limit_is_blocked_at_the_limit() {
        assert_eq!(guard().factors(-1.0, 10.0), (0.0, 1.0));
        assert_eq!(guard().factors(1.0, 10.0), (1.0, 0.0));
        // beyond the limits too
        assert_eq!(guard().factors(1.3, 10.0), (1.0, 0.0));
    }

    #[test]
    fn factor_is_monotonic_inside_the_band() {
        let g = guard();
        let n = 200;
        let mut prev_lower = -1.0;
        let mut prev_upper = 2.0;
        for k in 0..=n {
            let q = g.min_ext - g.width + (2.0 * g.width) * (k as f64) / (n as f64);
            let (l, _) = g.factors(q, 10.0);
            assert!(l >= prev_lower);
            prev_lower = l;

            let q = g.max_int + (2.0 * g.width) * (k as f64) / (n as f64);
            let (_, u) = g.factors(q, 10.0);
            assert!(u <= prev_upper);
            prev_upper = u;
        }
    }

    #[test]
    fn factor_is_continuous_across_thresholds() {
        let g = guard();
        let h = 1e-9;
        for &(t, lower_side) in &[(g.min_ext, true), (g.min_int, true), (g.max_int, false), (g.max_ext, false)] {
            let (a, b) = (g.factors(t - h, 10.0), g.factors(t + h, 10.0));
            let (fa, fb) = if lower_side { (a.0, b.0) } else { (a.1, b.1) };
            assert!((fa - fb).abs() < 1e-4, "jump of {} at {}", (fa - fb).abs(), t);
        }
    }

    #[test]
    fn bounds_stay_ordered_and_inside_the_static_limits() {
        let joint_limits = DMatrix::from_row_slice(3, 2, &[-1.0, 1.0, 0.0, 2.0, -0.5, 0.5]);
        let computer = GuardedBoundsComputer::new(&joint_limits, &GuardParameters::default());
        let v_lim = DMatrix::from_row_slice(3, 2, &[-2.0, 2.0, -1.0, 1.0, -0.3, 0.3]);
        for &q in &[-1.0, -0.97, -0.95, -0.9, 0.0, 0.4, 0.49, 0.5, 0.96, 1.0, 1.99, 2.0] {
            let q0 = DVector::from_element(3, q);
            let b = computer.compute(&q0, &v_lim, &NullLogSink).unwrap();
            for i in 0..3 {
                assert!(b.lower[i] <= b.upper[i]);
                assert!(b.lower[i] >= v_lim[(i, 0)] && b.upper[i] <= v_lim[(i, 1)]);
            }
        }
        let b = computer.compute(&DVector::from_vec(vec![0.0, 1.0, 0.0]), &v_lim, &NullLogSink).unwrap();
        assert_relative_eq!(b.lower, DVector::from_vec(vec![-2.0, -1.0, -0.3]));
        assert_relative_eq!(b.upper, DVector::from_vec(vec![2.0, 1.0, 0.3]));
    }

    #[test]
    fn crossed_bounds_collapse_to_the_nearer_endpoint() {
        let joint_limits = DMatrix::from_row_slice(1, 2, &[-1.0, 1.0]);
        let computer = GuardedBoundsComputer::new(&joint_limits, &GuardParameters::default());
        // a strictly positive velocity range forced to zero on the upper side
        let v_lim = DMatrix::from_row_slice(1, 2, &[0.2, 1.0]);
        let sink = MemoryLogSink::new(LogLevel::Trace);
        let b = computer.compute(&DVector::from_element(1, 1.0), &v_lim, &sink).unwrap();
        assert_eq!(b.lower[0], b.upper[0]);
        assert_relative_eq!(b.lower[0], 0.2);
        assert!(sink.contains(|e| matches!(e, ReactLogEvent::DegenerateBound { joint_idx: 0, .. })));
    }

    #[test]
    fn empty_joint_range_pins_velocity() {
        let joint_limits = DMatrix::from_row_slice(1, 2, &[0.3, 0.3]);
        let computer = GuardedBoundsComputer::new(&joint_limits, &GuardParameters::default());
        let sink = MemoryLogSink::new(LogLevel::Warn);
        let b = computer.compute(&DVector::from_element(1, 0.3), &DMatrix::from_row_slice(1, 2, &[-1.0, 1.0]), &sink).unwrap();
        assert_eq!(b.lower[0], 0.0);
        assert_eq!(b.upper[0], 0.0);
        assert_eq!(sink.num_events_at_level(LogLevel::Warn), 1);
    }

    #[test]
    fn wrong_sizes_are_rejected() {
        let computer = GuardedBoundsComputer::new(&DMatrix::from_row_slice(2, 2, &[-1.0, 1.0, -1.0, 1.0]), &GuardParameters::default());
        let e = computer.compute(&DVector::zeros(3), &DMatrix::zeros(2, 2), &NullLogSink).unwrap_err();
        assert!(e.is_dimension_mismatch());
    }
}
