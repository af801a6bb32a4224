//! Score normalization and prediction intervals.
//!
//! Normalization is the affine map `(x - min) / (max - min)` clamped to
//! [0, 1]. The alternative `x / 3.0` form is not supported; with the default
//! range of [0, 3] both agree.

use serde::{Deserialize, Serialize};

use crate::error::{QlsError, Result};

pub const DEFAULT_SCORE_MIN: f64 = 0.0;
pub const DEFAULT_SCORE_MAX: f64 = 3.0;
/// Half-width of the scoring service's fixed interval.
pub const DEFAULT_SCORE_HALF_WIDTH: f64 = 0.15;

/// Clamp into [0, 1]. NaN maps to 0.
pub fn clamp01(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

/// Assumed raw-score range used for normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreScale {
    min: f64,
    max: f64,
}

impl ScoreScale {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() {
            return Err(QlsError::configuration(format!(
                "score range must be finite, got [{min}, {max}]"
            )));
        }
        if min == max {
            return Err(QlsError::configuration(format!(
                "score range is degenerate (min == max == {min}); normalization is undefined"
            )));
        }
        if min > max {
            return Err(QlsError::configuration(format!(
                "score range is inverted: min {min} > max {max}"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn normalize(&self, raw: f64) -> f64 {
        clamp01((raw - self.min) / (self.max - self.min))
    }
}

impl Default for ScoreScale {
    fn default() -> Self {
        Self {
            min: DEFAULT_SCORE_MIN,
            max: DEFAULT_SCORE_MAX,
        }
    }
}

/// Closed interval `[lo, hi]`, serialized as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "[f64; 2]", from = "[f64; 2]")]
pub struct Interval {
    pub lo: f64,
    pub hi: f64,
}

impl Interval {
    /// `[center - half_width, center + half_width]`, unclamped.
    pub fn around(center: f64, half_width: f64) -> Self {
        Self {
            lo: center - half_width,
            hi: center + half_width,
        }
    }

    /// Both ends clamped into [0, 1].
    pub fn clamped_unit(self) -> Self {
        Self {
            lo: clamp01(self.lo),
            hi: clamp01(self.hi),
        }
    }

    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }

    pub fn contains(&self, x: f64) -> bool {
        self.lo <= x && x <= self.hi
    }
}

impl From<Interval> for [f64; 2] {
    fn from(i: Interval) -> Self {
        [i.lo, i.hi]
    }
}

impl From<[f64; 2]> for Interval {
    fn from([lo, hi]: [f64; 2]) -> Self {
        Self { lo, hi }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_midpoint_example() {
        let scale = ScoreScale::default();
        let q = scale.normalize(1.5);
        assert!(close(q, 0.5));
        let i = Interval::around(q, DEFAULT_SCORE_HALF_WIDTH).clamped_unit();
        assert!(close(i.lo, 0.35));
        assert!(close(i.hi, 0.65));
    }

    #[test]
    fn test_negative_raw_clamps_to_zero() {
        let scale = ScoreScale::default();
        let q = scale.normalize(-1.0);
        assert_eq!(q, 0.0);
        let i = Interval::around(q, DEFAULT_SCORE_HALF_WIDTH).clamped_unit();
        assert_eq!(i.lo, 0.0);
        assert!(close(i.hi, 0.15));
    }

    #[test]
    fn test_normalized_in_unit_range_and_monotonic() {
        let scale = ScoreScale::new(0.0, 3.0).unwrap();
        let mut prev = f64::NEG_INFINITY;
        for step in 0..=300 {
            let raw = step as f64 * 0.01;
            let q = scale.normalize(raw);
            assert!((0.0..=1.0).contains(&q));
            assert!(q >= prev, "not monotonic at raw={raw}");
            prev = q;
        }
    }

    #[test]
    fn test_clamp_is_idempotent() {
        for x in [-5.0, -0.0, 0.3, 1.0, 1.7, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(clamp01(clamp01(x)), clamp01(x));
        }
    }

    #[test]
    fn test_interval_contains_point_after_clamping() {
        let scale = ScoreScale::default();
        for raw in [-2.0, 0.0, 0.1, 1.0, 2.95, 3.0, 10.0] {
            let q = scale.normalize(raw);
            let i = Interval::around(q, 0.15).clamped_unit();
            assert!(i.contains(q));
            assert!(i.lo >= 0.0 && i.hi <= 1.0);
        }
    }

    #[test]
    fn test_degenerate_range_rejected() {
        let err = ScoreScale::new(1.0, 1.0).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_inverted_and_nonfinite_ranges_rejected() {
        assert!(ScoreScale::new(3.0, 0.0).is_err());
        assert!(ScoreScale::new(f64::NAN, 1.0).is_err());
        assert!(ScoreScale::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_nonzero_min_uses_affine_form() {
        let scale = ScoreScale::new(1.0, 3.0).unwrap();
        assert!(close(scale.normalize(2.0), 0.5));
    }

    #[test]
    fn test_interval_serializes_as_pair() {
        let json = serde_json::to_string(&Interval { lo: 0.25, hi: 0.5 }).unwrap();
        assert_eq!(json, "[0.25,0.5]");
        let back: Interval = serde_json::from_str(&json).unwrap();
        assert_eq!(back.lo, 0.25);
    }
}
