//! Raw score computation and the scoring-service report.
//!
//! Raw QLS is the mean of Re tr(ρ·ρ†) over a sample set. It is an unscaled
//! physical quantity; [`crate::scale::ScoreScale`] maps it into [0, 1].

use serde::Serialize;

use crate::error::{QlsError, Result};
use crate::matrix::DensityMatrix;
use crate::scale::{Interval, ScoreScale};

/// Descriptive record attached to every raw score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreComponents {
    pub num_samples: usize,
    /// Smallest and largest matrix dimension; samples may differ in size.
    pub min_dimension: usize,
    pub max_dimension: usize,
    pub min_purity: f64,
    pub max_purity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawScore {
    pub value: f64,
    pub components: ScoreComponents,
}

/// Scoring-service output: normalized score, clamped interval, components.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreReport {
    pub qls: f64,
    pub interval: Interval,
    pub components: ScoreComponents,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_raw: Option<f64>,
}

/// Aggregate a sample set into one raw score.
///
/// Each sample is scored on its own, so dimensions may differ between
/// samples. The set must be non-empty.
pub fn compute_raw_score(samples: &[DensityMatrix]) -> Result<RawScore> {
    if samples.is_empty() {
        return Err(QlsError::data_format("sample set is empty"));
    }
    let min_dimension = samples.iter().map(DensityMatrix::dim).min().unwrap_or(0);
    let max_dimension = samples.iter().map(DensityMatrix::dim).max().unwrap_or(0);

    let purities: Vec<f64> = samples.iter().map(|m| m.trace_rho_rho_dagger()).collect();
    let value = purities.iter().sum::<f64>() / purities.len() as f64;
    let min_purity = purities.iter().copied().fold(f64::INFINITY, f64::min);
    let max_purity = purities.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Ok(RawScore {
        value,
        components: ScoreComponents {
            num_samples: samples.len(),
            min_dimension,
            max_dimension,
            min_purity,
            max_purity,
        },
    })
}

/// Scoring-service configuration: the raw range and the fixed half-width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scorer {
    scale: ScoreScale,
    half_width: f64,
}

impl Scorer {
    pub fn new(scale: ScoreScale, half_width: f64) -> Result<Self> {
        if !half_width.is_finite() || half_width < 0.0 {
            return Err(QlsError::configuration(format!(
                "score half-width must be a finite non-negative number, got {half_width}"
            )));
        }
        Ok(Self { scale, half_width })
    }

    pub fn scale(&self) -> ScoreScale {
        self.scale
    }

    pub fn half_width(&self) -> f64 {
        self.half_width
    }

    /// Raw score → normalized score → fixed-width interval clamped to [0, 1].
    pub fn score(&self, samples: &[DensityMatrix], include_raw: bool) -> Result<ScoreReport> {
        let raw = compute_raw_score(samples)?;
        let qls = self.scale.normalize(raw.value);
        let interval = Interval::around(qls, self.half_width).clamped_unit();
        log::debug!(
            "scored {} samples: raw={:.6} qls={:.4}",
            raw.components.num_samples,
            raw.value,
            qls
        );
        Ok(ScoreReport {
            qls,
            interval,
            components: raw.components,
            debug_raw: include_raw.then_some(raw.value),
        })
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self {
            scale: ScoreScale::default(),
            half_width: crate::scale::DEFAULT_SCORE_HALF_WIDTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diag(values: &[f64]) -> DensityMatrix {
        let n = values.len();
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| (0..n).map(|j| if i == j { values[i] } else { 0.0 }).collect())
            .collect();
        DensityMatrix::from_real_rows(&rows).unwrap()
    }

    #[test]
    fn test_raw_score_is_mean_purity() {
        let samples = vec![diag(&[1.0, 0.0]), diag(&[0.5, 0.5])];
        let raw = compute_raw_score(&samples).unwrap();
        assert!((raw.value - 0.75).abs() < 1e-12);
        assert_eq!(raw.components.num_samples, 2);
        assert_eq!(raw.components.min_dimension, 2);
        assert_eq!(raw.components.max_dimension, 2);
        assert!((raw.components.min_purity - 0.5).abs() < 1e-12);
        assert!((raw.components.max_purity - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_sample_set_rejected() {
        let err = compute_raw_score(&[]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DataFormat);
    }

    #[test]
    fn test_mixed_dimensions_averaged() {
        // purities 0.5 and 1/3
        let third = 1.0 / 3.0;
        let raw = compute_raw_score(&[diag(&[0.5, 0.5]), diag(&[third, third, third])]).unwrap();
        assert!((raw.value - (0.5 + third) / 2.0).abs() < 1e-12);
        assert_eq!(raw.components.min_dimension, 2);
        assert_eq!(raw.components.max_dimension, 3);
    }

    #[test]
    fn test_scorer_report_matches_reference_example() {
        // Purity 1.5 from a diagonal with entries whose squares sum to 1.5.
        let m = diag(&[1.0, 0.5f64.sqrt()]);
        let report = Scorer::default().score(&[m], true).unwrap();
        assert!((report.qls - 0.5).abs() < 1e-12);
        assert!((report.interval.lo - 0.35).abs() < 1e-12);
        assert!((report.interval.hi - 0.65).abs() < 1e-12);
        assert!((report.debug_raw.unwrap() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_debug_raw_omitted_by_default() {
        let report = Scorer::default().score(&[diag(&[1.0, 0.0])], false).unwrap();
        assert!(report.debug_raw.is_none());
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("debug_raw").is_none());
        assert!(json.get("qls").is_some());
    }

    #[test]
    fn test_high_raw_score_clamps_to_one() {
        // Unnormalized matrix with purity 4 > MAX.
        let report = Scorer::default().score(&[diag(&[2.0])], false).unwrap();
        assert_eq!(report.qls, 1.0);
        assert!((report.interval.lo - 0.85).abs() < 1e-12);
        assert_eq!(report.interval.hi, 1.0);
    }

    #[test]
    fn test_negative_half_width_rejected() {
        assert!(Scorer::new(ScoreScale::default(), -0.1).is_err());
        assert!(Scorer::new(ScoreScale::default(), f64::NAN).is_err());
    }
}
