//! Split-conformal recalibration of the prediction interval half-width.
//!
//! Nonconformity scores are absolute residuals `|y − ŷ|` on a reference
//! dataset; the half-width is their 90th percentile. Without ground truth the
//! scores degrade to `|ŷ − median(ŷ)|`, which only measures spread.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{QlsError, Result};
use crate::pipeline::QlsModel;

/// Coverage level of the stored and recalibrated half-widths.
pub const COVERAGE: f64 = 0.90;

/// How a half-width was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationSource {
    /// `conformal_width_90` from the metadata file.
    StoredDefault,
    /// 90th percentile of |truth − prediction|.
    Residual,
    /// No truth column: 90th percentile of |prediction − median|.
    MedianDeviation,
}

impl CalibrationSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StoredDefault => "stored_default",
            Self::Residual => "residual",
            Self::MedianDeviation => "median_deviation",
        }
    }

    pub fn is_degraded(self) -> bool {
        self == Self::MedianDeviation
    }
}

impl std::fmt::Display for CalibrationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Recalibration {
    pub half_width: f64,
    pub source: CalibrationSource,
    pub n_rows: usize,
}

/// Linear-interpolated quantile between order statistics.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let q = q.clamp(0.0, 1.0);
    let idx = q * (sorted.len().saturating_sub(1)) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let t = idx - lo as f64;
        sorted[lo] * (1.0 - t) + sorted[hi] * t
    }
}

pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Absolute residuals between paired truth and predictions.
pub fn absolute_residuals(truth: &[f64], predictions: &[f64]) -> Vec<f64> {
    truth
        .iter()
        .zip(predictions)
        .map(|(y, p)| (y - p).abs())
        .collect()
}

/// Compute a new half-width from a reference dataset.
///
/// Fails without touching any state; callers keep their previous width.
pub fn recalibrate(model: &dyn QlsModel, dataset: &Dataset) -> Result<Recalibration> {
    if dataset.is_empty() {
        return Err(QlsError::data_format(
            "reference dataset has no usable rows after dropping incomplete ones",
        ));
    }
    let records: Vec<_> = dataset.records().cloned().collect();
    let predictions = model.predict_batch(&records)?;

    let (scores, source) = match dataset.targets() {
        Some(truth) => (absolute_residuals(&truth, &predictions), CalibrationSource::Residual),
        None => {
            let center = median(&predictions);
            log::warn!(
                "reference data has no QLS column; using spread around median prediction"
            );
            (
                predictions.iter().map(|p| (p - center).abs()).collect(),
                CalibrationSource::MedianDeviation,
            )
        }
    };

    let half_width = quantile(&scores, COVERAGE);
    if !half_width.is_finite() {
        return Err(QlsError::inference("recalibration produced a non-finite width"));
    }
    log::info!(
        "recalibrated half-width {half_width:.4} from {} row(s) ({source})",
        records.len()
    );
    Ok(Recalibration {
        half_width,
        source,
        n_rows: records.len(),
    })
}
