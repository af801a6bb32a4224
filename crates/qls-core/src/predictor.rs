//! Parameter-based prediction with a caller-supplied interval calibration.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::calibration::{self, Recalibration};
use crate::dataset::Dataset;
use crate::encoding::UnknownCategoryWarning;
use crate::error::Result;
use crate::metadata::CalibrationMetadata;
use crate::params::{OutOfRange, ParameterRecord};
use crate::pipeline::{Pipeline, QlsModel};
use crate::scale::Interval;
use crate::session::SessionCalibration;

/// Non-fatal notices attached to a prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictionWarning {
    UnknownCategory(UnknownCategoryWarning),
    OutOfRange(OutOfRange),
}

impl std::fmt::Display for PredictionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownCategory(w) => w.fmt(f),
            Self::OutOfRange(w) => w.fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub prediction: f64,
    /// `[prediction − w, prediction + w]`, not clamped.
    pub interval: Interval,
    pub half_width: f64,
    pub calibration: SessionCalibration,
    pub warnings: Vec<PredictionWarning>,
}

/// Shared, read-only predictor: trained model plus its metadata.
pub struct Predictor {
    model: Arc<dyn QlsModel>,
    metadata: CalibrationMetadata,
    fingerprint: Option<String>,
}

impl std::fmt::Debug for Predictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predictor")
            .field("metadata", &self.metadata)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

impl Predictor {
    pub fn new(model: Arc<dyn QlsModel>, metadata: CalibrationMetadata) -> Self {
        Self {
            model,
            metadata,
            fingerprint: None,
        }
    }

    /// Load `model.json` and `metadata.json`. Either failing is fatal.
    pub fn load(model_path: &Path, metadata_path: &Path) -> Result<Self> {
        let (pipeline, fingerprint) = Pipeline::load(model_path)?;
        let metadata = CalibrationMetadata::load(metadata_path)?;
        let known = pipeline.topologies();
        for topo in &metadata.topologies_seen {
            if !known.contains(topo) {
                log::warn!("metadata lists topology '{topo}' the model was not trained on");
            }
        }
        Ok(Self {
            model: Arc::new(pipeline),
            metadata,
            fingerprint: Some(fingerprint),
        })
    }

    pub fn metadata(&self) -> &CalibrationMetadata {
        &self.metadata
    }

    /// SHA-256 of the model file, when loaded from disk.
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn model(&self) -> &dyn QlsModel {
        self.model.as_ref()
    }

    /// Calibration a fresh session starts with.
    pub fn default_calibration(&self) -> SessionCalibration {
        SessionCalibration::stored_default(self.metadata.conformal_width_90)
    }

    pub fn predict(
        &self,
        record: &ParameterRecord,
        calibration: &SessionCalibration,
    ) -> Result<Prediction> {
        let estimate = self.model.predict(record)?;
        let mut warnings = Vec::new();
        if let Some(w) = estimate.warning {
            log::warn!("{w}");
            warnings.push(PredictionWarning::UnknownCategory(w));
        }
        for o in self.metadata.bounds.out_of_range(record) {
            log::debug!("{o}");
            warnings.push(PredictionWarning::OutOfRange(o));
        }
        let half_width = calibration.half_width;
        Ok(Prediction {
            prediction: estimate.value,
            interval: Interval::around(estimate.value, half_width),
            half_width,
            calibration: *calibration,
            warnings,
        })
    }

    pub fn recalibrate(&self, reference: &Dataset) -> Result<Recalibration> {
        calibration::recalibrate(self.model.as_ref(), reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationSource;
    use crate::pipeline::PointEstimate;

    struct Fixed(f64);

    impl QlsModel for Fixed {
        fn predict(&self, record: &ParameterRecord) -> Result<PointEstimate> {
            record.validate()?;
            Ok(PointEstimate {
                value: self.0,
                warning: None,
            })
        }
    }

    fn predictor(value: f64) -> Predictor {
        Predictor::new(Arc::new(Fixed(value)), CalibrationMetadata::default())
    }

    #[test]
    fn test_interval_uses_session_width() {
        let p = predictor(0.62);
        let cal = p.default_calibration();
        let out = p
            .predict(&ParameterRecord::new("ring", 0.2, 0.02, 0.04), &cal)
            .unwrap();
        assert_eq!(out.prediction, 0.62);
        assert!((out.interval.lo - 0.47).abs() < 1e-12);
        assert!((out.interval.hi - 0.77).abs() < 1e-12);
        assert_eq!(out.calibration.source, CalibrationSource::StoredDefault);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_interval_not_clamped() {
        let p = predictor(0.95);
        let out = p
            .predict(
                &ParameterRecord::new("ring", 0.2, 0.02, 0.04),
                &SessionCalibration::stored_default(0.1),
            )
            .unwrap();
        assert!(out.interval.hi > 1.0);
    }

    #[test]
    fn test_out_of_range_is_warning() {
        let p = predictor(0.5);
        let out = p
            .predict(
                &ParameterRecord::new("ring", 0.9, 0.02, 0.04),
                &p.default_calibration(),
            )
            .unwrap();
        assert_eq!(out.warnings.len(), 1);
        match &out.warnings[0] {
            PredictionWarning::OutOfRange(o) => assert_eq!(o.field, "J"),
            other => panic!("unexpected warning {other:?}"),
        }
    }

    #[test]
    fn test_warning_json_is_tagged() {
        let w = PredictionWarning::UnknownCategory(UnknownCategoryWarning {
            column: "topology".into(),
            value: "lattice3d".into(),
            known: vec!["line".into()],
        });
        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(json["kind"], "unknown_category");
        assert_eq!(json["value"], "lattice3d");
    }

    #[test]
    fn test_non_finite_input_fails() {
        let p = predictor(0.5);
        assert!(
            p.predict(
                &ParameterRecord::new("ring", f64::NAN, 0.02, 0.04),
                &p.default_calibration()
            )
            .is_err()
        );
    }
}
