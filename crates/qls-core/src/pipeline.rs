//! Trained pipeline artifact: topology encoder + regressor.
//!
//! Persisted as a single JSON document (`model.json`). The artifact is loaded
//! once, validated, and then only read.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::encoding::{OneHotEncoder, UnknownCategoryWarning};
use crate::error::{QlsError, Result};
use crate::model::{GradientBoostedTrees, Regressor};
use crate::params::ParameterRecord;

/// Artifact format written by this version.
pub const FORMAT_VERSION: u32 = 1;

/// Inference output for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct PointEstimate {
    pub value: f64,
    pub warning: Option<UnknownCategoryWarning>,
}

/// The inference seam the predictor depends on.
pub trait QlsModel: Send + Sync {
    fn predict(&self, record: &ParameterRecord) -> Result<PointEstimate>;

    fn predict_batch(&self, records: &[ParameterRecord]) -> Result<Vec<f64>> {
        records
            .iter()
            .map(|r| self.predict(r).map(|p| p.value))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub format_version: u32,
    pub encoder: OneHotEncoder,
    pub model: GradientBoostedTrees,
}

impl Pipeline {
    pub fn new(encoder: OneHotEncoder, model: GradientBoostedTrees) -> Result<Self> {
        let pipeline = Self {
            format_version: FORMAT_VERSION,
            encoder,
            model,
        };
        pipeline.validate()?;
        Ok(pipeline)
    }

    pub fn topologies(&self) -> &[String] {
        self.encoder.categories()
    }

    pub fn validate(&self) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(QlsError::configuration(format!(
                "unsupported model format version {} (expected {FORMAT_VERSION})",
                self.format_version
            )));
        }
        self.encoder.validate()?;
        self.model.validate()?;
        if self.encoder.n_features() != self.model.n_features() {
            return Err(QlsError::configuration(format!(
                "encoder produces {} features but model expects {}",
                self.encoder.n_features(),
                self.model.n_features()
            )));
        }
        Ok(())
    }

    /// Parse and validate an artifact from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let pipeline: Self = serde_json::from_slice(bytes)
            .map_err(|e| QlsError::configuration(format!("malformed model artifact: {e}")))?;
        pipeline.validate()?;
        Ok(pipeline)
    }

    /// Load from disk. Returns the pipeline and the SHA-256 of the file.
    pub fn load(path: &Path) -> Result<(Self, String)> {
        let bytes = std::fs::read(path).map_err(|e| QlsError::io(path, e))?;
        let fingerprint = fingerprint(&bytes);
        let pipeline = Self::from_json(&bytes).map_err(|e| match e {
            QlsError::Configuration(msg) => {
                QlsError::configuration(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;
        log::info!(
            "loaded model {} ({} trees, {} topologies, sha256 {})",
            path.display(),
            pipeline.model.n_trees(),
            pipeline.topologies().len(),
            &fingerprint[..12]
        );
        Ok((pipeline, fingerprint))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec(self)
            .map_err(|e| QlsError::configuration(format!("cannot serialize model: {e}")))?;
        std::fs::write(path, json).map_err(|e| QlsError::io(path, e))
    }
}

impl QlsModel for Pipeline {
    fn predict(&self, record: &ParameterRecord) -> Result<PointEstimate> {
        record.validate()?;
        let row = self.encoder.encode(record);
        if row.features.len() != self.model.n_features() {
            return Err(QlsError::inference(format!(
                "encoded {} features, model expects {}",
                row.features.len(),
                self.model.n_features()
            )));
        }
        let value = self.model.predict_row(&row.features);
        if !value.is_finite() {
            return Err(QlsError::inference(format!(
                "model produced a non-finite prediction for {record:?}"
            )));
        }
        Ok(PointEstimate {
            value,
            warning: row.warning,
        })
    }
}

/// Lowercase hex SHA-256.
pub fn fingerprint(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
