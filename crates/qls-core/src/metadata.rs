//! Calibration metadata persisted next to the model artifact.
//!
//! `metadata.json` keys: `bounds` (`J`, `gamma`, `sigma` ranges),
//! `conformal_width_90`, `topologies_seen`. A missing key falls back to its
//! documented default with a warning; an unreadable or malformed file is a
//! configuration error.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{QlsError, Result};
use crate::params::ParameterBounds;

/// Default interval half-width when the metadata does not carry one.
pub const DEFAULT_CONFORMAL_WIDTH: f64 = 0.15;
/// Default topology list when the metadata does not carry one.
pub const DEFAULT_TOPOLOGIES: [&str; 3] = ["line", "ring", "smallworld"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationMetadata {
    pub bounds: ParameterBounds,
    pub conformal_width_90: f64,
    pub topologies_seen: Vec<String>,
}

#[derive(Deserialize)]
struct RawMetadata {
    bounds: Option<ParameterBounds>,
    conformal_width_90: Option<f64>,
    topologies_seen: Option<Vec<String>>,
}

impl Default for CalibrationMetadata {
    fn default() -> Self {
        Self {
            bounds: ParameterBounds::default(),
            conformal_width_90: DEFAULT_CONFORMAL_WIDTH,
            topologies_seen: DEFAULT_TOPOLOGIES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl CalibrationMetadata {
    /// Parse from JSON text, filling missing keys from defaults.
    ///
    /// Returns the metadata and the list of keys that were defaulted.
    pub fn from_json(text: &str) -> Result<(Self, Vec<&'static str>)> {
        let raw: RawMetadata = serde_json::from_str(text)
            .map_err(|e| QlsError::configuration(format!("malformed metadata: {e}")))?;
        let defaults = Self::default();
        let mut defaulted = Vec::new();

        let bounds = raw.bounds.unwrap_or_else(|| {
            defaulted.push("bounds");
            defaults.bounds
        });
        let conformal_width_90 = raw.conformal_width_90.unwrap_or_else(|| {
            defaulted.push("conformal_width_90");
            defaults.conformal_width_90
        });
        let topologies_seen = raw.topologies_seen.unwrap_or_else(|| {
            defaulted.push("topologies_seen");
            defaults.topologies_seen.clone()
        });

        let meta = Self {
            bounds,
            conformal_width_90,
            topologies_seen,
        };
        meta.validate()?;
        Ok((meta, defaulted))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| QlsError::io(path, e))?;
        let (meta, defaulted) = Self::from_json(&text).map_err(|e| match e {
            QlsError::Configuration(msg) => {
                QlsError::configuration(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;
        for key in defaulted {
            log::warn!(
                "{}: missing '{key}', using documented default",
                path.display()
            );
        }
        log::info!(
            "loaded metadata {} (width {:.4}, topologies {})",
            path.display(),
            meta.conformal_width_90,
            meta.topologies_seen.join(",")
        );
        Ok(meta)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| QlsError::configuration(format!("cannot serialize metadata: {e}")))?;
        std::fs::write(path, json).map_err(|e| QlsError::io(path, e))
    }

    pub fn validate(&self) -> Result<()> {
        if !self.conformal_width_90.is_finite() || self.conformal_width_90 < 0.0 {
            return Err(QlsError::configuration(format!(
                "conformal_width_90 must be finite and non-negative, got {}",
                self.conformal_width_90
            )));
        }
        for (name, range) in self.bounds.ranges() {
            if !range.min.is_finite() || !range.max.is_finite() || range.min > range.max {
                return Err(QlsError::configuration(format!(
                    "bounds.{name} is invalid: [{}, {}]",
                    range.min, range.max
                )));
            }
        }
        if self.topologies_seen.is_empty() {
            return Err(QlsError::configuration("topologies_seen is empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Range;

    #[test]
    fn test_full_metadata_parses() {
        let text = r#"{
            "bounds": {"J": [0.1, 0.3], "gamma": [0.01, 0.02], "sigma": [0.0, 0.05]},
            "conformal_width_90": 0.08,
            "topologies_seen": ["line", "ring"]
        }"#;
        let (meta, defaulted) = CalibrationMetadata::from_json(text).unwrap();
        assert!(defaulted.is_empty());
        assert_eq!(meta.bounds.j, Range::new(0.1, 0.3));
        assert_eq!(meta.conformal_width_90, 0.08);
        assert_eq!(meta.topologies_seen, vec!["line", "ring"]);
    }

    #[test]
    fn test_missing_keys_fall_back_to_defaults() {
        let (meta, defaulted) = CalibrationMetadata::from_json("{}").unwrap();
        assert_eq!(
            defaulted,
            vec!["bounds", "conformal_width_90", "topologies_seen"]
        );
        assert_eq!(meta, CalibrationMetadata::default());
        assert_eq!(meta.bounds.j, Range::new(0.05, 0.4));
        assert_eq!(meta.conformal_width_90, 0.15);
    }

    #[test]
    fn test_malformed_json_is_configuration_error() {
        let err = CalibrationMetadata::from_json("{ not json").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        let err = CalibrationMetadata::from_json(r#"{"conformal_width_90": "wide"}"#).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_negative_width_rejected() {
        let err = CalibrationMetadata::from_json(r#"{"conformal_width_90": -0.1}"#).unwrap_err();
        assert!(err.to_string().contains("conformal_width_90"));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let text = r#"{"bounds": {"J": [0.4, 0.1], "gamma": [0.0, 0.1], "sigma": [0.0, 0.1]}}"#;
        assert!(CalibrationMetadata::from_json(text).is_err());
    }

    #[test]
    fn test_serialized_keys() {
        let json = serde_json::to_value(CalibrationMetadata::default()).unwrap();
        assert!(json["bounds"]["J"].is_array());
        assert!(json["conformal_width_90"].is_number());
        assert!(json["topologies_seen"].is_array());
    }
}
