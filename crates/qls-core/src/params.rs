//! Physical parameter records and their validity bounds.

use serde::{Deserialize, Serialize};

use crate::error::{QlsError, Result};

/// Names of the numeric columns, in feature order.
pub const NUMERIC_FIELDS: [&str; 3] = ["J", "gamma", "sigma"];

/// One input to the trained pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub topology: String,
    /// Coupling strength.
    #[serde(rename = "J")]
    pub j: f64,
    /// Dephasing rate.
    pub gamma: f64,
    /// Static disorder.
    pub sigma: f64,
}

impl ParameterRecord {
    pub fn new(topology: impl Into<String>, j: f64, gamma: f64, sigma: f64) -> Self {
        Self {
            topology: topology.into(),
            j,
            gamma,
            sigma,
        }
    }

    /// Numeric fields in [`NUMERIC_FIELDS`] order.
    pub fn numeric(&self) -> [f64; 3] {
        [self.j, self.gamma, self.sigma]
    }

    /// Reject non-finite numeric inputs.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in NUMERIC_FIELDS.iter().zip(self.numeric()) {
            if !value.is_finite() {
                return Err(QlsError::inference(format!(
                    "parameter {name} must be finite, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Closed range `[min, max]` stored as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "[f64; 2]", from = "[f64; 2]")]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, x: f64) -> bool {
        self.min <= x && x <= self.max
    }

    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    pub fn clamp(&self, x: f64) -> f64 {
        x.clamp(self.min, self.max)
    }

    /// Smallest range containing every value, `None` when empty.
    pub fn spanning(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values.into_iter().fold(None, |acc, v| match acc {
            None => Some(Self::new(v, v)),
            Some(r) => Some(Self::new(r.min.min(v), r.max.max(v))),
        })
    }
}

impl From<Range> for [f64; 2] {
    fn from(r: Range) -> Self {
        [r.min, r.max]
    }
}

impl From<[f64; 2]> for Range {
    fn from([min, max]: [f64; 2]) -> Self {
        Self { min, max }
    }
}

/// Per-parameter validity bounds recorded at training time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    #[serde(rename = "J")]
    pub j: Range,
    pub gamma: Range,
    pub sigma: Range,
}

impl ParameterBounds {
    pub fn ranges(&self) -> [(&'static str, Range); 3] {
        [("J", self.j), ("gamma", self.gamma), ("sigma", self.sigma)]
    }

    /// Fields of `record` outside their bounds, with value and range.
    pub fn out_of_range(&self, record: &ParameterRecord) -> Vec<OutOfRange> {
        self.ranges()
            .into_iter()
            .zip(record.numeric())
            .filter(|((_, range), value)| !range.contains(*value))
            .map(|((field, range), value)| OutOfRange {
                field: field.to_string(),
                value,
                range,
            })
            .collect()
    }
}

impl Default for ParameterBounds {
    fn default() -> Self {
        Self {
            j: Range::new(0.05, 0.4),
            gamma: Range::new(0.005, 0.05),
            sigma: Range::new(0.0, 0.08),
        }
    }
}

/// A parameter outside the range the pipeline was trained on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutOfRange {
    pub field: String,
    pub value: f64,
    pub range: Range,
}

impl std::fmt::Display for OutOfRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}={} outside trained range [{}, {}]",
            self.field, self.value, self.range.min, self.range.max
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_uses_capital_j() {
        let rec = ParameterRecord::new("ring", 0.2, 0.02, 0.04);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["J"], 0.2);
        assert!(json.get("j").is_none());
        let back: ParameterRecord =
            serde_json::from_str(r#"{"topology":"line","J":0.1,"gamma":0.01,"sigma":0.0}"#)
                .unwrap();
        assert_eq!(back.topology, "line");
        assert_eq!(back.j, 0.1);
    }

    #[test]
    fn test_validate_rejects_nan() {
        let rec = ParameterRecord::new("ring", f64::NAN, 0.02, 0.04);
        let err = rec.validate().unwrap_err();
        assert!(err.to_string().contains("J"));
        assert!(ParameterRecord::new("ring", 0.2, 0.02, 0.04).validate().is_ok());
    }

    #[test]
    fn test_out_of_range_reports_fields() {
        let bounds = ParameterBounds::default();
        let rec = ParameterRecord::new("ring", 0.5, 0.02, -0.1);
        let out = bounds.out_of_range(&rec);
        let fields: Vec<&str> = out.iter().map(|o| o.field.as_str()).collect();
        assert_eq!(fields, vec!["J", "sigma"]);
        assert!(out[0].to_string().contains("J=0.5"));
    }

    #[test]
    fn test_bounds_json_shape() {
        let json = serde_json::to_value(ParameterBounds::default()).unwrap();
        assert_eq!(json["J"][0], 0.05);
        assert_eq!(json["gamma"][1], 0.05);
        assert_eq!(json["sigma"][1], 0.08);
    }

    #[test]
    fn test_range_spanning_and_midpoint() {
        let r = Range::spanning([0.3, 0.1, 0.2]).unwrap();
        assert_eq!(r, Range::new(0.1, 0.3));
        assert!((r.midpoint() - 0.2).abs() < 1e-12);
        assert!(Range::spanning(std::iter::empty()).is_none());
        assert_eq!(r.clamp(0.9), 0.3);
    }
}
