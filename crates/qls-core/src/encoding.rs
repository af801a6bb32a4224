//! Categorical encoding of the topology column.
//!
//! Topologies are one-hot encoded against the category list seen during
//! training. A topology outside that list follows [`UnknownCategoryPolicy`]:
//! the only supported policy maps it to the all-zero vector, which every tree
//! split on a topology column treats as "not this category". Prediction still
//! succeeds and an [`UnknownCategoryWarning`] is attached.

use serde::{Deserialize, Serialize};

use crate::error::{QlsError, Result};
use crate::params::{NUMERIC_FIELDS, ParameterRecord};

/// How an unseen category is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownCategoryPolicy {
    /// Encode as all zeros (neutral w.r.t. every known category).
    #[default]
    ZeroVector,
}

/// Non-fatal notice that a category was not seen during training.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownCategoryWarning {
    pub column: String,
    pub value: String,
    pub known: Vec<String>,
}

impl std::fmt::Display for UnknownCategoryWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown {} '{}' (known: {}); encoded as neutral",
            self.column,
            self.value,
            self.known.join(", ")
        )
    }
}

/// One-hot encoder for a single categorical column plus passthrough numerics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    pub column: String,
    categories: Vec<String>,
    #[serde(default)]
    pub unknown: UnknownCategoryPolicy,
}

/// Encoded feature row plus an optional unknown-category notice.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedRow {
    pub features: Vec<f64>,
    pub warning: Option<UnknownCategoryWarning>,
}

impl OneHotEncoder {
    /// Fit on observed values: distinct categories, sorted.
    pub fn fit<'a>(column: &str, values: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut categories: Vec<String> = values.into_iter().map(str::to_string).collect();
        categories.sort();
        categories.dedup();
        if categories.is_empty() {
            return Err(QlsError::data_format(format!(
                "cannot fit encoder: column '{column}' has no values"
            )));
        }
        Ok(Self {
            column: column.to_string(),
            categories,
            unknown: UnknownCategoryPolicy::ZeroVector,
        })
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Total encoded width: one column per category plus the numerics.
    pub fn n_features(&self) -> usize {
        self.categories.len() + NUMERIC_FIELDS.len()
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.categories
            .iter()
            .map(|c| format!("{}={c}", self.column))
            .chain(NUMERIC_FIELDS.iter().map(|s| s.to_string()))
            .collect()
    }

    pub fn encode(&self, record: &ParameterRecord) -> EncodedRow {
        let mut features = vec![0.0; self.n_features()];
        let warning = match self.categories.binary_search(&record.topology) {
            Ok(idx) => {
                features[idx] = 1.0;
                None
            }
            Err(_) => match self.unknown {
                UnknownCategoryPolicy::ZeroVector => Some(UnknownCategoryWarning {
                    column: self.column.clone(),
                    value: record.topology.clone(),
                    known: self.categories.clone(),
                }),
            },
        };
        let offset = self.categories.len();
        features[offset..].copy_from_slice(&record.numeric());
        EncodedRow { features, warning }
    }

    /// Check invariants after deserialization.
    pub fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            return Err(QlsError::configuration("encoder has no categories"));
        }
        if self.categories.windows(2).any(|w| w[0] >= w[1]) {
            return Err(QlsError::configuration(
                "encoder categories must be sorted and distinct",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder() -> OneHotEncoder {
        OneHotEncoder::fit("topology", ["ring", "line", "smallworld", "ring"]).unwrap()
    }

    #[test]
    fn test_fit_sorts_and_dedups() {
        assert_eq!(encoder().categories(), &["line", "ring", "smallworld"]);
        assert_eq!(encoder().n_features(), 6);
    }

    #[test]
    fn test_known_category_one_hot() {
        let row = encoder().encode(&ParameterRecord::new("ring", 0.2, 0.02, 0.04));
        assert_eq!(row.features, vec![0.0, 1.0, 0.0, 0.2, 0.02, 0.04]);
        assert!(row.warning.is_none());
    }

    #[test]
    fn test_unknown_category_is_zero_vector_with_warning() {
        let row = encoder().encode(&ParameterRecord::new("lattice3d", 0.2, 0.02, 0.04));
        assert_eq!(&row.features[..3], &[0.0, 0.0, 0.0]);
        assert_eq!(&row.features[3..], &[0.2, 0.02, 0.04]);
        let w = row.warning.unwrap();
        assert_eq!(w.value, "lattice3d");
        assert!(w.to_string().contains("neutral"));
    }

    #[test]
    fn test_feature_names() {
        assert_eq!(
            encoder().feature_names(),
            vec![
                "topology=line",
                "topology=ring",
                "topology=smallworld",
                "J",
                "gamma",
                "sigma"
            ]
        );
    }

    #[test]
    fn test_fit_empty_rejected() {
        assert!(OneHotEncoder::fit("topology", std::iter::empty()).is_err());
    }

    #[test]
    fn test_unsorted_categories_fail_validation() {
        let json = r#"{"column":"topology","categories":["ring","line"]}"#;
        let enc: OneHotEncoder = serde_json::from_str(json).unwrap();
        assert_eq!(enc.unknown, UnknownCategoryPolicy::ZeroVector);
        assert!(enc.validate().is_err());
    }
}
