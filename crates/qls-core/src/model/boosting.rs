//! Gradient-boosted regression trees under squared loss.

use serde::{Deserialize, Serialize};

use super::Regressor;
use super::tree::{RegressionTree, TreeParams};
use crate::error::{QlsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub tree: TreeParams,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            learning_rate: 0.06,
            tree: TreeParams::default(),
        }
    }
}

/// `base_score + learning_rate * Σ tree(x)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    n_features: usize,
    base_score: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedTrees {
    /// Fit on a dense feature matrix. Rows must all have the same width.
    pub fn fit(features: &[Vec<f64>], targets: &[f64], params: &BoostingParams) -> Result<Self> {
        if features.is_empty() {
            return Err(QlsError::data_format("cannot fit on an empty dataset"));
        }
        if features.len() != targets.len() {
            return Err(QlsError::data_format(format!(
                "{} feature rows but {} targets",
                features.len(),
                targets.len()
            )));
        }
        let n_features = features[0].len();
        if features.iter().any(|r| r.len() != n_features) {
            return Err(QlsError::data_format("feature rows have different widths"));
        }
        if !(params.learning_rate > 0.0 && params.learning_rate.is_finite()) {
            return Err(QlsError::configuration(format!(
                "learning rate must be positive, got {}",
                params.learning_rate
            )));
        }

        let n = targets.len();
        let base_score = targets.iter().sum::<f64>() / n as f64;
        let mut current = vec![base_score; n];
        let mut residuals = vec![0.0; n];
        let rows: Vec<usize> = (0..n).collect();
        let mut trees = Vec::with_capacity(params.n_estimators);

        for round in 0..params.n_estimators {
            for i in 0..n {
                residuals[i] = targets[i] - current[i];
            }
            let tree = RegressionTree::fit(features, &residuals, &rows, &params.tree);
            for (i, row) in features.iter().enumerate() {
                current[i] += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
            if round % 50 == 49 {
                let mse = targets
                    .iter()
                    .zip(&current)
                    .map(|(y, p)| (y - p) * (y - p))
                    .sum::<f64>()
                    / n as f64;
                log::debug!("boosting round {}: train mse {mse:.6}", round + 1);
            }
        }

        Ok(Self {
            n_features,
            base_score,
            learning_rate: params.learning_rate,
            trees,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    pub fn validate(&self) -> Result<()> {
        if !self.base_score.is_finite() || !self.learning_rate.is_finite() {
            return Err(QlsError::configuration(
                "model base score and learning rate must be finite",
            ));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|e| QlsError::configuration(format!("tree {i}: {e}")))?;
        }
        Ok(())
    }
}

impl Regressor for GradientBoostedTrees {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_row(&self, features: &[f64]) -> f64 {
        self.base_score
            + self.learning_rate * self.trees.iter().map(|t| t.predict(features)).sum::<f64>()
    }
}
