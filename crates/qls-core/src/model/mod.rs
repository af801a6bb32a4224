//! Regression models behind the QLS pipeline.
//!
//! The serving side only needs [`Regressor::predict_row`]; the boosted-tree
//! implementation can be swapped for any comparable regressor.

pub mod boosting;
pub mod tree;

pub use boosting::{BoostingParams, GradientBoostedTrees};
pub use tree::{Node, RegressionTree, TreeParams};

/// Dense-feature regressor.
pub trait Regressor: Send + Sync {
    /// Width of the feature row `predict_row` expects.
    fn n_features(&self) -> usize;

    fn predict_row(&self, features: &[f64]) -> f64;
}
