//! Depth-limited least-squares regression trees.
//!
//! Trees are grown greedily on residual targets with an L2 penalty on leaf
//! weights: a leaf holding residuals `r` has weight `Σr / (n + λ)` and a split
//! is kept only when it raises the structure score
//! `G_L²/(n_L+λ) + G_R²/(n_R+λ) − G²/(n+λ)` above `min_split_gain`.

use serde::{Deserialize, Serialize};

use crate::error::{QlsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// L2 penalty on leaf weights.
    pub lambda: f64,
    pub min_split_gain: f64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 5,
            min_samples_leaf: 1,
            lambda: 1.0,
            min_split_gain: 1e-12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// Flat node array; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    /// Fit to `targets` over the rows of `features` selected by `rows`.
    pub fn fit(features: &[Vec<f64>], targets: &[f64], rows: &[usize], params: &TreeParams) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(features, targets, rows, 0, params);
        tree
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[*feature] < *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Number of leaves.
    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Structural check for trees loaded from disk: children point forward,
    /// features exist, every number is finite.
    pub fn validate(&self, n_features: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(QlsError::configuration("tree has no nodes"));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { value } if !value.is_finite() => {
                    return Err(QlsError::configuration(format!(
                        "tree node {i}: non-finite leaf value"
                    )));
                }
                Node::Leaf { .. } => {}
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(QlsError::configuration(format!(
                            "tree node {i}: feature {feature} out of range (have {n_features})"
                        )));
                    }
                    if !threshold.is_finite() {
                        return Err(QlsError::configuration(format!(
                            "tree node {i}: non-finite threshold"
                        )));
                    }
                    for child in [*left, *right] {
                        if child <= i || child >= self.nodes.len() {
                            return Err(QlsError::configuration(format!(
                                "tree node {i}: bad child index {child}"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn grow(
        &mut self,
        features: &[Vec<f64>],
        targets: &[f64],
        rows: &[usize],
        depth: usize,
        params: &TreeParams,
    ) -> usize {
        let sum: f64 = rows.iter().map(|&r| targets[r]).sum();
        let leaf_value = sum / (rows.len() as f64 + params.lambda);
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { value: leaf_value });

        if depth >= params.max_depth || rows.len() < 2 * params.min_samples_leaf.max(1) {
            return id;
        }
        let Some(split) = best_split(features, targets, rows, sum, params) else {
            return id;
        };

        // partition keeps relative row order
        let (l, r): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&row| features[row][split.feature] < split.threshold);
        if l.is_empty() || r.is_empty() {
            return id;
        }
        let left = self.grow(features, targets, &l, depth + 1, params);
        let right = self.grow(features, targets, &r, depth + 1, params);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }
}

fn best_split(
    features: &[Vec<f64>],
    targets: &[f64],
    rows: &[usize],
    total: f64,
    params: &TreeParams,
) -> Option<SplitCandidate> {
    let n = rows.len();
    let n_features = features.first().map(Vec::len).unwrap_or(0);
    let min_leaf = params.min_samples_leaf.max(1);
    let parent_score = total * total / (n as f64 + params.lambda);

    let mut best: Option<SplitCandidate> = None;
    let mut order = rows.to_vec();
    for feature in 0..n_features {
        order.copy_from_slice(rows);
        order.sort_by(|&a, &b| features[a][feature].total_cmp(&features[b][feature]));

        let mut left_sum = 0.0;
        for k in 0..n - 1 {
            left_sum += targets[order[k]];
            let here = features[order[k]][feature];
            let next = features[order[k + 1]][feature];
            let n_left = k + 1;
            let n_right = n - n_left;
            if here == next || n_left < min_leaf || n_right < min_leaf {
                continue;
            }
            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / (n_left as f64 + params.lambda)
                + right_sum * right_sum / (n_right as f64 + params.lambda)
                - parent_score;
            if gain > params.min_split_gain && best.as_ref().is_none_or(|b| gain > b.gain) {
                // midpoint can round down onto `here` for adjacent floats
                let mid = here + (next - here) / 2.0;
                best = Some(SplitCandidate {
                    feature,
                    threshold: if mid > here { mid } else { next },
                    gain,
                });
            }
        }
    }
    best
}
