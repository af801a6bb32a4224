//! Offline training: labeled CSV in, `model.json` + `metadata.json` out.
//!
//! 1. Fit the topology encoder on every row.
//! 2. Fit on a seeded 80% split and take the 90th percentile of absolute
//!    residuals on the held-out 20% as `conformal_width_90`.
//! 3. Refit on all rows for the shipped model.

use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::calibration::{COVERAGE, absolute_residuals, quantile};
use crate::dataset::{Dataset, TOPOLOGY_COLUMN};
use crate::encoding::OneHotEncoder;
use crate::error::{QlsError, Result};
use crate::metadata::CalibrationMetadata;
use crate::model::{BoostingParams, GradientBoostedTrees, Regressor};
use crate::params::{ParameterBounds, Range};
use crate::pipeline::Pipeline;

pub const MODEL_FILE: &str = "model.json";
pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainOptions {
    pub boosting: BoostingParams,
    pub holdout_fraction: f64,
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            boosting: BoostingParams::default(),
            holdout_fraction: 0.2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainReport {
    pub n_rows: usize,
    pub n_holdout: usize,
    pub holdout_mae: f64,
    pub conformal_width_90: f64,
    pub train_mae: f64,
}

#[derive(Debug, Clone)]
pub struct TrainedArtifacts {
    pub pipeline: Pipeline,
    pub metadata: CalibrationMetadata,
    pub report: TrainReport,
}

impl TrainedArtifacts {
    /// Write `model.json` and `metadata.json` into `dir`, creating it.
    pub fn save(&self, dir: &Path) -> Result<(PathBuf, PathBuf)> {
        std::fs::create_dir_all(dir).map_err(|e| QlsError::io(dir, e))?;
        let model_path = dir.join(MODEL_FILE);
        let metadata_path = dir.join(METADATA_FILE);
        self.save_to(&model_path, &metadata_path)?;
        Ok((model_path, metadata_path))
    }

    pub fn save_to(&self, model_path: &Path, metadata_path: &Path) -> Result<()> {
        for p in [model_path, metadata_path] {
            if let Some(parent) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| QlsError::io(parent, e))?;
            }
        }
        self.pipeline.save(model_path)?;
        self.metadata.save(metadata_path)?;
        log::info!(
            "wrote {} and {}",
            model_path.display(),
            metadata_path.display()
        );
        Ok(())
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn bounds_of(dataset: &Dataset) -> Result<ParameterBounds> {
    let mut columns: [Vec<f64>; 3] = Default::default();
    for record in dataset.records() {
        for (col, value) in columns.iter_mut().zip(record.numeric()) {
            col.push(value);
        }
    }
    let [j, gamma, sigma] = columns.map(|values| {
        Range::spanning(values)
            .ok_or_else(|| QlsError::data_format("cannot compute bounds of an empty dataset"))
    });
    Ok(ParameterBounds {
        j: j?,
        gamma: gamma?,
        sigma: sigma?,
    })
}

/// Train a pipeline and derive its calibration metadata.
pub fn train(dataset: &Dataset, options: &TrainOptions) -> Result<TrainedArtifacts> {
    let targets = dataset.require_targets()?;
    let n = targets.len();
    if n < 2 {
        return Err(QlsError::data_format(format!(
            "training needs at least 2 labeled rows, got {n}"
        )));
    }
    if !(0.0..1.0).contains(&options.holdout_fraction) || options.holdout_fraction == 0.0 {
        return Err(QlsError::configuration(format!(
            "holdout fraction must be in (0, 1), got {}",
            options.holdout_fraction
        )));
    }

    let encoder = OneHotEncoder::fit(
        TOPOLOGY_COLUMN,
        dataset.records().map(|r| r.topology.as_str()),
    )?;
    let features: Vec<Vec<f64>> = dataset
        .records()
        .map(|r| encoder.encode(r).features)
        .collect();

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(options.seed);
    order.shuffle(&mut rng);
    let n_holdout = ((n as f64 * options.holdout_fraction).round() as usize).clamp(1, n - 1);
    let (holdout, fit_rows) = order.split_at(n_holdout);
    log::info!(
        "training on {} row(s), holding out {n_holdout} for calibration (seed {})",
        fit_rows.len(),
        options.seed
    );

    let pick = |rows: &[usize]| -> (Vec<Vec<f64>>, Vec<f64>) {
        rows.iter()
            .map(|&i| (features[i].clone(), targets[i]))
            .unzip()
    };
    let (fit_x, fit_y) = pick(fit_rows);
    let (hold_x, hold_y) = pick(holdout);
    let split_model = GradientBoostedTrees::fit(&fit_x, &fit_y, &options.boosting)?;
    let hold_pred: Vec<f64> = hold_x.iter().map(|x| split_model.predict_row(x)).collect();
    let hold_res = absolute_residuals(&hold_y, &hold_pred);
    let conformal_width_90 = quantile(&hold_res, COVERAGE);

    let model = GradientBoostedTrees::fit(&features, &targets, &options.boosting)?;
    let train_pred: Vec<f64> = features.iter().map(|x| model.predict_row(x)).collect();
    let train_mae = mean(&absolute_residuals(&targets, &train_pred));

    let metadata = CalibrationMetadata {
        bounds: bounds_of(dataset)?,
        conformal_width_90,
        topologies_seen: encoder.categories().to_vec(),
    };
    metadata.validate()?;
    let pipeline = Pipeline::new(encoder, model)?;

    let report = TrainReport {
        n_rows: n,
        n_holdout,
        holdout_mae: mean(&hold_res),
        conformal_width_90,
        train_mae,
    };
    log::info!(
        "trained {} trees; holdout MAE {:.4}, width90 {:.4}",
        pipeline.model.n_trees(),
        report.holdout_mae,
        report.conformal_width_90
    );
    Ok(TrainedArtifacts {
        pipeline,
        metadata,
        report,
    })
}

/// Train from `csv` when either artifact file is missing.
///
/// Returns `true` when training ran. Without a CSV nothing happens and the
/// subsequent load reports the missing file.
pub fn ensure_trained(
    model_path: &Path,
    metadata_path: &Path,
    csv: Option<&Path>,
    options: &TrainOptions,
) -> Result<bool> {
    if model_path.exists() && metadata_path.exists() {
        return Ok(false);
    }
    let Some(csv) = csv else {
        return Ok(false);
    };
    log::info!(
        "model artifacts missing; training from {}",
        csv.display()
    );
    let dataset = Dataset::from_path(csv)?;
    let artifacts = train(&dataset, options)?;
    artifacts.save_to(model_path, metadata_path)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::QlsModel;

    fn synthetic_csv(n: usize) -> String {
        let topologies = ["line", "ring", "smallworld"];
        let mut out = String::from("topology,J,gamma,sigma,QLS\n");
        for i in 0..n {
            let topo = topologies[i % 3];
            let j = 0.05 + 0.35 * ((i * 7) % n) as f64 / n as f64;
            let gamma = 0.005 + 0.045 * ((i * 11) % n) as f64 / n as f64;
            let sigma = 0.08 * ((i * 13) % n) as f64 / n as f64;
            let bonus = match topo {
                "line" => 0.0,
                "ring" => 0.1,
                _ => 0.2,
            };
            let qls = 0.2 + j - 2.0 * gamma - sigma + bonus;
            out.push_str(&format!("{topo},{j},{gamma},{sigma},{qls}\n"));
        }
        out
    }

    fn fast_options() -> TrainOptions {
        TrainOptions {
            boosting: BoostingParams {
                n_estimators: 60,
                ..BoostingParams::default()
            },
            ..TrainOptions::default()
        }
    }

    #[test]
    fn test_train_produces_metadata() {
        let ds = Dataset::from_reader(synthetic_csv(60).as_bytes()).unwrap();
        let art = train(&ds, &fast_options()).unwrap();
        assert_eq!(art.report.n_rows, 60);
        assert_eq!(art.report.n_holdout, 12);
        assert_eq!(
            art.metadata.topologies_seen,
            vec!["line", "ring", "smallworld"]
        );
        assert!(art.metadata.conformal_width_90 >= 0.0);
        assert!(art.metadata.bounds.j.min >= 0.05);
        assert!(art.metadata.bounds.j.max <= 0.4);
        assert!(art.report.train_mae < 0.08, "{}", art.report.train_mae);
    }

    #[test]
    fn test_training_is_deterministic() {
        let ds = Dataset::from_reader(synthetic_csv(30).as_bytes()).unwrap();
        let a = train(&ds, &fast_options()).unwrap();
        let b = train(&ds, &fast_options()).unwrap();
        assert_eq!(a.pipeline, b.pipeline);
        assert_eq!(a.metadata, b.metadata);
    }

    #[test]
    fn test_trained_pipeline_predicts() {
        let ds = Dataset::from_reader(synthetic_csv(45).as_bytes()).unwrap();
        let art = train(&ds, &fast_options()).unwrap();
        let est = art
            .pipeline
            .predict(&crate::params::ParameterRecord::new("ring", 0.2, 0.02, 0.04))
            .unwrap();
        assert!(est.value.is_finite());
    }

    #[test]
    fn test_unlabeled_data_rejected() {
        let ds = Dataset::from_reader("topology,J,gamma,sigma\nring,0.1,0.01,0\n".as_bytes())
            .unwrap();
        assert!(train(&ds, &TrainOptions::default()).is_err());
    }

    #[test]
    fn test_single_row_rejected() {
        let ds = Dataset::from_reader("topology,J,gamma,sigma,QLS\nring,0.1,0.01,0,0.5\n".as_bytes())
            .unwrap();
        assert!(train(&ds, &TrainOptions::default()).is_err());
    }

    #[test]
    fn test_bad_holdout_fraction() {
        let ds = Dataset::from_reader(synthetic_csv(10).as_bytes()).unwrap();
        let opts = TrainOptions {
            holdout_fraction: 1.0,
            ..fast_options()
        };
        assert!(train(&ds, &opts).is_err());
    }
}
