use std::path::Path;

use qls_core::Dataset;
use qls_core::model::{BoostingParams, TreeParams};
use qls_core::train::{self, TrainOptions};

use super::CommandResult;

pub struct TrainCommandConfig<'a> {
    pub csv: &'a str,
    pub out_dir: &'a str,
    pub rounds: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub holdout: f64,
    pub seed: u64,
}

pub fn run(cfg: TrainCommandConfig) -> CommandResult {
    let dataset = Dataset::from_path(Path::new(cfg.csv))?;
    println!(
        "Loaded {} rows from {} ({} dropped)",
        dataset.len(),
        cfg.csv,
        dataset.dropped
    );

    let options = TrainOptions {
        boosting: BoostingParams {
            n_estimators: cfg.rounds,
            learning_rate: cfg.learning_rate,
            tree: TreeParams {
                max_depth: cfg.max_depth,
                ..TreeParams::default()
            },
        },
        holdout_fraction: cfg.holdout,
        seed: cfg.seed,
    };
    let artifacts = train::train(&dataset, &options)?;
    let (model_path, metadata_path) = artifacts.save(Path::new(cfg.out_dir))?;

    let r = &artifacts.report;
    let b = &artifacts.metadata.bounds;
    println!();
    println!("  rows            {} ({} held out)", r.n_rows, r.n_holdout);
    println!("  train MAE       {:.4}", r.train_mae);
    println!("  holdout MAE     {:.4}", r.holdout_mae);
    println!("  width (90%)     {:.4}", r.conformal_width_90);
    println!(
        "  topologies      {}",
        artifacts.metadata.topologies_seen.join(", ")
    );
    println!("  J               [{}, {}]", b.j.min, b.j.max);
    println!("  gamma           [{}, {}]", b.gamma.min, b.gamma.max);
    println!("  sigma           [{}, {}]", b.sigma.min, b.sigma.max);
    println!();
    println!("Model    → {}", model_path.display());
    println!("Metadata → {}", metadata_path.display());
    Ok(())
}
