pub mod dashboard;
pub mod predict;
pub mod recalibrate;
pub mod score;
pub mod server;
pub mod train;

use std::path::{Path, PathBuf};

use qls_core::train::TrainOptions;
use qls_core::{Predictor, ServiceConfig};

use crate::ModelArgs;

/// Result of one subcommand; printed to stderr by `main`.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Config file (if any) with `--model`/`--metadata` applied on top.
pub fn resolve_config(args: &ModelArgs) -> qls_core::Result<ServiceConfig> {
    let mut config = ServiceConfig::load_or_default(args.config.as_deref().map(Path::new))?;
    if let Some(model) = &args.model {
        config.model_path = PathBuf::from(model);
    }
    if let Some(metadata) = &args.metadata {
        config.metadata_path = PathBuf::from(metadata);
    }
    Ok(config)
}

/// Load the trained predictor, training first when `train_from` is given and
/// the artifacts are missing.
pub fn load_predictor(
    config: &ServiceConfig,
    train_from: Option<&str>,
) -> qls_core::Result<Predictor> {
    let trained = qls_core::ensure_trained(
        &config.model_path,
        &config.metadata_path,
        train_from.map(Path::new),
        &TrainOptions::default(),
    )?;
    if trained {
        println!(
            "Trained new model from {} → {}",
            train_from.unwrap_or("?"),
            config.model_path.display()
        );
    }
    Predictor::load(&config.model_path, &config.metadata_path)
}

/// `[lo, hi]` with three decimals.
pub fn fmt_interval(interval: qls_core::Interval) -> String {
    format!("[{:.3}, {:.3}]", interval.lo, interval.hi)
}
