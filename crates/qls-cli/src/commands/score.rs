use std::path::Path;

use qls_core::{QlsError, ScoreScale, Scorer, ServiceConfig, load_samples_limited};

use super::CommandResult;

pub struct ScoreCommandConfig<'a> {
    pub file: &'a str,
    pub config_path: Option<&'a str>,
    pub score_min: Option<f64>,
    pub score_max: Option<f64>,
    pub half_width: Option<f64>,
    pub debug: bool,
    pub json: bool,
}

pub fn run(cfg: ScoreCommandConfig) -> CommandResult {
    let config = ServiceConfig::load_or_default(cfg.config_path.map(Path::new))?;
    let scale = ScoreScale::new(
        cfg.score_min.unwrap_or(config.score_min),
        cfg.score_max.unwrap_or(config.score_max),
    )?;
    let scorer = Scorer::new(scale, cfg.half_width.unwrap_or(config.score_half_width))?;

    let path = Path::new(cfg.file);
    let bytes = std::fs::read(path).map_err(|e| QlsError::io(path, e))?;
    let samples = load_samples_limited(&bytes, config.max_inflated_bytes)?;
    let report = scorer.score(&samples, cfg.debug)?;

    if cfg.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("QLS        {:.4}", report.qls);
    println!("Interval   {}", super::fmt_interval(report.interval));
    let c = &report.components;
    if c.min_dimension == c.max_dimension {
        println!(
            "Samples    {} x {}x{}",
            c.num_samples, c.min_dimension, c.max_dimension
        );
    } else {
        println!(
            "Samples    {} (dimension {} to {})",
            c.num_samples, c.min_dimension, c.max_dimension
        );
    }
    println!(
        "Purity     min {:.4}  max {:.4}",
        report.components.min_purity, report.components.max_purity
    );
    if let Some(raw) = report.debug_raw {
        println!(
            "Raw        {raw:.6}  (range [{}, {}])",
            scale.min(),
            scale.max()
        );
    }
    Ok(())
}
