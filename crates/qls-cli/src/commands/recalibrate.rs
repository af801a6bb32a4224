use std::path::Path;

use qls_core::Dataset;

use super::CommandResult;
use crate::ModelArgs;

pub fn run(csv: &str, model: &ModelArgs, json: bool) -> CommandResult {
    let config = super::resolve_config(model)?;
    let predictor = super::load_predictor(&config, None)?;
    let dataset = Dataset::from_path(Path::new(csv))?;
    let recal = predictor.recalibrate(&dataset)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "half_width": recal.half_width,
                "source": recal.source,
                "n_rows": recal.n_rows,
                "dropped_rows": dataset.dropped,
                "stored_half_width": predictor.metadata().conformal_width_90,
            }))?
        );
        return Ok(());
    }

    println!(
        "Stored half-width        {:.4}",
        predictor.metadata().conformal_width_90
    );
    println!("Recalibrated half-width  {:.4}", recal.half_width);
    println!(
        "Rows used                {} ({} dropped)",
        recal.n_rows, dataset.dropped
    );
    println!("Mode                     {}", recal.source);
    if recal.source.is_degraded() {
        println!();
        println!("No QLS column: width reflects prediction spread, not error.");
    }
    Ok(())
}
