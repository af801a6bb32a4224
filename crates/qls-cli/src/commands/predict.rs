use std::path::Path;

use qls_core::{Dataset, ParameterRecord, SessionCalibration};

use super::CommandResult;
use crate::ModelArgs;

pub fn run(
    record: ParameterRecord,
    reference: Option<&str>,
    model: &ModelArgs,
    json: bool,
) -> CommandResult {
    let config = super::resolve_config(model)?;
    let predictor = super::load_predictor(&config, None)?;

    // one-shot session: calibration lives only for this invocation
    let calibration = match reference {
        Some(csv) => {
            let dataset = Dataset::from_path(Path::new(csv))?;
            SessionCalibration::from(predictor.recalibrate(&dataset)?)
        }
        None => predictor.default_calibration(),
    };
    let out = predictor.predict(&record, &calibration)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!(
        "{} J={} gamma={} sigma={}",
        record.topology, record.j, record.gamma, record.sigma
    );
    println!("QLS        {:.4}", out.prediction);
    println!(
        "Interval   {}  (±{:.4}, {})",
        super::fmt_interval(out.interval),
        out.half_width,
        out.calibration.source
    );
    for w in &out.warnings {
        println!("warning:   {w}");
    }
    Ok(())
}
