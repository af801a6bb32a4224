use qls_server::AppState;

use super::CommandResult;
use crate::ModelArgs;

pub fn run(
    host: &str,
    port: u16,
    model: &ModelArgs,
    train_from: Option<&str>,
    scoring_only: bool,
) -> CommandResult {
    let config = super::resolve_config(model)?;
    let scorer = config.scorer()?;
    let predictor = if scoring_only {
        None
    } else {
        Some(super::load_predictor(&config, train_from)?)
    };

    let base = format!("http://{host}:{port}");
    let scale = scorer.scale();

    println!("🔬 QLS Server v{}", qls_core::VERSION);
    println!("   {base}");
    match &predictor {
        Some(p) => println!(
            "   model {} ({} topologies, stored width {:.4})",
            config.model_path.display(),
            p.metadata().topologies_seen.len(),
            p.metadata().conformal_width_90
        ),
        None => println!("   scoring-only mode (no model loaded)"),
    }
    println!(
        "   score range [{}, {}], half-width {}",
        scale.min(),
        scale.max(),
        scorer.half_width()
    );
    println!(
        "   uploads up to {} bytes ({} inflated), {} sessions max",
        config.max_upload_bytes, config.max_inflated_bytes, config.max_sessions
    );
    println!();
    println!("   Endpoints:");
    println!("     GET    /                                 API index (try: curl {base})");
    println!("     POST   /compute-qls                      Score a .npz/.npy upload");
    println!("     POST   /api/v1/predict                   Predict from parameters");
    println!("     GET    /api/v1/metadata                  Bounds, width, topologies");
    println!("     POST   /api/v1/sessions                  New calibration session");
    println!("     GET    /api/v1/sessions/{{id}}             Inspect a session");
    println!("     DELETE /api/v1/sessions/{{id}}             Drop a session");
    println!("     POST   /api/v1/sessions/{{id}}/recalibrate Recalibrate from a CSV body");
    println!("     POST   /api/v1/sessions/{{id}}/reset       Restore the stored width");
    println!("     GET    /health                           Health check");
    println!();
    println!("   Examples:");
    println!("     curl -F file=@rho.npz '{base}/compute-qls?debug=true'");
    println!(
        "     curl -H 'content-type: application/json' \\\n          -d '{{\"topology\":\"ring\",\"J\":0.2,\"gamma\":0.02,\"sigma\":0.04}}' {base}/api/v1/predict"
    );
    println!();

    let state = AppState::new(scorer, predictor, &config);
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(qls_server::run_server(state, host, port))?;
    Ok(())
}
