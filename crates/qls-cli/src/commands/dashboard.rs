use super::CommandResult;
use crate::ModelArgs;

pub fn run(model: &ModelArgs, train_from: Option<&str>) -> CommandResult {
    let config = super::resolve_config(model)?;
    let predictor = super::load_predictor(&config, train_from)?;
    let mut app = crate::tui::app::App::new(predictor);
    app.run()?;
    Ok(())
}
