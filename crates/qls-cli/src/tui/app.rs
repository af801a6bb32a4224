//! TUI application state and event loop.
//!
//! Design: one parameter form on the left (topology plus three bounded
//! sliders), the latest prediction and a history chart on the right. Every
//! change re-runs inference; the session calibration is local to this
//! dashboard and starts at the stored width.

use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;

use qls_core::{
    Dataset, ParameterRecord, Prediction, Predictor, Range, SessionCalibration,
};

const HISTORY_LEN: usize = 120;

// ---------------------------------------------------------------------------
// Form fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Field {
    #[default]
    Topology,
    J,
    Gamma,
    Sigma,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::Topology, Field::J, Field::Gamma, Field::Sigma];

    pub fn next(self) -> Self {
        match self {
            Self::Topology => Self::J,
            Self::J => Self::Gamma,
            Self::Gamma => Self::Sigma,
            Self::Sigma => Self::Topology,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Self::Topology => Self::Sigma,
            Self::J => Self::Topology,
            Self::Gamma => Self::J,
            Self::Sigma => Self::Gamma,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Topology => "Topology",
            Self::J => "J (coupling)",
            Self::Gamma => "gamma (dephasing)",
            Self::Sigma => "sigma (disorder)",
        }
    }
}

/// A bounded numeric input with a fixed step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slider {
    pub range: Range,
    pub step: f64,
    pub value: f64,
}

impl Slider {
    /// Starts at the midpoint of `range`.
    pub fn new(range: Range, step: f64) -> Self {
        Self {
            range,
            step,
            value: range.midpoint(),
        }
    }

    pub fn nudge(&mut self, steps: f64) {
        self.value = self.range.clamp(self.value + steps * self.step);
    }

    /// Position in [0, 1] for the gauge.
    pub fn ratio(&self) -> f64 {
        let span = self.range.max - self.range.min;
        if span <= 0.0 {
            return 0.0;
        }
        ((self.value - self.range.min) / span).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    /// Typing a reference CSV path for recalibration.
    CsvPath(String),
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct App {
    predictor: Predictor,
    calibration: SessionCalibration,
    topologies: Vec<String>,
    topology_idx: usize,
    j: Slider,
    gamma: Slider,
    sigma: Slider,
    focus: Field,
    mode: InputMode,
    last: Option<Prediction>,
    last_error: Option<String>,
    status: Option<String>,
    history: VecDeque<f64>,
    running: bool,
}

impl App {
    pub fn new(predictor: Predictor) -> Self {
        let meta = predictor.metadata();
        let bounds = meta.bounds;
        let topologies = meta.topologies_seen.clone();
        let calibration = predictor.default_calibration();
        let mut app = Self {
            calibration,
            topologies,
            topology_idx: 0,
            j: Slider::new(bounds.j, 0.005),
            gamma: Slider::new(bounds.gamma, 0.001),
            sigma: Slider::new(bounds.sigma, 0.002),
            focus: Field::default(),
            mode: InputMode::default(),
            last: None,
            last_error: None,
            status: None,
            history: VecDeque::with_capacity(HISTORY_LEN),
            running: true,
            predictor,
        };
        app.predict();
        app
    }

    pub fn run(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        // Install panic hook that restores terminal before printing the panic.
        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
            original_hook(info);
        }));

        // stderr logging would tear the alternate screen
        let log_level = log::max_level();
        log::set_max_level(log::LevelFilter::Off);

        let result = self.run_loop(&mut terminal);

        log::set_max_level(log_level);
        let _ = std::panic::take_hook();
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            crossterm::cursor::Show
        )?;

        if let Some(p) = &self.last {
            println!(
                "Last prediction: {:.4} in [{:.4}, {:.4}]",
                p.prediction, p.interval.lo, p.interval.hi
            );
        }

        result
    }

    fn run_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> io::Result<()> {
        while self.running {
            terminal.draw(|f| super::ui::draw(f, self))?;

            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code);
                    }
                }
            }
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyCode) {
        if let InputMode::CsvPath(buf) = &mut self.mode {
            match key {
                KeyCode::Esc => self.mode = InputMode::Normal,
                KeyCode::Enter => {
                    let path = buf.trim().to_string();
                    self.mode = InputMode::Normal;
                    if !path.is_empty() {
                        self.recalibrate_from(Path::new(&path));
                    }
                }
                KeyCode::Backspace => {
                    buf.pop();
                }
                KeyCode::Char(c) => buf.push(c),
                _ => {}
            }
            return;
        }

        match key {
            KeyCode::Char('q') | KeyCode::Esc => self.running = false,
            KeyCode::Up | KeyCode::Char('k') | KeyCode::BackTab => {
                self.focus = self.focus.prev()
            }
            KeyCode::Down | KeyCode::Char('j') | KeyCode::Tab => self.focus = self.focus.next(),
            KeyCode::Left | KeyCode::Char('h') => self.adjust(-1.0),
            KeyCode::Right | KeyCode::Char('l') => self.adjust(1.0),
            KeyCode::Char('H') => self.adjust(-10.0),
            KeyCode::Char('L') => self.adjust(10.0),
            KeyCode::Enter | KeyCode::Char('p') => self.predict(),
            KeyCode::Char('c') => self.mode = InputMode::CsvPath(String::new()),
            KeyCode::Char('x') => {
                self.calibration = self.predictor.default_calibration();
                self.status = Some(format!(
                    "Calibration reset to stored width {:.4}",
                    self.calibration.half_width
                ));
                self.predict();
            }
            _ => {}
        }
    }

    fn adjust(&mut self, steps: f64) {
        match self.focus {
            Field::Topology => {
                let n = self.topologies.len();
                if n > 0 {
                    self.topology_idx = if steps > 0.0 {
                        (self.topology_idx + 1) % n
                    } else {
                        (self.topology_idx + n - 1) % n
                    };
                }
            }
            Field::J => self.j.nudge(steps),
            Field::Gamma => self.gamma.nudge(steps),
            Field::Sigma => self.sigma.nudge(steps),
        }
        self.predict();
    }

    pub fn record(&self) -> ParameterRecord {
        ParameterRecord::new(
            self.topology().unwrap_or_default(),
            self.j.value,
            self.gamma.value,
            self.sigma.value,
        )
    }

    fn predict(&mut self) {
        match self.predictor.predict(&self.record(), &self.calibration) {
            Ok(p) => {
                if self.history.len() == HISTORY_LEN {
                    self.history.pop_front();
                }
                self.history.push_back(p.prediction);
                self.last = Some(p);
                self.last_error = None;
            }
            Err(e) => self.last_error = Some(e.to_string()),
        }
    }

    /// On failure the current calibration stays in effect.
    fn recalibrate_from(&mut self, path: &Path) {
        let result = Dataset::from_path(path).and_then(|ds| self.predictor.recalibrate(&ds));
        match result {
            Ok(r) => {
                self.calibration = r.into();
                self.status = Some(format!(
                    "Recalibrated from {}: ±{:.4} ({}, {} rows)",
                    path.display(),
                    r.half_width,
                    r.source,
                    r.n_rows
                ));
                self.predict();
            }
            Err(e) => {
                self.status = Some(format!(
                    "Recalibration failed, keeping ±{:.4}: {e}",
                    self.calibration.half_width
                ));
            }
        }
    }

    // -- accessors for the renderer --

    pub fn topology(&self) -> Option<&str> {
        self.topologies.get(self.topology_idx).map(String::as_str)
    }

    pub fn topologies(&self) -> &[String] {
        &self.topologies
    }

    pub fn slider(&self, field: Field) -> Option<&Slider> {
        match field {
            Field::Topology => None,
            Field::J => Some(&self.j),
            Field::Gamma => Some(&self.gamma),
            Field::Sigma => Some(&self.sigma),
        }
    }

    pub fn focus(&self) -> Field {
        self.focus
    }

    pub fn mode(&self) -> &InputMode {
        &self.mode
    }

    pub fn calibration(&self) -> &SessionCalibration {
        &self.calibration
    }

    pub fn last(&self) -> Option<&Prediction> {
        self.last.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn history(&self) -> Vec<f64> {
        self.history.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qls_core::{CalibrationMetadata, CalibrationSource, PointEstimate, QlsModel};
    use std::sync::Arc;

    /// Predicts `J`.
    struct EchoJ;

    impl QlsModel for EchoJ {
        fn predict(&self, record: &ParameterRecord) -> qls_core::Result<PointEstimate> {
            Ok(PointEstimate {
                value: record.j,
                warning: None,
            })
        }
    }

    fn app() -> App {
        App::new(Predictor::new(Arc::new(EchoJ), CalibrationMetadata::default()))
    }

    #[test]
    fn test_starts_at_midpoints_with_initial_prediction() {
        let app = app();
        assert_eq!(app.topology(), Some("line"));
        assert!((app.record().j - 0.225).abs() < 1e-12);
        assert!((app.record().gamma - 0.0275).abs() < 1e-12);
        assert!((app.record().sigma - 0.04).abs() < 1e-12);
        assert_eq!(app.history().len(), 1);
        assert_eq!(app.calibration().source, CalibrationSource::StoredDefault);
    }

    #[test]
    fn test_slider_steps_and_clamps() {
        let mut app = app();
        app.handle_key(KeyCode::Down); // J
        app.handle_key(KeyCode::Right);
        assert!((app.record().j - 0.23).abs() < 1e-12);
        for _ in 0..100 {
            app.handle_key(KeyCode::Char('L'));
        }
        assert_eq!(app.record().j, 0.4);
        let last = app.last().unwrap();
        assert!((last.interval.hi - 0.55).abs() < 1e-12);
    }

    #[test]
    fn test_topology_cycles() {
        let mut app = app();
        app.handle_key(KeyCode::Right);
        assert_eq!(app.topology(), Some("ring"));
        app.handle_key(KeyCode::Left);
        app.handle_key(KeyCode::Left);
        assert_eq!(app.topology(), Some("smallworld"));
    }

    #[test]
    fn test_focus_wraps() {
        let mut app = app();
        app.handle_key(KeyCode::Up);
        assert_eq!(app.focus(), Field::Sigma);
        app.handle_key(KeyCode::Tab);
        assert_eq!(app.focus(), Field::Topology);
    }

    #[test]
    fn test_recalibration_prompt_and_failure_keeps_width() {
        let mut app = app();
        app.handle_key(KeyCode::Char('c'));
        for c in "/nonexistent/ref.csv".chars() {
            app.handle_key(KeyCode::Char(c));
        }
        assert_eq!(
            app.mode(),
            &InputMode::CsvPath("/nonexistent/ref.csv".into())
        );
        app.handle_key(KeyCode::Enter);
        assert_eq!(app.mode(), &InputMode::Normal);
        assert_eq!(app.calibration().half_width, 0.15);
        assert!(app.status().unwrap().contains("keeping"));
    }

    #[test]
    fn test_recalibration_from_csv_updates_width() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.csv");
        std::fs::write(
            &path,
            "topology,J,gamma,sigma,QLS\nring,0.1,0.01,0.0,0.1\nline,0.2,0.02,0.01,0.2\n",
        )
        .unwrap();
        let mut app = app();
        app.recalibrate_from(&path);
        assert_eq!(app.calibration().half_width, 0.0);
        assert_eq!(app.calibration().source, CalibrationSource::Residual);
        assert_eq!(app.last().unwrap().half_width, 0.0);

        app.handle_key(KeyCode::Char('x'));
        assert_eq!(app.calibration().half_width, 0.15);
    }

    #[test]
    fn test_quit() {
        let mut app = app();
        app.handle_key(KeyCode::Char('q'));
        assert!(!app.running);
    }
}
