//! TUI rendering.
//!
//! ┌──────────────────────────────────────────────┐
//! │  🔬 QLS Dashboard   ±0.150 stored_default    │
//! ├─────────────────────┬────────────────────────┤
//! │  Parameters         │  QLS 0.612             │
//! │  ▸ Topology  ring   │  [0.462, 0.762]        │
//! │    J        0.225   │                        │
//! │    gamma    0.028   ├────────────────────────┤
//! │    sigma    0.040   │  ╭ history             │
//! │                     │  ╰──────────────────── │
//! ├─────────────────────┴────────────────────────┤
//! │  status / CSV prompt                         │
//! ├──────────────────────────────────────────────┤
//! │  ↑↓ field   ←→ adjust   c: recalibrate  q    │
//! └──────────────────────────────────────────────┘

use super::app::{App, Field, InputMode};
use ratatui::{prelude::*, widgets::*};

/// Shown when no topology is known.
const NO_TOPOLOGY: &str = "-";

pub fn draw(f: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // title
            Constraint::Min(10),   // main
            Constraint::Length(3), // status / prompt
            Constraint::Length(1), // keys
        ])
        .split(f.area());

    draw_title(f, rows[0], app);
    draw_main(f, rows[1], app);
    draw_status(f, rows[2], app);
    draw_keys(f, rows[3], app);
}

fn draw_title(f: &mut Frame, area: Rect, app: &App) {
    let cal = app.calibration();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Line::from(vec![
            Span::styled(" 🔬 QLS Dashboard ", Style::default().bold().fg(Color::Cyan)),
            Span::raw("  interval: "),
            Span::styled(
                format!("±{:.3}", cal.half_width),
                Style::default().bold().fg(Color::Yellow),
            ),
            Span::styled(
                format!("  {} ", cal.source),
                Style::default().fg(Color::DarkGray),
            ),
        ]));
    f.render_widget(block, area);
}

fn draw_main(f: &mut Frame, area: Rect, app: &App) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);

    draw_form(f, cols[0], app);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(8), Constraint::Min(6)])
        .split(cols[1]);

    draw_result(f, right[0], app);
    draw_chart(f, right[1], app);
}

fn draw_form(f: &mut Frame, area: Rect, app: &App) {
    let rows: Vec<Row> = Field::ALL
        .iter()
        .map(|&field| {
            let is_focus = field == app.focus();
            let pointer = if is_focus { "▸" } else { " " };
            let (value, range, bar) = match app.slider(field) {
                Some(s) => (
                    format!("{:.3}", s.value),
                    format!("[{}, {}]", s.range.min, s.range.max),
                    gauge_text(s.ratio(), 12),
                ),
                None => (
                    app.topology().unwrap_or(NO_TOPOLOGY).to_string(),
                    format!("{} known", app.topologies().len()),
                    String::new(),
                ),
            };
            let style = if is_focus {
                Style::default().bg(Color::DarkGray).fg(Color::White)
            } else {
                Style::default()
            };
            Row::new(vec![
                pointer.to_string(),
                field.label().to_string(),
                value,
                bar,
                range,
            ])
            .style(style)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(2),  // pointer
            Constraint::Length(18), // label
            Constraint::Length(11), // value
            Constraint::Length(13), // bar
            Constraint::Min(10),    // range
        ],
    )
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Parameters (←→ to adjust) "),
    );
    f.render_widget(table, area);
}

fn gauge_text(ratio: f64, width: usize) -> String {
    let filled = ((ratio * width as f64).round() as usize).min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

fn draw_result(f: &mut Frame, area: Rect, app: &App) {
    let mut lines = Vec::new();
    match app.last() {
        Some(p) => {
            lines.push(Line::from(vec![
                Span::styled("QLS  ", Style::default().bold()),
                Span::styled(
                    format!("{:.4}", p.prediction),
                    Style::default().bold().fg(Color::Green),
                ),
            ]));
            lines.push(Line::from(format!(
                "90% interval  [{:.4}, {:.4}]",
                p.interval.lo, p.interval.hi
            )));
            for w in &p.warnings {
                lines.push(Line::from(Span::styled(
                    format!("⚠ {w}"),
                    Style::default().fg(Color::Yellow),
                )));
            }
        }
        None => lines.push(Line::from("No prediction yet")),
    }
    if let Some(err) = app.last_error() {
        lines.push(Line::from(Span::styled(
            err.to_string(),
            Style::default().fg(Color::Red),
        )));
    }

    let block = Block::default().borders(Borders::ALL).title(" Prediction ");
    let p = Paragraph::new(lines).wrap(Wrap { trim: true }).block(block);
    f.render_widget(p, area);
}

fn draw_chart(f: &mut Frame, area: Rect, app: &App) {
    let history = app.history();
    if history.is_empty() {
        let block = Block::default().borders(Borders::ALL).title(" History ");
        let p = Paragraph::new("Adjust a parameter to predict")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(p, area);
        return;
    }

    let data: Vec<(f64, f64)> = history
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64, v))
        .collect();

    let latest = history.last().copied().unwrap_or(0.0);
    let min_val = history.iter().copied().fold(f64::MAX, f64::min);
    let max_val = history.iter().copied().fold(f64::MIN, f64::max);

    let datasets = vec![
        Dataset::default()
            .name(format!("{latest:.3}"))
            .marker(symbols::Marker::Braille)
            .style(Style::default().fg(Color::Cyan))
            .data(&data),
    ];

    let x_max = (history.len() as f64).max(10.0);
    let pad = ((max_val - min_val) * 0.1).max(0.05);
    let y_min = min_val - pad;
    let y_max = max_val + pad;

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" History  QLS={latest:.3} ")),
        )
        .x_axis(Axis::default().bounds([0.0, x_max]).labels(vec![
            Line::from("0"),
            Line::from(format!("{}", history.len())),
        ]))
        .y_axis(Axis::default().bounds([y_min, y_max]).labels(vec![
            Line::from(format!("{y_min:.2}")),
            Line::from(format!("{y_max:.2}")),
        ]));

    f.render_widget(chart, area);
}

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    let (title, text, style) = match app.mode() {
        InputMode::CsvPath(buf) => (
            " Reference CSV path (Enter to recalibrate, Esc to cancel) ",
            format!("{buf}▏"),
            Style::default().fg(Color::White),
        ),
        InputMode::Normal => (
            " Status ",
            app.status().unwrap_or("").to_string(),
            Style::default().fg(Color::Yellow),
        ),
    };
    let block = Block::default().borders(Borders::ALL).title(title);
    let p = Paragraph::new(text).style(style).block(block);
    f.render_widget(p, area);
}

fn draw_keys(f: &mut Frame, area: Rect, app: &App) {
    let text = match app.mode() {
        InputMode::CsvPath(_) => " type a path   enter: recalibrate   esc: cancel",
        InputMode::Normal => {
            " ↑↓ field   ←→ adjust (H/L ×10)   enter: predict   c: recalibrate   x: reset width   q: quit"
        }
    };
    let bar = Paragraph::new(text).style(Style::default().bg(Color::DarkGray).fg(Color::White));
    f.render_widget(bar, area);
}
