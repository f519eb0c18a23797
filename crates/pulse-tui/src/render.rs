//! Dashboard view.
//!
//! Chart text is computed before the frame is drawn (see [`ChartPanels`]) so
//! that a plotting error fails the frame instead of panicking inside the
//! draw closure. Everything else here is a pure function of the view.

use chrono::Local;
use pulse_core::Result;
use pulse_core::chart::{PlotConfig, plot_series};
use pulse_core::format::{
    MISSING, format_bytes, format_params, format_phase, format_runtime, format_thousands,
    or_missing, truncate_with_ellipsis,
};
use pulse_core::pipeline::DashboardView;
use pulse_core::snapshot::Snapshot;
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Padding, Paragraph, Row, Table, Wrap};
use tracing::Level;

const TITLE: &str = "PULSE · Worker Telemetry";
const CHART_HEIGHT: usize = 6;
const CHART_OFFSET: usize = 3;
/// Label (8 + space) plus the offset columns before the first point.
const CHART_GUTTER: u16 = 11;
const MIN_CHART_POINTS: usize = 10;
const HOTKEY_PREFIX: usize = 12;
const STATUS_MAX_CHARS: usize = 45;
const WAITING: &str = "Waiting for data...";

/// Screen regions of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardAreas {
    pub header: Rect,
    pub statistics: Rect,
    pub worker: Rect,
    pub status: Rect,
    pub logs: Rect,
    pub loss_chart: Rect,
    pub rate_chart: Rect,
    pub footer: Rect,
}

impl DashboardAreas {
    pub fn new(area: Rect) -> Self {
        let [header, statistics, main, footer] = Layout::vertical([
            Constraint::Length(4),
            Constraint::Length(11),
            Constraint::Min(8),
            Constraint::Length(3),
        ])
        .areas(area);
        let [left, right] =
            Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)]).areas(main);
        let [worker, status, logs] = Layout::vertical([
            Constraint::Length(11),
            Constraint::Length(8),
            Constraint::Min(3),
        ])
        .areas(left);
        let [loss_chart, rate_chart] =
            Layout::vertical([Constraint::Ratio(1, 2), Constraint::Ratio(1, 2)]).areas(right);

        Self {
            header,
            statistics,
            worker,
            status,
            logs,
            loss_chart,
            rate_chart,
            footer,
        }
    }
}

/// Pre-rendered chart bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartPanels {
    pub loss: String,
    pub rate: String,
}

impl ChartPanels {
    /// Plots both histories, keeping as many trailing points as fit in `areas`.
    ///
    /// # Errors
    /// Returns the plotter's error when a chart cannot be produced.
    pub fn prepare(view: &DashboardView<'_>, areas: &DashboardAreas) -> Result<Self> {
        Ok(Self {
            loss: chart_text(&view.loss_points(), chart_capacity(areas.loss_chart))?,
            rate: chart_text(&view.rate_points(), chart_capacity(areas.rate_chart))?,
        })
    }
}

fn chart_capacity(area: Rect) -> usize {
    // Borders and one column of padding on each side.
    let inner = area.width.saturating_sub(4).saturating_sub(CHART_GUTTER);
    usize::from(inner).max(MIN_CHART_POINTS)
}

/// Plots the newest `max_points` values, or a waiting message when there are none.
///
/// # Errors
/// Returns the plotter's error when the chart cannot be produced.
pub fn chart_text(points: &[f64], max_points: usize) -> Result<String> {
    let tail = &points[points.len().saturating_sub(max_points)..];
    let config = PlotConfig {
        height: Some(CHART_HEIGHT),
        offset: CHART_OFFSET,
        ..PlotConfig::default()
    };
    let chart = plot_series(tail, &config)?;
    if chart.is_empty() {
        return Ok(WAITING.to_string());
    }
    Ok(chart
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Draws the full dashboard.
pub fn render_dashboard(frame: &mut Frame, view: &DashboardView<'_>, charts: &ChartPanels) {
    let areas = DashboardAreas::new(frame.area());
    let snapshot = view.snapshot;

    render_header(frame, areas.header, snapshot);
    render_statistics(frame, areas.statistics, snapshot);
    render_worker(frame, areas.worker, snapshot);
    render_status(frame, areas.status, view);
    render_logs(frame, areas.logs, view);
    render_chart(frame, areas.loss_chart, "Training Loss", Color::Red, &charts.loss);
    render_chart(
        frame,
        areas.rate_chart,
        "Activation Rate (/min)",
        Color::Green,
        &charts.rate,
    );
    render_footer(frame, areas.footer);
}

/// Replaces the whole screen with a single error panel.
pub fn render_error(frame: &mut Frame, message: &str) {
    let block = panel("Dashboard Error", Color::Red);
    let para = Paragraph::new(Line::from(Span::styled(
        message.to_string(),
        Style::default().fg(Color::Red),
    )))
    .block(block)
    .wrap(Wrap { trim: true });
    frame.render_widget(para, frame.area());
}

fn panel(title: &str, color: Color) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .title(format!(" {title} "))
        .title_style(Style::default().fg(color).add_modifier(Modifier::BOLD))
}

pub fn network_status(snapshot: Option<&Snapshot>) -> String {
    match snapshot {
        None => WAITING.to_string(),
        Some(snapshot) if snapshot.phase.is_none() => "Initializing (phase=None)".to_string(),
        Some(snapshot) => format_phase(snapshot.phase.as_deref()),
    }
}

/// First 12 characters of the hotkey followed by an ellipsis.
pub fn hotkey_display(hotkey: Option<&str>) -> String {
    match hotkey {
        Some(hotkey) if !hotkey.is_empty() => {
            let prefix: String = hotkey.chars().take(HOTKEY_PREFIX).collect();
            format!("{prefix}...")
        }
        _ => MISSING.to_string(),
    }
}

fn render_header(frame: &mut Frame, area: Rect, snapshot: Option<&Snapshot>) {
    let lines = vec![
        Line::from(Span::styled(
            TITLE,
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            format!("Network Status: {}", network_status(snapshot)),
            Style::default()
                .fg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
        )),
    ];
    let para = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(para, area);
}

fn loss_value(value: Option<f64>) -> String {
    or_missing(value, |v| format!("{v:.4}"))
}

/// Label/value pairs for the statistics grid, two pairs per row.
pub fn statistics_rows(snapshot: &Snapshot) -> Vec<[(&'static str, String); 2]> {
    let parameters = snapshot.total_params.map_or_else(
        || snapshot.model_size.clone().unwrap_or_else(|| MISSING.to_string()),
        format_params,
    );
    vec![
        [
            ("Model", snapshot.model_name.clone().unwrap_or_else(|| MISSING.to_string())),
            ("Learning Rate", or_missing(snapshot.learning_rate, |v| format!("{v:.1e}"))),
        ],
        [
            ("Parameters", parameters),
            ("Layer", or_missing(snapshot.layer, |v| v.to_string())),
        ],
        [
            ("Hotkey", hotkey_display(snapshot.hotkey.as_deref())),
            ("Run ID", snapshot.run_id.clone().unwrap_or_else(|| MISSING.to_string())),
        ],
        [
            ("Total Layers", or_missing(snapshot.n_layers, |v| v.to_string())),
            ("Activation Rate", format!("{:.2} / min", snapshot.activation_rate)),
        ],
        [
            ("Total Activations", format_thousands(snapshot.total_activations)),
            ("Current Loss", loss_value(snapshot.latest_loss)),
        ],
        [
            ("Avg Loss", loss_value(snapshot.loss_average)),
            ("Needs Pull", yes_no(snapshot.need_to_pull_weights)),
        ],
        [
            ("Downloaded", format_bytes(snapshot.download_bytes)),
            ("Uploaded", format_bytes(snapshot.upload_bytes)),
        ],
        [
            ("Forward Passes", format_thousands(snapshot.forward_count)),
            ("Backward Passes", format_thousands(snapshot.backward_count)),
        ],
        [
            ("Remote Epoch", or_missing(snapshot.remote_epoch, |v| v.to_string())),
            ("Local Epoch", local_epoch(snapshot.local_epoch)),
        ],
    ]
}

/// Local epochs are zero-based internally and shown one-based.
fn local_epoch(epoch: Option<u64>) -> String {
    or_missing(epoch, |v| v.saturating_add(1).to_string())
}

fn yes_no(flag: bool) -> String {
    let text = if flag { "Yes" } else { "No" };
    text.to_string()
}

fn label(text: &str) -> Cell<'static> {
    Cell::from(Span::styled(
        format!("{text}:"),
        Style::default().fg(Color::Cyan),
    ))
}

fn value(text: String) -> Cell<'static> {
    Cell::from(Span::styled(text, Style::default().fg(Color::Yellow)))
}

fn waiting_panel(frame: &mut Frame, area: Rect, block: Block<'static>, message: &str) {
    frame.render_widget(Paragraph::new(message.to_string()).block(block), area);
}

fn render_statistics(frame: &mut Frame, area: Rect, snapshot: Option<&Snapshot>) {
    let block = panel("Training Statistics", Color::Cyan);
    let Some(snapshot) = snapshot else {
        waiting_panel(frame, area, block, "Waiting for worker data...");
        return;
    };

    let rows = statistics_rows(snapshot).into_iter().map(|[left, right]| {
        Row::new(vec![
            label(left.0),
            value(left.1),
            label(right.0),
            value(right.1),
        ])
    });
    let table = Table::new(
        rows,
        [
            Constraint::Length(20),
            Constraint::Min(16),
            Constraint::Length(20),
            Constraint::Min(16),
        ],
    )
    .column_spacing(2)
    .block(block);
    frame.render_widget(table, area);
}

/// Rows of the worker status table. Loss rows appear only when known.
pub fn worker_rows(snapshot: &Snapshot) -> Vec<(&'static str, String)> {
    let mut rows = vec![
        ("Hotkey", hotkey_display(snapshot.hotkey.as_deref())),
        ("Layer", or_missing(snapshot.layer, |v| v.to_string())),
        ("Activations", format_thousands(snapshot.total_activations)),
        ("Rate (/min)", format!("{:.2}", snapshot.activation_rate)),
    ];
    if snapshot.latest_loss.is_some() {
        rows.push(("Latest Loss", loss_value(snapshot.latest_loss)));
    }
    if snapshot.loss_average.is_some() {
        rows.push(("Avg Loss", loss_value(snapshot.loss_average)));
    }
    rows.push(("Phase", format_phase(snapshot.phase.as_deref())));
    rows.push(("Needs Pull", yes_no(snapshot.need_to_pull_weights)));
    rows
}

fn key_value_table(
    rows: Vec<(&'static str, String)>,
    block: Block<'static>,
    header: Option<[&'static str; 2]>,
) -> Table<'static> {
    let rows = rows.into_iter().map(|(key, val)| {
        Row::new(vec![
            Cell::from(Span::styled(key, Style::default().fg(Color::Cyan))),
            Cell::from(Line::from(Span::styled(val, Style::default().fg(Color::Yellow))).right_aligned()),
        ])
    });
    let mut table = Table::new(rows, [Constraint::Length(18), Constraint::Min(12)]).block(block);
    if let Some([left, right]) = header {
        table = table.header(
            Row::new(vec![Cell::from(left), Cell::from(Line::from(right).right_aligned())]).style(
                Style::default()
                    .fg(Color::Magenta)
                    .add_modifier(Modifier::BOLD),
            ),
        );
    }
    table
}

fn render_worker(frame: &mut Frame, area: Rect, snapshot: Option<&Snapshot>) {
    let block = panel("Worker Status", Color::LightBlue);
    let Some(snapshot) = snapshot else {
        waiting_panel(frame, area, block, WAITING);
        return;
    };
    let table = key_value_table(worker_rows(snapshot), block, Some(["Metric", "Value"]));
    frame.render_widget(table, area);
}

/// Rows of the status table.
pub fn status_rows(view: &DashboardView<'_>) -> Vec<(&'static str, String)> {
    let mut rows = vec![("Runtime", format_runtime(view.uptime))];
    let Some(snapshot) = view.snapshot else {
        rows.push(("Debug", format!("No snapshot (queue: {})", view.queue_depth)));
        return rows;
    };

    rows.push((
        "Last Update",
        snapshot
            .generated_at
            .with_timezone(&Local)
            .format("%H:%M:%S")
            .to_string(),
    ));
    if let Some(epoch) = snapshot.remote_epoch {
        rows.push(("Remote Epoch", epoch.to_string()));
    }
    if snapshot.local_epoch.is_some() {
        rows.push(("Local Epoch", local_epoch(snapshot.local_epoch)));
    }
    if snapshot.phase.is_none() {
        let run_id = snapshot
            .run_id
            .as_deref()
            .map_or_else(|| "None".to_string(), |id| id.chars().take(8).collect());
        let layer = snapshot
            .layer
            .map_or_else(|| "None".to_string(), |layer| layer.to_string());
        rows.push(("Debug", format!("Phase=None, Layer={layer}, RunID={run_id}")));
    }
    let message = if snapshot.status_message.is_empty() {
        "Running"
    } else {
        snapshot.status_message.as_str()
    };
    rows.push(("Status", truncate_with_ellipsis(message, STATUS_MAX_CHARS)));
    rows
}

fn render_status(frame: &mut Frame, area: Rect, view: &DashboardView<'_>) {
    let block = panel("Status", Color::LightBlue);
    frame.render_widget(key_value_table(status_rows(view), block, None), area);
}

fn level_style(level: Level) -> Style {
    match level {
        Level::ERROR => Style::default().fg(Color::Red),
        Level::WARN => Style::default().fg(Color::Yellow),
        Level::INFO => Style::default().fg(Color::Green),
        _ => Style::default().fg(Color::DarkGray),
    }
}

fn render_logs(frame: &mut Frame, area: Rect, view: &DashboardView<'_>) {
    let block = panel("Recent Logs", Color::DarkGray);
    let visible = usize::from(area.height.saturating_sub(2));
    let lines: Vec<Line<'static>> = view
        .logs
        .map(|tail| tail.recent(visible))
        .unwrap_or_default()
        .into_iter()
        .map(|line| {
            Line::from(vec![
                Span::styled(
                    format!("{} ", line.timestamp),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(format!("{:<5} ", line.level), level_style(line.level)),
                Span::raw(line.message),
            ])
        })
        .collect();
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_chart(frame: &mut Frame, area: Rect, title: &str, color: Color, body: &str) {
    let block = panel(title, color).padding(Padding::horizontal(1));
    let lines: Vec<Line<'static>> = body.lines().map(|l| Line::from(l.to_string())).collect();
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_footer(frame: &mut Frame, area: Rect) {
    let para = Paragraph::new(Line::from(Span::styled(
        "Press Ctrl+C to exit",
        Style::default()
            .fg(Color::White)
            .bg(Color::Blue)
            .add_modifier(Modifier::BOLD),
    )))
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::ALL));
    frame.render_widget(para, area);
}
