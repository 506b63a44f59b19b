pub mod preview;

use image::RgbImage;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Widget, Wrap},
};

use crate::{
    camera::CameraError,
    capture::LoopState,
    detection::DetectionResult,
    stats::StatsSnapshot,
    ui::preview::ImagePreview,
    util::{format_distance, format_time},
};

pub const NO_GESTURE: &str = "No gesture detected";
pub const NO_DISTANCE: &str = "Distance: -- cm";
pub const NO_CURRENT_GESTURE: &str = "--";
pub const STARTING_MESSAGE: &str = "Starting camera...";
pub const WEBCAM_ERROR: &str = "Error: Could not access webcam.";
pub const WEBCAM_ALERT: &str = "Could not access the webcam. Please ensure you have granted camera permissions and that no other application is using it.";
pub const EMPTY_HISTORY: &str = "No gestures detected yet";

const HORIZONTAL_MARGIN: u16 = 1;

/// Everything the capture loop and shell need to put on screen
pub trait Renderer {
    /// Project a detection and the latest statistics
    fn update_ui(&mut self, result: &DetectionResult, stats: &StatsSnapshot);
    fn update_session_time(&mut self, secs: u64);
    /// Restore every field to its default and empty the history
    fn reset_ui(&mut self);
    fn show_starting_message(&mut self);
    fn show_webcam_error(&mut self, err: &CameraError);
    fn show_frame(&mut self, frame: &RgbImage);
    fn clear_frame(&mut self);
    /// One-line status message
    fn notify(&mut self, message: &str);
}

/// Colour band of a distance reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceBand {
    Near,
    Mid,
    Far,
}

impl DistanceBand {
    pub fn of(distance: f64) -> Self {
        if distance < 30.0 {
            DistanceBand::Near
        } else if distance < 50.0 {
            DistanceBand::Mid
        } else {
            DistanceBand::Far
        }
    }

    fn color(self) -> Color {
        match self {
            DistanceBand::Near => Color::Rgb(255, 77, 77),
            DistanceBand::Mid => Color::Rgb(255, 170, 0),
            DistanceBand::Far => Color::Rgb(0, 255, 204),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub gesture: String,
    pub distance: String,
    pub at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Error,
}

/// Which controls are currently usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Controls {
    pub start_enabled: bool,
    pub stop_enabled: bool,
}

/// The text and image state of the screen
#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub gesture_text: String,
    /// Set when the overlay gesture differs from the previous one
    pub gesture_changed: bool,
    pub distance_text: String,
    pub distance_band: Option<DistanceBand>,
    pub current_gesture: String,
    pub total_detections: String,
    pub session_time: String,
    pub average_distance: String,
    /// Newest first
    pub history: Vec<HistoryRow>,
    pub status: Option<(StatusLevel, String)>,
    pub alert: Option<String>,
    pub preview: Option<RgbImage>,
}

impl Default for Dashboard {
    fn default() -> Self {
        Self {
            gesture_text: NO_GESTURE.to_string(),
            gesture_changed: false,
            distance_text: NO_DISTANCE.to_string(),
            distance_band: None,
            current_gesture: NO_CURRENT_GESTURE.to_string(),
            total_detections: "0".to_string(),
            session_time: format_time(0),
            average_distance: format_distance(None),
            history: Vec::new(),
            status: None,
            alert: None,
            preview: None,
        }
    }
}

/// Renderer writing into a [`Dashboard`]
#[derive(Debug, Default)]
pub struct UiRenderer {
    dashboard: Dashboard,
    last_gesture: Option<String>,
}

impl UiRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn show_alert(&mut self, message: &str) {
        self.dashboard.alert = Some(message.to_string());
    }

    /// Returns true if an alert was showing
    pub fn dismiss_alert(&mut self) -> bool {
        self.dashboard.alert.take().is_some()
    }

    pub fn show_error(&mut self, message: &str) {
        self.dashboard.status = Some((StatusLevel::Error, message.to_string()));
    }

    fn apply_stats(&mut self, stats: &StatsSnapshot) {
        let d = &mut self.dashboard;
        d.total_detections = stats.total_detections.to_string();
        d.session_time = format_time(stats.session_time);
        d.average_distance = format_distance(stats.average_distance.map(|a| a as f64));
        d.history = stats
            .gesture_history
            .iter()
            .map(|entry| HistoryRow {
                gesture: entry.gesture.clone(),
                distance: format_distance(entry.distance),
                at: format_time(entry.session_timestamp),
            })
            .collect();
    }
}

impl Renderer for UiRenderer {
    fn update_ui(&mut self, result: &DetectionResult, stats: &StatsSnapshot) {
        if let Some(gesture) = result.gesture() {
            let d = &mut self.dashboard;
            d.gesture_text = gesture.to_string();
            d.current_gesture = gesture.to_string();
            d.gesture_changed = self.last_gesture.as_deref() != Some(gesture);
            self.last_gesture = Some(gesture.to_string());
        }

        // a zero reading means "no estimate" and leaves the previous one up
        if let Some(distance) = result.distance.filter(|d| *d != 0.0) {
            self.dashboard.distance_text = format!("Distance: {}", format_distance(Some(distance)));
            self.dashboard.distance_band = Some(DistanceBand::of(distance));
        }

        self.apply_stats(stats);
    }

    fn update_session_time(&mut self, secs: u64) {
        self.dashboard.session_time = format_time(secs);
    }

    fn reset_ui(&mut self) {
        let preview = self.dashboard.preview.take();
        let alert = self.dashboard.alert.take();
        self.dashboard = Dashboard {
            preview,
            alert,
            ..Dashboard::default()
        };
        self.last_gesture = None;
    }

    fn show_starting_message(&mut self) {
        self.dashboard.gesture_text = STARTING_MESSAGE.to_string();
        self.dashboard.status = Some((StatusLevel::Info, STARTING_MESSAGE.to_string()));
    }

    fn show_webcam_error(&mut self, err: &CameraError) {
        self.dashboard.gesture_text = WEBCAM_ERROR.to_string();
        self.dashboard.status = Some((StatusLevel::Error, err.to_string()));
        self.dashboard.alert = Some(WEBCAM_ALERT.to_string());
    }

    fn show_frame(&mut self, frame: &RgbImage) {
        match self.dashboard.preview.as_mut() {
            Some(preview) if preview.dimensions() == frame.dimensions() => {
                preview.copy_from_slice(frame.as_raw());
            }
            _ => self.dashboard.preview = Some(frame.clone()),
        }
    }

    fn clear_frame(&mut self) {
        self.dashboard.preview = None;
    }

    fn notify(&mut self, message: &str) {
        self.dashboard.status = Some((StatusLevel::Info, message.to_string()));
    }
}

/// Borrowed view of everything drawn in one frame
pub struct DashboardView<'a> {
    pub dashboard: &'a Dashboard,
    pub controls: Controls,
    pub state: LoopState,
}

impl Widget for DashboardView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let d = self.dashboard;
        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let dim_style = Style::default().add_modifier(Modifier::DIM);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .constraints([
                Constraint::Min(6),    // camera + side panels
                Constraint::Length(1), // status line
                Constraint::Length(3), // controls
            ])
            .split(area);

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
            .split(rows[0]);

        // camera panel with gesture and distance overlays
        let camera_block = Block::default()
            .borders(Borders::ALL)
            .title(format!(" Camera [{}] ", self.state));
        let camera_inner = camera_block.inner(columns[0]);
        camera_block.render(columns[0], buf);

        let camera_rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(1),
                Constraint::Length(1),
            ])
            .split(camera_inner);

        let gesture_style = if d.gesture_changed {
            bold_style.fg(Color::Yellow).add_modifier(Modifier::REVERSED)
        } else {
            bold_style.fg(Color::Yellow)
        };
        Paragraph::new(Span::styled(d.gesture_text.as_str(), gesture_style))
            .alignment(Alignment::Center)
            .render(camera_rows[0], buf);

        match d.preview.as_ref() {
            Some(frame) => ImagePreview::new(frame).render(camera_rows[1], buf),
            None => Paragraph::new(Span::styled("no video", dim_style))
                .alignment(Alignment::Center)
                .render(camera_rows[1], buf),
        }

        let distance_style = d
            .distance_band
            .map(|band| bold_style.fg(band.color()))
            .unwrap_or(dim_style);
        Paragraph::new(Span::styled(d.distance_text.as_str(), distance_style))
            .alignment(Alignment::Center)
            .render(camera_rows[2], buf);

        // statistics and history
        let side = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(6), Constraint::Min(3)])
            .split(columns[1]);

        let stat_line = |label: &'static str, value: &str| {
            Line::from(vec![
                Span::styled(format!("{label:<18}"), dim_style),
                Span::styled(value.to_string(), bold_style),
            ])
        };
        Paragraph::new(vec![
            stat_line("Total detections", &d.total_detections),
            stat_line("Session time", &d.session_time),
            stat_line("Average distance", &d.average_distance),
            stat_line("Current gesture", &d.current_gesture),
        ])
        .block(Block::default().borders(Borders::ALL).title(" Statistics "))
        .render(side[0], buf);

        let history_block = Block::default()
            .borders(Borders::ALL)
            .title(format!(" History ({}) ", d.history.len()));
        if d.history.is_empty() {
            Paragraph::new(Span::styled(
                EMPTY_HISTORY,
                dim_style.add_modifier(Modifier::ITALIC),
            ))
            .alignment(Alignment::Center)
            .block(history_block)
            .render(side[1], buf);
        } else {
            let items: Vec<ListItem> = d
                .history
                .iter()
                .map(|row| {
                    ListItem::new(Line::from(vec![
                        Span::styled(format!("{} ", row.at), dim_style),
                        Span::styled(format!("{:<14}", row.gesture), bold_style),
                        Span::raw(row.distance.as_str()),
                    ]))
                })
                .collect();
            List::new(items).block(history_block).render(side[1], buf);
        }

        if let Some((level, message)) = d.status.as_ref() {
            let style = match level {
                StatusLevel::Info => Style::default().fg(Color::Cyan),
                StatusLevel::Error => Style::default().fg(Color::Red),
            };
            Paragraph::new(Span::styled(message.as_str(), style)).render(rows[1], buf);
        }

        render_controls(self.controls, rows[2], buf);

        if let Some(alert) = d.alert.as_ref() {
            render_alert(alert, area, buf);
        }
    }
}

fn render_controls(controls: Controls, area: Rect, buf: &mut Buffer) {
    let enabled = Style::default().add_modifier(Modifier::BOLD);
    let disabled = Style::default().add_modifier(Modifier::DIM | Modifier::CROSSED_OUT);
    let key = |on: bool| if on { enabled } else { disabled };

    let line = Line::from(vec![
        Span::styled("(s)tart", key(controls.start_enabled)),
        Span::raw("  "),
        Span::styled("(x) stop", key(controls.stop_enabled)),
        Span::raw("  "),
        Span::styled("(e)xport server log", enabled),
        Span::raw("  "),
        Span::styled("(l)ocal csv", enabled),
        Span::raw("  "),
        Span::styled("(r)eset", enabled),
        Span::raw("  "),
        Span::styled("(q)uit", enabled),
    ]);

    Paragraph::new(line)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL))
        .render(area, buf);
}

fn render_alert(message: &str, area: Rect, buf: &mut Buffer) {
    let width = area.width.saturating_sub(4).min(60);
    let height = 7.min(area.height);
    let popup = Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    );

    Clear.render(popup, buf);
    Paragraph::new(vec![
        Line::from(message.to_string()),
        Line::from(""),
        Line::from(Span::styled(
            "press any key",
            Style::default().add_modifier(Modifier::ITALIC | Modifier::DIM),
        )),
    ])
    .wrap(Wrap { trim: true })
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Alert ")
            .border_style(Style::default().fg(Color::Red)),
    )
    .render(popup, buf);
}
