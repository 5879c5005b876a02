//! Gatekeep Desktop: egui app state and UI.

use eframe::egui;
use lib::feed::{CloseInfo, FeedAdapter, FeedEvent, FeedSender};
use lib::review::{Cell, ReviewSession, RowAction, RowHandle, RowView, SessionState, TableView};
use std::collections::VecDeque;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use tokio::sync::mpsc;

const LOG_BUFFER_MAX_LINES: usize = 2000;

/// Repaint interval while a connection is live, so feed events show up without input.
const FEED_POLL_INTERVAL: Duration = Duration::from_millis(100);

const COLUMN_HEADERS: [&str; 5] = ["#", "Source", "Destination", "Payload", "Decision"];

/// Ring buffer of log lines for the Logs screen. Written by DesktopLogger.
static LOG_LINES: OnceLock<Mutex<VecDeque<String>>> = OnceLock::new();

fn log_buffer() -> &'static Mutex<VecDeque<String>> {
    LOG_LINES.get_or_init(|| Mutex::new(VecDeque::new()))
}

fn push_log_line(line: String) {
    if let Ok(mut buf) = log_buffer().lock() {
        buf.push_back(line);
        while buf.len() > LOG_BUFFER_MAX_LINES {
            buf.pop_front();
        }
    }
}

/// Logger that appends to LOG_LINES for display in the Logs screen.
struct DesktopLogger;

impl log::Log for DesktopLogger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let line = format!(
            "{} [{}] {}",
            chrono_lite(),
            record.level(),
            record.args()
        );
        push_log_line(line);
    }

    fn flush(&self) {}
}

fn chrono_lite() -> String {
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = t.as_secs();
    let millis = t.subsec_millis();
    let h = (secs / 3600) % 24;
    let m = (secs / 60) % 60;
    let s = secs % 60;
    format!("{:02}:{:02}:{:02}.{:03}", h, m, s, millis)
}

static LOGGER: DesktopLogger = DesktopLogger;

#[derive(Clone, Copy, PartialEq, Eq, Default)]
enum Screen {
    #[default]
    Review,
    Logs,
}

/// Run one feed connection on its own thread and runtime; events come back over `events_tx`.
fn spawn_feed_thread(
    url: String,
    outbound: mpsc::UnboundedReceiver<String>,
    events_tx: mpsc::UnboundedSender<FeedEvent>,
) {
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                let _ = events_tx.send(FeedEvent::Error(e.to_string()));
                let _ = events_tx.send(FeedEvent::Close(CloseInfo::abnormal()));
                return;
            }
        };
        rt.block_on(FeedAdapter::new(url).run(outbound, events_tx));
    });
}

pub struct ReviewApp {
    /// Feed URL shown in the header; used for the next session.
    feed_url: String,
    /// Review session for the current connection. Replaced when the operator starts a new one.
    session: Option<ReviewSession<TableView>>,
    /// Feed events for the current session.
    events: Option<mpsc::UnboundedReceiver<FeedEvent>>,
    /// Last action error (stale row, closed connection).
    action_error: Option<String>,
    current_screen: Screen,
}

impl ReviewApp {
    /// Space between the main screen title and the content below.
    const SCREEN_TITLE_BOTTOM_SPACING: f32 = 18.0;
    /// Space between the bottom of the content and the window edge.
    const SCREEN_FOOTER_SPACING: f32 = 48.0;

    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let _ = LOG_LINES.get_or_init(|| Mutex::new(VecDeque::new()));
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Debug);
        log::info!("desktop started");

        let feed_url = match lib::config::load_config(None) {
            Ok((config, _)) => lib::config::resolve_feed_url(&config),
            Err(e) => {
                log::warn!("config load failed, using defaults: {}", e);
                lib::config::resolve_feed_url(&lib::config::Config::default())
            }
        };
        Self {
            feed_url,
            session: None,
            events: None,
            action_error: None,
            current_screen: Screen::default(),
        }
    }

    fn session_live(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.state() != SessionState::Closed)
            .unwrap_or(false)
    }

    /// Start a fresh session against `feed_url`. The previous session's rows are discarded.
    fn start_session(&mut self) {
        let url = self.feed_url.trim().to_string();
        log::info!("connecting to feed at {}", url);
        let (sender, outbound) = FeedSender::channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        spawn_feed_thread(url, outbound, events_tx);
        self.session = Some(ReviewSession::new(TableView::new(), sender));
        self.events = Some(events_rx);
        self.action_error = None;
    }

    /// Drain feed events into the session. Call each frame.
    fn poll_feed_events(&mut self) {
        let (Some(rx), Some(session)) = (self.events.as_mut(), self.session.as_mut()) else {
            return;
        };
        let mut disconnected = false;
        loop {
            match rx.try_recv() {
                Ok(ev) => session.handle_event(ev),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }
        if disconnected {
            self.events = None;
        }
    }

    fn apply_action(&mut self, action: RowAction) {
        let Some(session) = self.session.as_mut() else { return };
        match session.handle_action(action) {
            Ok(_) => self.action_error = None,
            Err(e) => self.action_error = Some(e.to_string()),
        }
    }

    /// Row controls. Both buttons stay available after a decision; clicking again re-sends.
    fn ui_controls(ui: &mut egui::Ui, handle: RowHandle, actions: &mut Vec<RowAction>) {
        if ui.button("Accept").clicked() {
            actions.push(RowAction {
                handle,
                approved: true,
            });
        }
        if ui.button("Reject").clicked() {
            actions.push(RowAction {
                handle,
                approved: false,
            });
        }
    }

    fn ui_cell(ui: &mut egui::Ui, handle: RowHandle, cell: &Cell, actions: &mut Vec<RowAction>) {
        match cell {
            Cell::Controls => {
                ui.horizontal(|ui| Self::ui_controls(ui, handle, actions));
            }
            Cell::Verdict(approved) => {
                ui.horizontal(|ui| {
                    let color = if *approved {
                        egui::Color32::from_rgb(60, 160, 80)
                    } else {
                        egui::Color32::from_rgb(200, 60, 60)
                    };
                    ui.colored_label(color, cell.to_string());
                    Self::ui_controls(ui, handle, actions);
                });
            }
            other => {
                ui.label(other.to_string());
            }
        }
    }

    fn ui_review_screen(&mut self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        ui.heading("Messages");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);

        let mut actions = Vec::new();
        match self.session.as_ref() {
            None => {
                ui.label("Connect to a feed to review intercepted messages.");
            }
            Some(session) => {
                let table = session.view();
                let available = ui.available_height();
                let scroll_height = (available - Self::SCREEN_FOOTER_SPACING).max(0.0);
                egui::ScrollArea::vertical()
                    .max_height(scroll_height)
                    .auto_shrink([false, false])
                    .show(ui, |ui| {
                        egui::Grid::new("messages_table")
                            .striped(true)
                            .num_columns(COLUMN_HEADERS.len())
                            .spacing([16.0, 6.0])
                            .show(ui, |ui| {
                                for header in COLUMN_HEADERS {
                                    ui.strong(header);
                                }
                                ui.end_row();
                                for (handle, cells) in table.rows() {
                                    for cell in cells {
                                        Self::ui_cell(ui, handle, cell, &mut actions);
                                    }
                                    ui.end_row();
                                }
                            });
                        if table.row_count() == 0 {
                            ui.label("No messages yet.");
                        }
                    });
            }
        }
        for action in actions {
            self.apply_action(action);
        }
        if let Some(ref err) = self.action_error {
            ui.colored_label(egui::Color32::from_rgb(200, 60, 60), err.as_str());
        }
        ui.add_space(Self::SCREEN_FOOTER_SPACING);
    }

    fn ui_logs_screen(&self, ui: &mut egui::Ui) {
        ui.add_space(24.0);
        ui.heading("Logs");
        ui.add_space(Self::SCREEN_TITLE_BOTTOM_SPACING);

        let lines: Vec<String> = log_buffer()
            .lock()
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default();

        let available = ui.available_height();
        let scroll_height = (available - Self::SCREEN_FOOTER_SPACING).max(0.0);
        egui::ScrollArea::vertical()
            .max_height(scroll_height)
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for line in &lines {
                    ui.monospace(line);
                }
                if lines.is_empty() {
                    ui.label("No log output yet.");
                }
            });
        ui.add_space(Self::SCREEN_FOOTER_SPACING);
    }
}

impl eframe::App for ReviewApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_feed_events();
        let live = self.session_live();
        if live {
            ctx.request_repaint_after(FEED_POLL_INTERVAL);
        }

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            egui::Frame::none()
                .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                .show(ui, |ui| {
                    ui.add_space(16.0);
                    ui.horizontal(|ui| {
                        ui.heading("Gatekeep");
                        ui.add_space(24.0);
                        ui.label("Feed");
                        ui.add_enabled(!live, egui::TextEdit::singleline(&mut self.feed_url));
                        if live {
                            ui.add_enabled(false, egui::Button::new("Connected"));
                        } else if ui.button("Connect").clicked() {
                            self.start_session();
                        }
                    });
                    ui.add_space(8.0);
                    let status = self
                        .session
                        .as_ref()
                        .map(|s| s.status().to_string())
                        .unwrap_or_else(|| "Not connected".to_string());
                    ui.label(status);
                    ui.add_space(12.0);
                });
        });

        let current_screen = &mut self.current_screen;
        egui::SidePanel::left("sidebar")
            .resizable(false)
            .exact_width(140.0)
            .show(ctx, |ui| {
                egui::Frame::none()
                    .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                    .show(ui, |ui| {
                        ui.add_space(24.0);
                        if ui
                            .selectable_label(*current_screen == Screen::Review, "Review")
                            .clicked()
                        {
                            *current_screen = Screen::Review;
                        }
                        ui.add_space(12.0);
                        if ui
                            .selectable_label(*current_screen == Screen::Logs, "Logs")
                            .clicked()
                        {
                            *current_screen = Screen::Logs;
                        }
                    });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::Frame::none()
                .inner_margin(egui::Margin::symmetric(24.0, 0.0))
                .show(ui, |ui| match self.current_screen {
                    Screen::Review => self.ui_review_screen(ui),
                    Screen::Logs => self.ui_logs_screen(ui),
                });
        });
    }
}
