//! # Dashboard User Interface Module
//!
//! eframe/egui rendering layer for the monitoring dashboard. The UI is a
//! pure view sink: every frame it drains the [`ViewEvent`] channel coming
//! from the session manager and re-renders from its own local copy of the
//! state. The only signals flowing back into the core are the two form
//! submissions (broker connection and threshold configuration), sent as
//! [`SessionEvent`]s.
//!
//! ## Why This Module Exists
//!
//! Separating rendering from the session state machine keeps the core free
//! of any egui types and testable without a display. The UI never queries
//! core state; it only reacts to notifications, so a dropped frame can at
//! worst delay a repaint, never corrupt the session.
//!
//! ## Layout
//!
//! - **Header**: title plus a connection status pill driven by
//!   `ViewEvent::StatusChanged`.
//! - **Dashboard**: latest sensor values, a 20-point temperature/humidity
//!   chart and the threshold form ([`dashboard_menu`]).
//! - **Connection modal**: broker settings form, shown at startup and
//!   whenever a connect attempt is rejected ([`connect_menu`]).

pub mod connect_menu;
pub mod dashboard_menu;

use std::time::Duration;

use eframe::egui::{self, Color32};
use tokio::sync::mpsc;
use tracing::warn;

use crate::mqtt::session_manager::{ConnectionState, SessionEvent, ViewEvent};
use crate::persistence::StoredSettings;

use self::connect_menu::ConnectMenuData;
use self::dashboard_menu::DashboardMenuData;

/// Shared color palette for the dark dashboard theme.
pub struct UiColors;

impl UiColors {
    pub const ONLINE: Color32 = Color32::from_rgb(52, 211, 153);
    pub const OFFLINE: Color32 = Color32::from_rgb(248, 113, 113);
    pub const NEUTRAL: Color32 = Color32::from_rgb(148, 163, 184);
    pub const TEMPERATURE: Color32 = Color32::from_rgb(251, 146, 60);
    pub const HUMIDITY: Color32 = Color32::from_rgb(96, 165, 250);
}

pub struct DashboardUi {
    view_events: mpsc::Receiver<ViewEvent>,
    session: mpsc::Sender<SessionEvent>,
    status: ConnectionState,
    connect_menu: ConnectMenuData,
    dashboard: DashboardMenuData,
}

impl DashboardUi {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        view_events: mpsc::Receiver<ViewEvent>,
        session: mpsc::Sender<SessionEvent>,
        stored: Option<StoredSettings>,
    ) -> Self {
        cc.egui_ctx.set_theme(egui::Theme::Dark);
        DashboardUi {
            view_events,
            session,
            status: ConnectionState::Idle,
            connect_menu: ConnectMenuData::new(stored),
            dashboard: DashboardMenuData::default(),
        }
    }

    /// Applies all pending notifications from the session manager.
    fn drain_view_events(&mut self) {
        while let Ok(event) = self.view_events.try_recv() {
            match event {
                ViewEvent::StatusChanged(state) => {
                    self.status = state;
                    match state {
                        ConnectionState::Connected => self.connect_menu.open = false,
                        ConnectionState::Failed => self.connect_menu.open = true,
                        _ => {}
                    }
                }
                ViewEvent::ConnectionRejected { reason } => {
                    self.connect_menu.open = true;
                    self.connect_menu.alert(format!("Connection failed: {}", reason));
                }
                ViewEvent::SampleReceived(sample) => self.dashboard.apply_sample(sample),
                ViewEvent::ConfigEcho(echo) => self.dashboard.apply_echo(&echo),
                ViewEvent::PublishAccepted => self.dashboard.confirm_publish(),
                ViewEvent::PublishRejected { reason } => self.dashboard.alert(reason),
            }
        }
    }

    fn status_label(&self) -> (&'static str, Color32) {
        match self.status {
            ConnectionState::Idle => ("Not connected", UiColors::NEUTRAL),
            ConnectionState::Connecting => ("Connecting…", UiColors::NEUTRAL),
            ConnectionState::Connected => ("Connected", UiColors::ONLINE),
            ConnectionState::Failed => ("Failed", UiColors::OFFLINE),
            ConnectionState::Disconnected => ("Disconnected", UiColors::OFFLINE),
        }
    }
}

impl eframe::App for DashboardUi {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_view_events();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.ctx().request_repaint_after(Duration::from_millis(100));

            ui.horizontal(|ui| {
                ui.heading("Smart IoT Monitoring");
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let (text, color) = self.status_label();
                    ui.colored_label(color, format!("\u{2B24} {}", text));
                    if ui.button("Broker…").clicked() {
                        self.connect_menu.open = true;
                    }
                });
            });
            ui.separator();

            self.dashboard.render(ui, &self.session);
        });

        if self.connect_menu.open {
            self.connect_menu.render(ctx, &self.session);
        }
    }
}

/// Sends a session event without blocking the frame; a saturated channel is
/// logged and the event dropped.
pub(crate) fn send_session_event(session: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    if let Err(e) = session.try_send(event) {
        warn!("Session channel saturated, dropping UI event: {}", e);
    }
}
