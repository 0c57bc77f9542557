use eframe::egui::{self, Align2, TextEdit, Vec2};
use tokio::sync::mpsc;

use crate::mqtt::config::BrokerConfig;
use crate::mqtt::session_manager::SessionEvent;
use crate::persistence::StoredSettings;

use super::{send_session_event, UiColors};

/// Broker connection form, shown as a centered modal. Pre-filled from the
/// stored settings at startup; submitting builds a validated
/// [`BrokerConfig`] and hands it to the session manager.
pub struct ConnectMenuData {
    pub open: bool,
    host: String,
    port: String,
    path: String,
    user: String,
    pass: String,
    ssl: bool,
    save: bool,
    alert: Option<String>,
}

impl ConnectMenuData {
    pub fn new(stored: Option<StoredSettings>) -> Self {
        match stored {
            Some(stored) => ConnectMenuData {
                open: true,
                host: stored.host,
                port: stored.port.to_string(),
                path: stored.path,
                user: stored.user,
                pass: stored.pass,
                ssl: stored.ssl,
                save: true,
                alert: None,
            },
            None => ConnectMenuData {
                open: true,
                host: String::new(),
                port: "9001".to_string(),
                path: "/ws".to_string(),
                user: String::new(),
                pass: String::new(),
                ssl: false,
                save: false,
                alert: None,
            },
        }
    }

    pub fn alert(&mut self, message: String) {
        self.alert = Some(message);
    }

    pub fn render(&mut self, ctx: &egui::Context, session: &mpsc::Sender<SessionEvent>) {
        egui::Window::new("Broker Connection")
            .anchor(Align2::CENTER_CENTER, Vec2::ZERO)
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                egui::Grid::new("broker_form")
                    .num_columns(2)
                    .spacing([8.0, 6.0])
                    .show(ui, |ui| {
                        ui.label("Host");
                        ui.add(TextEdit::singleline(&mut self.host).hint_text("broker.local"));
                        ui.end_row();

                        ui.label("Port");
                        ui.add(TextEdit::singleline(&mut self.port).hint_text("9001"));
                        ui.end_row();

                        ui.label("Path");
                        ui.add(TextEdit::singleline(&mut self.path).hint_text("/ws"));
                        ui.end_row();

                        ui.label("Username");
                        ui.add(TextEdit::singleline(&mut self.user));
                        ui.end_row();

                        ui.label("Password");
                        ui.add(TextEdit::singleline(&mut self.pass).password(true));
                        ui.end_row();
                    });

                ui.checkbox(&mut self.ssl, "Use TLS");
                ui.checkbox(&mut self.save, "Remember settings");

                if let Some(alert) = &self.alert {
                    ui.colored_label(UiColors::OFFLINE, alert);
                }

                ui.horizontal(|ui| {
                    if ui.button("Connect").clicked() {
                        self.submit(session);
                    }
                    if ui.button("Cancel").clicked() {
                        self.open = false;
                    }
                });
            });
    }

    fn submit(&mut self, session: &mpsc::Sender<SessionEvent>) {
        let port = match self.port.trim().parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                self.alert = Some("Port must be a number between 1 and 65535".to_string());
                return;
            }
        };

        match BrokerConfig::new(
            &self.host,
            port,
            &self.path,
            &self.user,
            &self.pass,
            self.ssl,
            self.save,
        ) {
            Ok(config) => {
                self.alert = None;
                send_session_event(session, SessionEvent::Connect(config));
            }
            Err(e) => self.alert = Some(e.to_string()),
        }
    }
}
