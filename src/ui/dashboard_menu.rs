use std::time::{Duration, Instant};

use eframe::egui::{Pos2, ProgressBar, Sense, Shape, Stroke, TextEdit, Ui, Vec2};
use tokio::sync::mpsc;

use crate::mqtt::session_manager::SessionEvent;
use crate::mqtt::telemetry::{ChartWindow, ConfigEcho, TelemetrySample, CHART_CAPACITY};

use super::{send_session_event, UiColors};

const CHART_HEIGHT: f32 = 160.0;
const TOAST_DURATION: Duration = Duration::from_secs(3);

/// Live sensor view: latest reading, bounded chart and the threshold form.
pub struct DashboardMenuData {
    latest: Option<TelemetrySample>,
    chart: ChartWindow,
    temp_on_input: String,
    temp_off_input: String,
    alert: Option<String>,
    toast_until: Option<Instant>,
}

impl Default for DashboardMenuData {
    fn default() -> Self {
        DashboardMenuData {
            latest: None,
            chart: ChartWindow::default(),
            temp_on_input: String::new(),
            temp_off_input: String::new(),
            alert: None,
            toast_until: None,
        }
    }
}

impl DashboardMenuData {
    pub fn apply_sample(&mut self, sample: TelemetrySample) {
        self.chart.push(&sample);
        self.latest = Some(sample);
    }

    /// Partial prefill: only the fields present in the echo replace the
    /// current input values.
    pub fn apply_echo(&mut self, echo: &ConfigEcho) {
        if let Some(temp_on) = echo.temp_on {
            self.temp_on_input = temp_on.to_string();
        }
        if let Some(temp_off) = echo.temp_off {
            self.temp_off_input = temp_off.to_string();
        }
    }

    pub fn confirm_publish(&mut self) {
        self.alert = None;
        self.toast_until = Some(Instant::now() + TOAST_DURATION);
    }

    pub fn alert(&mut self, message: String) {
        self.alert = Some(message);
    }

    pub fn render(&mut self, ui: &mut Ui, session: &mpsc::Sender<SessionEvent>) {
        self.render_values(ui);
        ui.separator();
        self.render_chart(ui);
        ui.separator();
        self.render_threshold_form(ui, session);

        if let Some(until) = self.toast_until {
            if Instant::now() < until {
                ui.colored_label(UiColors::ONLINE, "Configuration sent ✔");
            } else {
                self.toast_until = None;
            }
        }
    }

    fn render_values(&self, ui: &mut Ui) {
        let Some(sample) = &self.latest else {
            ui.label("Waiting for sensor data…");
            return;
        };

        ui.horizontal(|ui| {
            ui.vertical(|ui| {
                ui.label("Temperature");
                ui.colored_label(
                    UiColors::TEMPERATURE,
                    format!("{:.1} °C", sample.temperature),
                );
            });
            ui.separator();
            ui.vertical(|ui| {
                ui.label("Humidity");
                ui.colored_label(UiColors::HUMIDITY, format!("{:.1} %", sample.humidity));
                let fraction = (sample.humidity / 100.0).clamp(0.0, 1.0) as f32;
                ui.add(ProgressBar::new(fraction).desired_width(120.0));
            });
            ui.separator();
            ui.vertical(|ui| {
                ui.label("Relay");
                if sample.relay_on {
                    ui.colored_label(UiColors::ONLINE, "ON — Cooling Active");
                } else {
                    ui.colored_label(UiColors::NEUTRAL, "OFF — System Idle");
                }
            });
            ui.separator();
            ui.vertical(|ui| {
                ui.label("Last update");
                ui.label(sample.time_label());
            });
        });
    }

    fn render_chart(&self, ui: &mut Ui) {
        let (response, painter) = ui.allocate_painter(
            Vec2::new(ui.available_width(), CHART_HEIGHT),
            Sense::hover(),
        );
        let rect = response.rect;

        if self.chart.len() < 2 {
            return;
        }

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for point in self.chart.points() {
            min = min.min(point.temperature).min(point.humidity);
            max = max.max(point.temperature).max(point.humidity);
        }
        // Flat series still need a visible span.
        if max - min < 1.0 {
            max += 0.5;
            min -= 0.5;
        }

        let to_pos = |index: usize, value: f64| -> Pos2 {
            let x_span = (CHART_CAPACITY - 1).max(self.chart.len() - 1) as f32;
            let x = rect.left() + rect.width() * index as f32 / x_span;
            let normalized = ((value - min) / (max - min)) as f32;
            let y = rect.bottom() - rect.height() * normalized;
            Pos2::new(x, y)
        };

        let temperatures: Vec<Pos2> = self
            .chart
            .points()
            .enumerate()
            .map(|(i, p)| to_pos(i, p.temperature))
            .collect();
        let humidities: Vec<Pos2> = self
            .chart
            .points()
            .enumerate()
            .map(|(i, p)| to_pos(i, p.humidity))
            .collect();

        painter.add(Shape::line(
            temperatures,
            Stroke::new(2.0, UiColors::TEMPERATURE),
        ));
        painter.add(Shape::line(humidities, Stroke::new(2.0, UiColors::HUMIDITY)));
    }

    fn render_threshold_form(&mut self, ui: &mut Ui, session: &mpsc::Sender<SessionEvent>) {
        ui.label("Relay thresholds");
        ui.horizontal(|ui| {
            ui.label("Temp ON");
            ui.add(
                TextEdit::singleline(&mut self.temp_on_input)
                    .desired_width(60.0)
                    .hint_text("28.5"),
            );
            ui.label("Temp OFF");
            ui.add(
                TextEdit::singleline(&mut self.temp_off_input)
                    .desired_width(60.0)
                    .hint_text("26.0"),
            );
            if ui.button("Apply").clicked() {
                self.submit_thresholds(session);
            }
        });

        if let Some(alert) = &self.alert {
            ui.colored_label(UiColors::OFFLINE, alert);
        }
    }

    fn submit_thresholds(&mut self, session: &mpsc::Sender<SessionEvent>) {
        let parsed = (
            self.temp_on_input.trim().parse::<f64>(),
            self.temp_off_input.trim().parse::<f64>(),
        );
        match parsed {
            (Ok(temp_on), Ok(temp_off)) => {
                self.alert = None;
                send_session_event(session, SessionEvent::PublishThresholds { temp_on, temp_off });
            }
            _ => self.alert = Some("Please enter valid numbers".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> TelemetrySample {
        TelemetrySample {
            timestamp: NaiveDate::from_ymd_opt(2026, 8, 27)
                .unwrap()
                .and_hms_opt(9, 15, 0)
                .unwrap(),
            temperature: 24.0,
            humidity: 50.0,
            relay_on: true,
        }
    }

    #[test]
    fn echo_updates_only_present_fields() {
        let mut menu = DashboardMenuData::default();
        menu.temp_off_input = "26".to_string();

        menu.apply_echo(&ConfigEcho {
            temp_on: Some(27.0),
            temp_off: None,
        });

        assert_eq!(menu.temp_on_input, "27");
        assert_eq!(menu.temp_off_input, "26");
    }

    #[test]
    fn sample_feeds_chart_and_latest() {
        let mut menu = DashboardMenuData::default();
        menu.apply_sample(sample());
        assert_eq!(menu.chart.len(), 1);
        assert_eq!(menu.latest.as_ref().unwrap().temperature, 24.0);
    }
}
