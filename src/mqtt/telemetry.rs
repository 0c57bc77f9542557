//! Wire payload types for the two monitoring topics and the bounded chart
//! window fed by incoming telemetry.

use std::collections::VecDeque;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::error::PayloadError;

/// Timestamp format used by the sensor firmware.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Maximum number of points retained for the live chart.
pub const CHART_CAPACITY: usize = 20;

/// One decoded sensor reading. Constructed per inbound message and handed
/// straight to the view layer; the session core never retains it.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    pub timestamp: NaiveDateTime,
    pub temperature: f64,
    pub humidity: f64,
    pub relay_on: bool,
}

#[derive(Debug, Deserialize)]
struct WireSample {
    timestamp: String,
    temperature: f64,
    humidity: f64,
    relay: RelaySwitch,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
enum RelaySwitch {
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "OFF")]
    Off,
}

impl TelemetrySample {
    /// Decodes a telemetry payload of the form
    /// `{"timestamp":"YYYY-MM-DD HH:MM:SS","temperature":n,"humidity":n,"relay":"ON"|"OFF"}`.
    pub fn parse(payload: &[u8]) -> Result<Self, PayloadError> {
        let wire: WireSample = serde_json::from_slice(payload)?;
        let timestamp = NaiveDateTime::parse_from_str(&wire.timestamp, TIMESTAMP_FORMAT)?;
        Ok(Self {
            timestamp,
            temperature: wire.temperature,
            humidity: wire.humidity,
            relay_on: wire.relay == RelaySwitch::On,
        })
    }

    /// `HH:MM:SS` portion of the timestamp, used for chart labels and the
    /// "last update" indicator.
    pub fn time_label(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }
}

/// Threshold configuration echoed back from the broker. Both fields are
/// optional; only the present ones update the input prefill.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConfigEcho {
    pub temp_on: Option<f64>,
    pub temp_off: Option<f64>,
}

impl ConfigEcho {
    pub fn parse(payload: &[u8]) -> Result<Self, PayloadError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Outbound threshold configuration, serialized as
/// `{"temp_on":…,"temp_off":…}` and published retained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdConfig {
    pub temp_on: f64,
    pub temp_off: f64,
}

/// One chart data point derived from a telemetry sample.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPoint {
    pub label: String,
    pub temperature: f64,
    pub humidity: f64,
}

/// FIFO-bounded window of the most recent telemetry points. Pushing beyond
/// [`CHART_CAPACITY`] evicts the oldest point, so the sequence length never
/// exceeds the capacity and the newest point is always last.
#[derive(Debug, Default)]
pub struct ChartWindow {
    points: VecDeque<ChartPoint>,
}

impl ChartWindow {
    pub fn push(&mut self, sample: &TelemetrySample) {
        self.points.push_back(ChartPoint {
            label: sample.time_label(),
            temperature: sample.temperature,
            humidity: sample.humidity,
        });
        while self.points.len() > CHART_CAPACITY {
            self.points.pop_front();
        }
    }

    pub fn points(&self) -> impl Iterator<Item = &ChartPoint> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
