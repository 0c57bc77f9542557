//! # MQTT Session Module
//!
//! Implements the connection-and-telemetry core of the Smart IoT monitoring
//! dashboard: a state-machine-driven MQTT session manager with websocket
//! transport, automatic reconnection and bounded chart state.
//!
//! ## Why This Module Exists
//!
//! The dashboard is a thin presentation layer over a pub/sub channel. All of
//! the lifecycle complexity lives here: establishing a broker session,
//! reacting to connection loss, retrying with the last known configuration,
//! and folding inbound messages into renderable view state. Keeping that in
//! one place means the UI never has to reason about transport details.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs          - Broker connection configuration and validation
//! ├── error.rs           - Error taxonomy for config, payload and transport failures
//! ├── telemetry.rs       - Wire payloads and the bounded chart window
//! ├── transport.rs       - Adapter around the rumqttc websocket client
//! └── session_manager.rs - Connection state machine and message routing
//! ```
//!
//! ## Design Philosophy
//!
//! - **Single Event Entry Point**: Every transport callback, timer expiry and
//!   UI command becomes a [`session_manager::SessionEvent`] consumed by one
//!   central transition function, so the whole state machine is readable in
//!   one place rather than scattered across handlers.
//! - **Generation Tagging**: Each transport adapter carries a monotonically
//!   increasing generation id. Late callbacks from a superseded adapter are
//!   discarded, which prevents a stale reconnect timer from dialing with
//!   outdated credentials.
//! - **One-Way View Notifications**: The session manager pushes
//!   [`session_manager::ViewEvent`]s to the UI and never queries UI state
//!   back.

pub mod config;
pub mod error;
pub mod session_manager;
pub mod telemetry;
pub mod transport;

/// Topic carrying DHT22 sensor readings.
pub const TELEMETRY_TOPIC: &str = "smart-iot/monitoring/dht22";

/// Topic carrying the relay threshold configuration, published retained so
/// late subscribers immediately receive the last values.
pub const CONFIG_TOPIC: &str = "smart-iot/monitoring/config";
