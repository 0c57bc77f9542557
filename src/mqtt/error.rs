//! Error definitions for the MQTT session module.

use thiserror::Error;

/// Rejections produced while validating user-supplied broker settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The broker host field was empty
    #[error("broker host must not be empty")]
    EmptyHost,

    /// The broker port was outside 1-65535
    #[error("broker port must be between 1 and 65535")]
    InvalidPort,
}

/// Failures while decoding an inbound payload. These are always recovered
/// locally: the message is logged and dropped, never surfaced to the user.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The payload was not valid JSON or did not match the expected schema
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The telemetry timestamp did not match `YYYY-MM-DD HH:MM:SS`
    #[error("invalid timestamp: {0}")]
    Timestamp(#[from] chrono::format::ParseError),
}

/// Failures raised by the transport adapter.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The broker refused the connection attempt
    #[error("broker rejected connection: {0}")]
    Rejected(String),

    /// An operation required an active session but none exists
    #[error("no active broker session")]
    NotConnected,

    /// The underlying MQTT client failed to queue the request
    #[error("mqtt client error: {0}")]
    Client(String),
}
