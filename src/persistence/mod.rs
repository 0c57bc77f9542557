//! # Persistence Module
//!
//! ## Why This Module Exists
//! The dashboard remembers the last broker configuration so a user does not
//! have to re-enter host, port and credentials on every launch. This module
//! defines the stored settings blob and the store that reads and writes it.
//!
//! ## Error Handling Strategy
//! Follows a "fail-safe" approach: a missing or corrupted settings file
//! gracefully degrades to "no saved configuration" rather than preventing
//! startup. Write errors are reported through `color_eyre` with context but
//! never stop the connect path.

pub mod settings_store;

use serde::{Deserialize, Serialize};

use crate::mqtt::config::BrokerConfig;

/// On-disk broker settings, stored as a single JSON blob. Field names match
/// the persisted format: `{host, port, path, user, pass, ssl}`.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct StoredSettings {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default)]
    pub ssl: bool,
}

impl StoredSettings {
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            path: config.path.clone(),
            user: config.username.clone().unwrap_or_default(),
            pass: config.password.clone().unwrap_or_default(),
            ssl: config.use_tls,
        }
    }
}
