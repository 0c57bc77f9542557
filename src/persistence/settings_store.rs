use std::path::PathBuf;

use color_eyre::eyre::{eyre, Result};
use tracing::{debug, info, warn};

use super::StoredSettings;

const SETTINGS_DIR: &str = "smartiot-monitor";
const SETTINGS_FILE: &str = "broker.json";

/// Durable store for the broker connection settings. Pure data access:
/// load, overwrite, remove. No merge semantics.
#[derive(Clone, Debug)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Store at the platform config directory, e.g.
    /// `~/.config/smartiot-monitor/broker.json`.
    pub fn new() -> Self {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(SETTINGS_DIR);
        path.push(SETTINGS_FILE);
        Self { path }
    }

    /// Store at an explicit file path.
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    /// Returns the stored settings, or `None` when no file exists or its
    /// content is malformed. Never raises to the caller.
    pub async fn load(&self) -> Option<StoredSettings> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No stored broker settings");
                return None;
            }
            Err(e) => {
                warn!("Failed to read stored broker settings: {}", e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(settings) => Some(settings),
            Err(e) => {
                warn!("Ignoring malformed stored broker settings: {}", e);
                None
            }
        }
    }

    /// Overwrites any previously stored settings.
    pub async fn save(&self, settings: &StoredSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create settings directory: {}", e))?;
        }

        let content = serde_json::to_string_pretty(settings)
            .map_err(|e| eyre!("Failed to serialize broker settings: {}", e))?;

        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| eyre!("Failed to write settings file: {}", e))?;

        info!("Broker settings saved");
        Ok(())
    }

    /// Removes the stored settings. A missing file is not an error.
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("Stored broker settings cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(eyre!("Failed to remove settings file: {}", e)),
        }
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(name: &str) -> SettingsStore {
        SettingsStore::at(std::env::temp_dir().join(format!(
            "smartiot-monitor-{}-{}.json",
            name,
            std::process::id()
        )))
    }

    fn settings() -> StoredSettings {
        StoredSettings {
            host: "broker.local".to_string(),
            port: 9001,
            path: "/ws".to_string(),
            user: "user".to_string(),
            pass: "secret".to_string(),
            ssl: true,
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = store("roundtrip");
        store.save(&settings()).await.unwrap();
        assert_eq!(store.load().await, Some(settings()));
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn clear_then_load_is_absent() {
        let store = store("clear");
        store.save(&settings()).await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.load().await, None);
    }

    #[tokio::test]
    async fn clear_without_file_is_ok() {
        store("missing").clear().await.unwrap();
    }

    #[tokio::test]
    async fn malformed_file_loads_as_absent() {
        let store = store("malformed");
        tokio::fs::write(
            store.path.clone(),
            "{definitely not json",
        )
        .await
        .unwrap();
        assert_eq!(store.load().await, None);
        store.clear().await.unwrap();
    }
}
