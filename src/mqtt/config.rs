use super::error::ConfigError;

/// Broker connection settings as submitted through the connection form or
/// restored from the settings store. Immutable once a connection attempt
/// starts; a new submission supersedes the whole value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// Websocket path on the broker, e.g. `/ws`.
    pub path: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    /// Whether the settings should be written to the settings store on
    /// connect (`false` clears any previously stored value).
    pub persist: bool,
}

impl BrokerConfig {
    /// Validates and normalizes form input. Empty credentials become `None`
    /// so that no blank username/password pair is ever sent to a broker, and
    /// an empty websocket path falls back to `/ws`.
    pub fn new(
        host: &str,
        port: u16,
        path: &str,
        username: &str,
        password: &str,
        use_tls: bool,
        persist: bool,
    ) -> Result<Self, ConfigError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        let path = match path.trim() {
            "" => "/ws".to_string(),
            p => p.to_string(),
        };

        Ok(Self {
            host: host.to_string(),
            port,
            path,
            username: non_empty(username),
            password: non_empty(password),
            use_tls,
            persist,
        })
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_host() {
        let result = BrokerConfig::new("  ", 9001, "/ws", "", "", false, false);
        assert_eq!(result.unwrap_err(), ConfigError::EmptyHost);
    }

    #[test]
    fn rejects_port_zero() {
        let result = BrokerConfig::new("broker.local", 0, "/ws", "", "", false, false);
        assert_eq!(result.unwrap_err(), ConfigError::InvalidPort);
    }

    #[test]
    fn empty_credentials_become_none() {
        let config = BrokerConfig::new("broker.local", 9001, "", "  ", "", true, true).unwrap();
        assert_eq!(config.username, None);
        assert_eq!(config.password, None);
        assert_eq!(config.path, "/ws");
        assert!(config.use_tls);
        assert!(config.persist);
    }

    #[test]
    fn keeps_explicit_values() {
        let config =
            BrokerConfig::new("broker.local", 8883, "/mqtt", "user", "secret", false, false)
                .unwrap();
        assert_eq!(config.host, "broker.local");
        assert_eq!(config.port, 8883);
        assert_eq!(config.path, "/mqtt");
        assert_eq!(config.username.as_deref(), Some("user"));
        assert_eq!(config.password.as_deref(), Some("secret"));
    }
}
