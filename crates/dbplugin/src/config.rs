//! Connection configuration for database plugins
//!
//! The plugin host hands `initialize` an untyped map. [`ConnectionConfig`] is
//! its typed form; [`ConnectionConfig::settings`] validates it, fills in the
//! pool defaults and renders the connection URL into a DSN.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::sanitize::SecretValues;
use crate::template::{Placeholder, Placeholders};

/// Default maximum number of open connections
pub const DEFAULT_MAX_OPEN_CONNECTIONS: u32 = 4;

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("{field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Missing required configuration
    #[error("{field} cannot be empty")]
    MissingRequired { field: String },

    /// The configuration map could not be decoded
    #[error("malformed configuration: {0}")]
    Malformed(String),
}

impl ConfigError {
    pub(crate) fn redact(self, secrets: &SecretValues) -> Self {
        match self {
            Self::InvalidValue { field, reason } => Self::InvalidValue {
                field,
                reason: secrets.apply(&reason),
            },
            Self::Malformed(message) => Self::Malformed(secrets.apply(&message)),
            other @ Self::MissingRequired { .. } => other,
        }
    }
}

/// Admin connection configuration as supplied by the plugin host.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Connection URL; may contain `{{username}}` and `{{password}}`
    #[serde(default)]
    pub connection_url: String,

    /// Admin username substituted into the URL
    #[serde(default)]
    pub username: Option<String>,

    /// Admin password substituted into the URL
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub password: Option<SecretString>,

    /// Maximum open connections (`0` or absent means the default of 4)
    #[serde(default)]
    pub max_open_connections: Option<u32>,

    /// Maximum idle connections (absent or `0` means `max_open_connections`)
    #[serde(default)]
    pub max_idle_connections: Option<u32>,

    /// Maximum lifetime of a pooled connection, e.g. `"30m"` (absent means no limit)
    #[serde(default, with = "humantime_serde")]
    pub max_connection_lifetime: Option<Duration>,
}

/// Validated, normalised settings handed to a [`Connector`](crate::Connector).
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Connection URL with credentials substituted
    pub dsn: SecretString,
    pub max_open_connections: u32,
    pub max_idle_connections: u32,
    /// `Duration::ZERO` means connections are never recycled for age
    pub max_connection_lifetime: Duration,
}

impl ConnectionConfig {
    /// Decode the host's configuration map.
    pub fn from_value(raw: &serde_json::Value) -> Result<Self, ConfigError> {
        if !raw.is_object() {
            return Err(ConfigError::Malformed(
                "configuration must be a map".into(),
            ));
        }
        serde_json::from_value(raw.clone()).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    /// Validate the configuration and resolve pool defaults.
    pub fn settings(&self) -> Result<ConnectionSettings, ConfigError> {
        if self.connection_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "connection_url".into(),
            });
        }

        let max_open_connections = match self.max_open_connections {
            None | Some(0) => DEFAULT_MAX_OPEN_CONNECTIONS,
            Some(n) => n,
        };
        let max_idle_connections = match self.max_idle_connections {
            None | Some(0) => max_open_connections,
            Some(n) => n.min(max_open_connections),
        };

        let mut placeholders = Placeholders::new();
        if let Some(username) = &self.username {
            placeholders = placeholders.with(Placeholder::Username, username.clone());
        }
        if let Some(password) = &self.password {
            placeholders =
                placeholders.with(Placeholder::Password, password.expose_secret().to_owned());
        }
        let dsn = placeholders.substitute(&self.connection_url);

        Ok(ConnectionSettings {
            dsn: SecretString::from(dsn),
            max_open_connections,
            max_idle_connections,
            max_connection_lifetime: self.max_connection_lifetime.unwrap_or(Duration::ZERO),
        })
    }

    /// The admin password, if one was configured.
    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(|p| p.expose_secret())
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(|value| value.map(SecretString::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_connection_url() {
        let config = ConnectionConfig::from_value(&json!({ "username": "sa" })).unwrap();
        let err = config.settings().unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref field } if field == "connection_url"));
    }

    #[test]
    fn test_non_map_is_malformed() {
        let err = ConnectionConfig::from_value(&json!("sqlserver://")).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed(_)));
    }

    #[test]
    fn test_bad_lifetime_is_malformed() {
        let err = ConnectionConfig::from_value(&json!({
            "connection_url": "sqlserver://db:1433",
            "max_connection_lifetime": "forever",
        }))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Malformed(_)));
    }

    #[test]
    fn test_pool_defaults() {
        let config =
            ConnectionConfig::from_value(&json!({ "connection_url": "sqlserver://db:1433" }))
                .unwrap();
        let settings = config.settings().unwrap();
        assert_eq!(settings.max_open_connections, DEFAULT_MAX_OPEN_CONNECTIONS);
        assert_eq!(settings.max_idle_connections, DEFAULT_MAX_OPEN_CONNECTIONS);
        assert_eq!(settings.max_connection_lifetime, Duration::ZERO);
    }

    #[test]
    fn test_idle_capped_to_open() {
        let config = ConnectionConfig::from_value(&json!({
            "connection_url": "sqlserver://db:1433",
            "max_open_connections": 2,
            "max_idle_connections": 10,
            "max_connection_lifetime": "30m",
        }))
        .unwrap();
        let settings = config.settings().unwrap();
        assert_eq!(settings.max_open_connections, 2);
        assert_eq!(settings.max_idle_connections, 2);
        assert_eq!(settings.max_connection_lifetime, Duration::from_secs(30 * 60));
    }

    #[test]
    fn test_dsn_substitutes_credentials() {
        let config = ConnectionConfig::from_value(&json!({
            "connection_url": "sqlserver://{{username}}:{{password}}@db:1433",
            "username": "sa",
            "password": "Adm1n!",
        }))
        .unwrap();
        let settings = config.settings().unwrap();
        assert_eq!(settings.dsn.expose_secret(), "sqlserver://sa:Adm1n!@db:1433");
        assert_eq!(config.password(), Some("Adm1n!"));
    }

    #[test]
    fn test_debug_does_not_print_password() {
        let config = ConnectionConfig::from_value(&json!({
            "connection_url": "sqlserver://db:1433",
            "password": "Adm1n!",
        }))
        .unwrap();
        assert!(!format!("{config:?}").contains("Adm1n!"));
    }
}
