//! Configuration for chatlink sessions
//!
//! Loaded from a TOML file with `[session]`, `[retry]` and `[dedup]` sections.
//! Every field has a default, so an empty file is a valid configuration.

use crate::session::dedup::{DEFAULT_DEDUP_CAPACITY, DEFAULT_DEDUP_WINDOW};
use crate::session::{RetryPolicy, SessionSettings};
use crate::transport::mqtt::parse_broker_url;
use crate::transport::{ConnectOptions, Credentials, QoS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatlinkConfig {
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub dedup: DedupSection,
}

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    /// Broker URL, `tcp://host:port` or `mqtt://host:port`
    #[serde(default = "default_broker_url")]
    pub broker_url: String,
    /// Client identifier (must match [a-zA-Z0-9._-]+); generated when absent
    #[serde(default)]
    pub client_id: Option<String>,
    /// false => broker keeps subscriptions and queued messages across reconnects
    #[serde(default)]
    pub clean_session: bool,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Environment variable containing username
    #[serde(default)]
    pub username_env: Option<String>,
    /// Environment variable containing password
    #[serde(default)]
    pub password_env: Option<String>,
    /// Delivery QoS for publish and subscribe (0, 1 or 2)
    #[serde(default = "default_qos")]
    pub qos: u8,
}

fn default_broker_url() -> String {
    "tcp://broker.hivemq.com:1883".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_keep_alive() -> u64 {
    60
}

fn default_qos() -> u8 {
    1
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            broker_url: default_broker_url(),
            client_id: None,
            clean_session: false,
            connect_timeout_secs: default_connect_timeout(),
            keep_alive_secs: default_keep_alive(),
            username_env: None,
            password_env: None,
            qos: default_qos(),
        }
    }
}

/// Duplicate suppression bounds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DedupSection {
    #[serde(default = "default_dedup_capacity")]
    pub capacity: usize,
    #[serde(default = "default_dedup_window")]
    pub window_secs: u64,
}

fn default_dedup_capacity() -> usize {
    DEFAULT_DEDUP_CAPACITY
}

fn default_dedup_window() -> u64 {
    DEFAULT_DEDUP_WINDOW.as_secs()
}

impl Default for DedupSection {
    fn default() -> Self {
        Self {
            capacity: default_dedup_capacity(),
            window_secs: default_dedup_window(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to render TOML: {0}")]
    TomlRender(#[from] toml::ser::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid client ID format: {0}")]
    InvalidClientId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ChatlinkConfig {
    /// Load configuration from a TOML file
    ///
    /// A missing client id is generated here, once, so every reconnect of a
    /// persistent session presents the same identity.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse, fill in the client id and validate
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: ChatlinkConfig = toml::from_str(content)?;
        config.ensure_client_id();
        config.validate()?;
        Ok(config)
    }

    /// Defaults with a freshly generated client id
    pub fn with_generated_client_id() -> Self {
        let mut config = Self::default();
        config.ensure_client_id();
        config
    }

    fn ensure_client_id(&mut self) {
        if self.session.client_id.is_none() {
            self.session.client_id = Some(generate_client_id());
        }
    }

    /// Check every field that would otherwise fail at connect time
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_broker_url(&self.session.broker_url)
            .map_err(|_| ConfigError::InvalidBrokerUrl(self.session.broker_url.clone()))?;

        if let Some(client_id) = &self.session.client_id {
            validate_client_id(client_id)?;
        }
        if self.session.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "connect_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.session.keep_alive_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "keep_alive_secs must be greater than 0".to_string(),
            ));
        }
        qos_from_level(self.session.qos)?;
        if self.dedup.capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "dedup capacity must be greater than 0".to_string(),
            ));
        }
        if self.dedup.window_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "dedup window_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Helper method to get environment variable with consistent error handling
    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }

    /// Get broker username from environment variable
    pub fn get_username(&self) -> Option<String> {
        Self::get_env_var_optional(self.session.username_env.as_ref())
    }

    /// Get broker password from environment variable
    pub fn get_password(&self) -> Option<String> {
        Self::get_env_var_optional(self.session.password_env.as_ref())
    }

    /// A configured but unset username variable is an error. An unset password
    /// variable means an empty password.
    fn credentials(&self) -> Result<Option<Credentials>, ConfigError> {
        let Some(username) = self.get_username() else {
            if let Some(name) = &self.session.username_env {
                return Err(ConfigError::EnvVarNotFound(name.clone()));
            }
            return Ok(None);
        };
        Ok(Some(Credentials {
            username,
            password: self.get_password().unwrap_or_default(),
        }))
    }

    /// Transport options for this configuration
    pub fn connect_options(&self) -> Result<ConnectOptions, ConfigError> {
        let (host, port) = parse_broker_url(&self.session.broker_url)
            .map_err(|_| ConfigError::InvalidBrokerUrl(self.session.broker_url.clone()))?;
        let client_id = self
            .session
            .client_id
            .clone()
            .unwrap_or_else(generate_client_id);

        Ok(ConnectOptions {
            client_id,
            host,
            port,
            clean_session: self.session.clean_session,
            keep_alive: Duration::from_secs(self.session.keep_alive_secs),
            connect_timeout: Duration::from_secs(self.session.connect_timeout_secs),
            credentials: self.credentials()?,
        })
    }

    /// Everything a [`crate::MessagingSession`] needs
    pub fn session_settings(&self) -> Result<SessionSettings, ConfigError> {
        Ok(SessionSettings {
            options: self.connect_options()?,
            qos: qos_from_level(self.session.qos)?,
            retry: self.retry.clone(),
            dedup_capacity: self.dedup.capacity,
            dedup_window: Duration::from_secs(self.dedup.window_secs),
        })
    }

    /// Render as TOML, e.g. for `chatlink config --show`
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// `chatlink-` followed by the first 12 hex digits of a v4 UUID
pub fn generate_client_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("chatlink-{}", &uuid[..12])
}

/// Validate client ID format
fn validate_client_id(client_id: &str) -> Result<(), ConfigError> {
    let valid_chars = client_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if client_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidClientId(format!(
            "Client ID '{client_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}

fn qos_from_level(level: u8) -> Result<QoS, ConfigError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(ConfigError::InvalidConfig(format!(
            "qos must be 0, 1 or 2, got {other}"
        ))),
    }
}
