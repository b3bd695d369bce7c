//! Testing utilities and mock implementations
//!
//! Lets sessions be exercised without a running MQTT broker.

pub mod mocks;

pub use mocks::*;

use crate::protocol::ChatMessage;
use crate::session::SessionSettings;
use crate::transport::ConnectOptions;
use std::time::Duration;

/// Connect options pointing at a local broker with short timeouts
pub fn test_connect_options() -> ConnectOptions {
    ConnectOptions {
        client_id: "chatlink-test".to_string(),
        host: "localhost".to_string(),
        port: 1883,
        clean_session: false,
        keep_alive: Duration::from_secs(60),
        connect_timeout: Duration::from_secs(2),
        credentials: None,
    }
}

/// Session settings built on [`test_connect_options`]
pub fn test_settings() -> SessionSettings {
    SessionSettings::new(test_connect_options())
}

/// Serialized chat envelope, as it would arrive from the broker
pub fn chat_payload(message: &str, sender: &str, timestamp: &str) -> Vec<u8> {
    ChatMessage::new(message, sender, timestamp)
        .to_bytes()
        .unwrap_or_default()
}
