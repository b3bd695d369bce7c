//! Chat message envelope
//!
//! The wire payload is a UTF-8 JSON object with exactly three string fields:
//! `message`, `sender` and `timestamp`. Unknown fields on receipt are ignored.

use crate::session::dedup::Fingerprint;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Outbound/inbound chat envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message: String,
    pub sender: String,
    pub timestamp: String,
}

impl ChatMessage {
    pub fn new(
        message: impl Into<String>,
        sender: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            sender: sender.into(),
            timestamp: timestamp.into(),
        }
    }

    /// Build an envelope stamped with the current UTC time (RFC 3339, second precision)
    pub fn now(message: impl Into<String>, sender: impl Into<String>) -> Self {
        Self::new(
            message,
            sender,
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        )
    }

    /// Serialize to the JSON wire format
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse from the JSON wire format
    pub fn from_bytes(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// A newly seen message handed to the application
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub message: ChatMessage,
    pub fingerprint: Fingerprint,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_envelope_has_exactly_three_fields() {
        let message = ChatMessage::new("hello", "a@b.com", "2024-01-01T00:00:00Z");
        let bytes = message.to_bytes().unwrap();

        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            value,
            json!({
                "message": "hello",
                "sender": "a@b.com",
                "timestamp": "2024-01-01T00:00:00Z"
            })
        );
        assert_eq!(value.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let payload = br#"{"message":"hi","sender":"x@y.z","timestamp":"t","avatar":"p.png"}"#;
        let message = ChatMessage::from_bytes(payload).unwrap();
        assert_eq!(message, ChatMessage::new("hi", "x@y.z", "t"));
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let payload = br#"{"message":"hi","sender":"x@y.z"}"#;
        assert!(ChatMessage::from_bytes(payload).is_err());
    }

    #[test]
    fn test_non_json_is_rejected() {
        assert!(ChatMessage::from_bytes(b"plain text").is_err());
    }

    #[test]
    fn test_unicode_content_survives() {
        let message = ChatMessage::new("¿Cómo estás? 👋", "ñandú@example.cl", "t");
        let bytes = message.to_bytes().unwrap();
        assert!(std::str::from_utf8(&bytes).is_ok());
        assert_eq!(ChatMessage::from_bytes(&bytes).unwrap(), message);
    }

    #[test]
    fn test_now_uses_utc_rfc3339() {
        let message = ChatMessage::now("hello", "a@b.com");
        assert!(message.timestamp.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&message.timestamp).is_ok());
    }
}
