//! Error types for chat session operations
//!
//! Every failure a session operation can hit is reported to the caller through
//! [`SessionError`]. Nothing is fatal to the process: the session stays usable and a
//! later operation may trigger another reconnect.

use crate::protocol::topics::TopicError;
use crate::session::state::ConnectionState;
use crate::transport::TransportError;
use thiserror::Error;

/// Main error type for messaging session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Connection error: {0}")]
    ConnectionError(#[source] TransportError),

    #[error("Subscribe to '{topic}' failed: {source}")]
    SubscribeError {
        topic: String,
        #[source]
        source: TransportError,
    },

    #[error("Publish to '{topic}' failed: {source}")]
    PublishError {
        topic: String,
        #[source]
        source: TransportError,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Not connected after {attempts} reconnect attempt(s) - current state: {state:?}")]
    NotConnected {
        state: ConnectionState,
        attempts: u32,
    },

    #[error("Invalid topic: {0}")]
    InvalidTopic(#[from] TopicError),
}

impl SessionError {
    /// Create a publish error for the given topic
    pub fn publish_failed<S: Into<String>>(topic: S, source: TransportError) -> Self {
        Self::PublishError {
            topic: topic.into(),
            source,
        }
    }

    /// Create a subscribe error for the given topic
    pub fn subscribe_failed<S: Into<String>>(topic: S, source: TransportError) -> Self {
        Self::SubscribeError {
            topic: topic.into(),
            source,
        }
    }

    /// True when the message never reached the transport and the caller may try again
    /// later, e.g. after connectivity returns.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SessionError::ConnectionError(_)
                | SessionError::NotConnected { .. }
                | SessionError::PublishError { .. }
        )
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_failed_constructor() {
        let error = SessionError::publish_failed("chat/1", TransportError::NotConnected);
        assert!(matches!(error, SessionError::PublishError { .. }));
        assert_eq!(
            error.to_string(),
            "Publish to 'chat/1' failed: Transport not connected"
        );
    }

    #[test]
    fn test_subscribe_failed_constructor() {
        let error = SessionError::subscribe_failed(
            "chat/#",
            TransportError::SubscriptionFailed("broker rejected".into()),
        );
        assert!(matches!(error, SessionError::SubscribeError { .. }));
        assert!(error.to_string().contains("chat/#"));
        assert!(error.to_string().contains("broker rejected"));
    }

    #[test]
    fn test_not_connected_display() {
        let error = SessionError::NotConnected {
            state: ConnectionState::Disconnected,
            attempts: 1,
        };
        let message = error.to_string();
        assert!(message.contains("1 reconnect attempt"));
        assert!(message.contains("Disconnected"));
    }

    #[test]
    fn test_serialization_error_from() {
        let json_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error: SessionError = json_error.into();
        assert!(matches!(error, SessionError::SerializationError(_)));
        assert!(!error.is_transient());
    }

    #[test]
    fn test_invalid_topic_from() {
        let error: SessionError = TopicError::Empty.into();
        assert!(matches!(error, SessionError::InvalidTopic(_)));
        assert!(!error.is_transient());
    }

    #[test]
    fn test_transient_classification() {
        assert!(SessionError::ConnectionError(TransportError::NotConnected).is_transient());
        assert!(SessionError::NotConnected {
            state: ConnectionState::Connecting,
            attempts: 0
        }
        .is_transient());
        assert!(SessionError::publish_failed("t", TransportError::NotConnected).is_transient());
        assert!(
            !SessionError::subscribe_failed("t", TransportError::NotConnected).is_transient()
        );
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error as _;

        let error = SessionError::publish_failed(
            "chat/1",
            TransportError::PublishFailed("queue closed".into()),
        );
        let source = error.source().expect("publish error should carry a source");
        assert!(source.to_string().contains("queue closed"));
    }
}
