//! chatlink - managed MQTT chat sessions
//!
//! A client-side messaging session that keeps one logical connection to an MQTT
//! broker across transient network failures, delivers each inbound chat message to
//! the application at most once, and publishes chat envelopes with a bounded
//! reconnect-then-retry policy.
//!
//! # Overview
//!
//! - [`session::MessagingSession`] owns the connection state, subscriptions and the
//!   deduplication cache behind a single lock
//! - [`transport::Transport`] is the broker seam; [`transport::mqtt::MqttTransport`]
//!   implements it on top of rumqttc
//! - [`protocol::ChatMessage`] is the JSON wire envelope
//!
//! # Quick Start
//!
//! ```rust
//! use chatlink::protocol::ChatMessage;
//!
//! let message = ChatMessage::new("hello", "a@b.com", "2024-01-01T00:00:00Z");
//! let bytes = message.to_bytes().unwrap();
//! assert_eq!(ChatMessage::from_bytes(&bytes).unwrap(), message);
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod session;
pub mod testing;
pub mod transport;

pub use config::*;
pub use error::{SessionError, SessionResult};
pub use protocol::*;
pub use session::{
    ConnectOutcome, ConnectionState, MessageDisposition, MessagingSession, PublishReport,
    SessionSettings, SubscribeOutcome,
};
pub use transport::mqtt::MqttTransport;
pub use transport::{ConnectOptions, Transport, TransportError, TransportEvent};
