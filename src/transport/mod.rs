//! Transport layer for broker communication
//!
//! This module provides the transport abstraction the messaging session drives,
//! and the MQTT implementation used in production.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod mqtt;

pub use rumqttc::QoS;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Transport-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] BoxError),
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(#[source] BoxError),
    #[error("Publishing failed: {0}")]
    PublishFailed(#[source] BoxError),
    #[error("Disconnect failed: {0}")]
    DisconnectFailed(#[source] BoxError),
    #[error("Transport not connected")]
    NotConnected,
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
}

/// Notifications the transport raises on its own task
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A publish arrived on a subscribed topic
    MessageArrived { topic: String, payload: Vec<u8> },
    /// An established connection dropped without being asked to
    ConnectionLost { cause: String },
    /// The broker acknowledged one of our publishes
    DeliveryComplete { packet_id: u16 },
}

/// Broker credentials
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Everything a transport needs to open a session with the broker
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    pub client_id: String,
    pub host: String,
    pub port: u16,
    /// false => broker keeps subscriptions and queued messages across reconnects
    pub clean_session: bool,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub credentials: Option<Credentials>,
}

impl ConnectOptions {
    /// Broker address in `host:port` form, for logging
    pub fn broker_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Transport trait for broker communication
///
/// Implementations use interior mutability: the session shares one transport
/// between application calls and its event pump.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a connection with the given options, returning once the broker accepted it
    async fn connect(&self, options: &ConnectOptions) -> Result<(), TransportError>;

    /// Close the current connection gracefully
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Subscribe to a topic filter
    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError>;

    /// Publish raw bytes to a topic
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS)
        -> Result<(), TransportError>;

    /// Check if the underlying link is currently up
    fn is_connected(&self) -> bool;

    /// Register the channel that receives [`TransportEvent`]s
    fn set_event_sender(&self, sender: mpsc::Sender<TransportEvent>);
}
