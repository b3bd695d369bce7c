//! MQTT transport built on rumqttc
//!
//! The module separates pure functions from I/O:
//!
//! - [`connection`] - Broker URL parsing and rumqttc option building
//! - [`message_handler`] - Pure routing of rumqttc events
//! - [`client`] - The [`MqttTransport`] event loop and client handle
//!
//! # Usage
//!
//! ```rust,no_run
//! use chatlink::config::ChatlinkConfig;
//! use chatlink::{MessagingSession, MqttTransport};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = ChatlinkConfig::default();
//! let session = MessagingSession::new(config.session_settings()?, Arc::new(MqttTransport::new()));
//! session.connect().await?;
//! session.subscribe("chat/1").await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::MqttTransport;
pub use connection::{configure_mqtt_options, parse_broker_url};
pub use message_handler::{EventRoute, MessageHandler};
