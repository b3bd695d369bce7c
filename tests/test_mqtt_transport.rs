//! MQTT transport behavior without a running broker
//!
//! A broker-free subset: connect failures must surface within the timeout, and
//! operations on a transport that never connected must fail fast or be no-ops.

use chatlink::testing::{test_connect_options, test_settings};
use chatlink::transport::QoS;
use chatlink::{
    ConnectionState, MessagingSession, MqttTransport, SessionError, Transport, TransportError,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

#[tokio::test]
async fn test_connect_to_closed_port_fails_within_timeout() {
    let transport = MqttTransport::new();
    let mut options = test_connect_options();
    options.host = "127.0.0.1".to_string();
    options.port = 1;
    options.connect_timeout = Duration::from_secs(1);

    let start = Instant::now();
    let result = timeout(Duration::from_secs(5), transport.connect(&options))
        .await
        .expect("connect should give up on its own");

    assert!(result.is_err());
    assert!(start.elapsed() < Duration::from_secs(3));
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_publish_without_connect_is_rejected() {
    let transport = MqttTransport::new();

    let result = transport
        .publish("chat/1", b"{}".to_vec(), QoS::AtLeastOnce)
        .await;

    assert!(matches!(result, Err(TransportError::NotConnected)));
}

#[tokio::test]
async fn test_subscribe_without_connect_is_rejected() {
    let transport = MqttTransport::new();

    let result = transport
        .subscribe("chat/1", QoS::AtLeastOnce)
        .await;

    assert!(matches!(result, Err(TransportError::NotConnected)));
}

#[tokio::test]
async fn test_disconnect_without_connect_is_ok() {
    let transport = MqttTransport::new();
    assert!(transport.disconnect().await.is_ok());
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_session_over_unreachable_broker_stays_disconnected() {
    let mut settings = test_settings();
    settings.options.host = "127.0.0.1".to_string();
    settings.options.port = 1;
    settings.options.connect_timeout = Duration::from_secs(1);
    let session = MessagingSession::new(settings, Arc::new(MqttTransport::new()));

    assert!(session.connect().await.is_err());
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);

    let result = session.publish("chat/1", "hi", "a@b.com", "t").await;
    assert!(matches!(
        result,
        Err(SessionError::NotConnected { attempts: 1, .. })
    ));
}
