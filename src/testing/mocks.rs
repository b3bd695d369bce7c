//! Mock implementations for testing
//!
//! [`MockTransport`] records every call, can be scripted to fail, and can raise
//! transport notifications (message arrival, connection loss) on demand.

use crate::transport::{ConnectOptions, QoS, Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

pub type PublishedMessage = (String, Vec<u8>);

/// Mock transport for testing
#[derive(Debug, Default)]
pub struct MockTransport {
    pub published_messages: Arc<Mutex<Vec<PublishedMessage>>>,
    pub subscribed_topics: Arc<Mutex<Vec<String>>>,
    connected: AtomicBool,
    connect_calls: AtomicU32,
    disconnect_calls: AtomicU32,
    subscribe_calls: AtomicU32,
    publish_calls: AtomicU32,
    connects_in_flight: AtomicU32,
    max_concurrent_connects: AtomicU32,
    connect_failures_remaining: AtomicU32,
    fail_all_connects: AtomicBool,
    publish_failure: AtomicBool,
    subscribe_failure: AtomicBool,
    disconnect_failure: AtomicBool,
    connect_delay_ms: AtomicU64,
    subscribe_delay_ms: AtomicU64,
    event_sender: std::sync::Mutex<Option<mpsc::Sender<TransportEvent>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` connect calls fail
    pub fn fail_next_connects(&self, count: u32) {
        self.connect_failures_remaining
            .store(count, Ordering::SeqCst);
    }

    /// Make every connect call fail until switched off
    pub fn set_fail_all_connects(&self, fail: bool) {
        self.fail_all_connects.store(fail, Ordering::SeqCst);
    }

    pub fn set_publish_failure(&self, fail: bool) {
        self.publish_failure.store(fail, Ordering::SeqCst);
    }

    pub fn set_subscribe_failure(&self, fail: bool) {
        self.subscribe_failure.store(fail, Ordering::SeqCst);
    }

    pub fn set_disconnect_failure(&self, fail: bool) {
        self.disconnect_failure.store(fail, Ordering::SeqCst);
    }

    /// Delay every connect call, to hold a session in Connecting
    pub fn set_connect_delay(&self, delay: Duration) {
        self.connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Delay every subscribe call after it has been counted
    pub fn set_subscribe_delay(&self, delay: Duration) {
        self.subscribe_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn subscribe_calls(&self) -> u32 {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn publish_calls(&self) -> u32 {
        self.publish_calls.load(Ordering::SeqCst)
    }

    /// Highest number of connect calls that were running at the same time
    pub fn max_concurrent_connects(&self) -> u32 {
        self.max_concurrent_connects.load(Ordering::SeqCst)
    }

    pub async fn get_published_messages(&self) -> Vec<PublishedMessage> {
        self.published_messages.lock().await.clone()
    }

    pub async fn get_subscribed_topics(&self) -> Vec<String> {
        self.subscribed_topics.lock().await.clone()
    }

    pub async fn clear_history(&self) {
        self.published_messages.lock().await.clear();
        self.subscribed_topics.lock().await.clear();
    }

    /// Take the link down without notifying anyone
    pub fn sever_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Take the link down and report it, as a broker drop would
    pub async fn drop_connection(&self, cause: &str) -> bool {
        self.connected.store(false, Ordering::SeqCst);
        self.emit(TransportEvent::ConnectionLost {
            cause: cause.to_string(),
        })
        .await
    }

    /// Deliver a payload as if the broker had sent it
    pub async fn inject_message(&self, topic: &str, payload: impl Into<Vec<u8>>) -> bool {
        self.emit(TransportEvent::MessageArrived {
            topic: topic.to_string(),
            payload: payload.into(),
        })
        .await
    }

    /// Send an event to the registered sender; false if none is registered
    pub async fn emit(&self, event: TransportEvent) -> bool {
        let sender = match self.event_sender.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    fn take_connect_failure(&self) -> bool {
        self.fail_all_connects.load(Ordering::SeqCst)
            || self
                .connect_failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _options: &ConnectOptions) -> Result<(), TransportError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.connects_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_connects
            .fetch_max(in_flight, Ordering::SeqCst);

        let delay = self.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let result = if self.take_connect_failure() {
            Err(TransportError::ConnectionFailed(
                "Mock connection failure".into(),
            ))
        } else {
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        };

        self.connects_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        if self.disconnect_failure.load(Ordering::SeqCst) {
            return Err(TransportError::DisconnectFailed(
                "Mock disconnect failure".into(),
            ));
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, _qos: QoS) -> Result<(), TransportError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.subscribe_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.subscribe_failure.load(Ordering::SeqCst) {
            return Err(TransportError::SubscriptionFailed(
                "Mock subscribe failure".into(),
            ));
        }
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.subscribed_topics.lock().await.push(topic.to_string());
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        _qos: QoS,
    ) -> Result<(), TransportError> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        if self.publish_failure.load(Ordering::SeqCst) {
            return Err(TransportError::PublishFailed("Mock publish failure".into()));
        }
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.published_messages
            .lock()
            .await
            .push((topic.to_string(), payload));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set_event_sender(&self, sender: mpsc::Sender<TransportEvent>) {
        match self.event_sender.lock() {
            Ok(mut slot) => *slot = Some(sender),
            Err(poisoned) => *poisoned.into_inner() = Some(sender),
        }
    }
}
