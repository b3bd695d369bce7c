//! Impure I/O operations for the MQTT transport
//!
//! Each connect creates a fresh rumqttc client and event loop. The loop stops on the
//! first network error and never reconnects on its own; the messaging session decides
//! when to try again. A subscribe call returns once the broker has answered it with
//! a SubAck, so a rejected topic surfaces as an error from that call.

use super::connection::configure_mqtt_options;
use super::message_handler::{EventRoute, MessageHandler};
use crate::transport::{ConnectOptions, QoS, Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, SubscribeReasonCode};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of the rumqttc request channel
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// How long disconnect waits for the event loop to flush the Disconnect packet
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

type SharedEventSender = Arc<std::sync::Mutex<Option<mpsc::Sender<TransportEvent>>>>;
type SubAckSender = oneshot::Sender<Result<(), TransportError>>;
type SharedSubAckTracker = Arc<std::sync::Mutex<SubAckTracker>>;

/// Matches SubAcks to the subscribe calls waiting on them
///
/// rumqttc assigns the packet id only when the request leaves, so a waiter sits in
/// `queued` until its Subscribe packet is seen going out and then moves to `sent`.
#[derive(Default)]
struct SubAckTracker {
    queued: VecDeque<(String, SubAckSender)>,
    sent: HashMap<u16, (String, SubAckSender)>,
}

impl SubAckTracker {
    fn queue(&mut self, topic: &str) -> oneshot::Receiver<Result<(), TransportError>> {
        let (tx, rx) = oneshot::channel();
        self.queued.push_back((topic.to_string(), tx));
        rx
    }

    /// Take back the newest waiter when its request never reached rumqttc
    fn unqueue_last(&mut self) {
        self.queued.pop_back();
    }

    fn sent(&mut self, packet_id: u16) {
        match self.queued.pop_front() {
            Some(waiter) => {
                self.sent.insert(packet_id, waiter);
            }
            None => debug!(target: "mqtt_transport", packet_id, "Subscribe sent with no waiter"),
        }
    }

    fn acknowledged(&mut self, packet_id: u16, return_codes: &[SubscribeReasonCode]) {
        let Some((topic, waiter)) = self.sent.remove(&packet_id) else {
            debug!(target: "mqtt_transport", packet_id, "SubAck for an unknown packet");
            return;
        };
        let result = MessageHandler::validate_subscription_success(return_codes).map_err(|reason| {
            error!(target: "mqtt_transport", packet_id, topic = %topic, "{}", reason);
            TransportError::SubscriptionFailed(format!("{topic}: {reason}").into())
        });
        if result.is_ok() {
            debug!(target: "mqtt_transport", packet_id, topic = %topic, "Subscription confirmed");
        }
        // The caller may have given up waiting
        let _ = waiter.send(result);
    }

    /// Drop every waiter; their receivers see the channel close
    fn clear(&mut self) {
        self.queued.clear();
        self.sent.clear();
    }
}

fn lock_tracker(tracker: &SharedSubAckTracker) -> std::sync::MutexGuard<'_, SubAckTracker> {
    match tracker.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Progress of one connection's handshake
#[derive(Debug, Clone, PartialEq)]
enum LinkStatus {
    Connecting,
    Connected,
    Failed(String),
}

/// State shared between the transport and one event loop task
#[derive(Clone)]
struct LoopContext {
    generation: u64,
    current_generation: Arc<AtomicU64>,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    event_sender: SharedEventSender,
    suback_tracker: SharedSubAckTracker,
}

impl LoopContext {
    fn is_current(&self) -> bool {
        self.current_generation.load(Ordering::SeqCst) == self.generation
    }

    async fn emit(&self, event: TransportEvent) {
        let sender = match self.event_sender.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        match sender {
            Some(sender) => {
                if sender.send(event).await.is_err() {
                    debug!(target: "mqtt_transport", "Event receiver dropped");
                }
            }
            None => debug!(target: "mqtt_transport", "No event sender registered, dropping {:?}", event),
        }
    }

    /// Report loss of an established link, unless we are closing it ourselves
    async fn link_lost(&self, cause: String) {
        if !self.is_current() {
            return;
        }
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        if was_connected && !self.closing.load(Ordering::SeqCst) {
            warn!(target: "mqtt_transport", cause = %cause, "MQTT connection lost");
            self.emit(TransportEvent::ConnectionLost { cause }).await;
        }
    }
}

/// rumqttc-backed [`Transport`]
pub struct MqttTransport {
    client: Mutex<Option<AsyncClient>>,
    event_loop_handle: Mutex<Option<JoinHandle<()>>>,
    generation: Arc<AtomicU64>,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    event_sender: SharedEventSender,
    suback_tracker: SharedSubAckTracker,
    suback_timeout_ms: AtomicU64,
}

impl Default for MqttTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MqttTransport {
    pub fn new() -> Self {
        Self {
            client: Mutex::new(None),
            event_loop_handle: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
            connected: Arc::new(AtomicBool::new(false)),
            closing: Arc::new(AtomicBool::new(false)),
            event_sender: Arc::new(std::sync::Mutex::new(None)),
            suback_tracker: Arc::new(std::sync::Mutex::new(SubAckTracker::default())),
            suback_timeout_ms: AtomicU64::new(10_000),
        }
    }

    /// Wait for connection confirmation (ConnAck) with timeout
    async fn wait_for_connection_confirmation(
        mut link_rx: watch::Receiver<LinkStatus>,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let timeout_result = tokio::time::timeout(timeout, async {
            loop {
                match &*link_rx.borrow_and_update() {
                    LinkStatus::Connected => return Ok(()),
                    LinkStatus::Failed(reason) => {
                        return Err(TransportError::ConnectionFailed(reason.clone().into()));
                    }
                    LinkStatus::Connecting => {}
                }
                if link_rx.changed().await.is_err() {
                    return Err(TransportError::ConnectionFailed(
                        "Event loop stopped before ConnAck".into(),
                    ));
                }
            }
        })
        .await;

        match timeout_result {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }

    async fn run_event_loop(
        mut event_loop: EventLoop,
        context: LoopContext,
        link_tx: watch::Sender<LinkStatus>,
    ) {
        debug!(target: "mqtt_transport", generation = context.generation, "MQTT event loop started");

        loop {
            match event_loop.poll().await {
                Ok(event) => match MessageHandler::route_mqtt_event(&event) {
                    EventRoute::ConnectionAcknowledged { session_present } => {
                        if context.is_current() {
                            context.connected.store(true, Ordering::SeqCst);
                        }
                        link_tx.send_replace(LinkStatus::Connected);
                        info!(target: "mqtt_transport", session_present, "MQTT ConnAck received");
                    }
                    EventRoute::SubscribeSent { packet_id } => {
                        if context.is_current() {
                            lock_tracker(&context.suback_tracker).sent(packet_id);
                        }
                    }
                    EventRoute::SubscriptionConfirmed {
                        packet_id,
                        return_codes,
                    } => {
                        if context.is_current() {
                            lock_tracker(&context.suback_tracker)
                                .acknowledged(packet_id, &return_codes);
                        }
                    }
                    EventRoute::Disconnected => {
                        context.link_lost("Broker closed the connection".to_string()).await;
                        break;
                    }
                    EventRoute::DisconnectSent => {
                        debug!(target: "mqtt_transport", "Disconnect sent");
                        break;
                    }
                    EventRoute::InfrastructureEvent(event) => {
                        debug!(target: "mqtt_transport", "MQTT event: {}", event);
                    }
                    EventRoute::OutgoingEvent => {}
                    route => {
                        if let Some(event) = route.into_transport_event() {
                            context.emit(event).await;
                        }
                    }
                },
                Err(e) => {
                    if *link_tx.borrow() == LinkStatus::Connecting {
                        link_tx.send_replace(LinkStatus::Failed(e.to_string()));
                    } else {
                        context.link_lost(e.to_string()).await;
                    }
                    break;
                }
            }
        }

        if context.is_current() {
            context.connected.store(false, Ordering::SeqCst);
            lock_tracker(&context.suback_tracker).clear();
        }
        debug!(target: "mqtt_transport", generation = context.generation, "MQTT event loop stopped");
    }

    async fn stop_event_loop(&self) {
        if let Some(handle) = self.event_loop_handle.lock().await.take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&self, options: &ConnectOptions) -> Result<(), TransportError> {
        self.stop_event_loop().await;

        let mqtt_options = configure_mqtt_options(options);
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.connected.store(false, Ordering::SeqCst);
        self.closing.store(false, Ordering::SeqCst);
        lock_tracker(&self.suback_tracker).clear();
        self.suback_timeout_ms
            .store(options.connect_timeout.as_millis() as u64, Ordering::SeqCst);

        let (link_tx, link_rx) = watch::channel(LinkStatus::Connecting);
        let context = LoopContext {
            generation,
            current_generation: self.generation.clone(),
            connected: self.connected.clone(),
            closing: self.closing.clone(),
            event_sender: self.event_sender.clone(),
            suback_tracker: self.suback_tracker.clone(),
        };

        info!(
            target: "mqtt_transport",
            broker = %options.broker_address(),
            client_id = %options.client_id,
            "Opening MQTT connection"
        );
        let handle = tokio::spawn(Self::run_event_loop(event_loop, context, link_tx));
        *self.event_loop_handle.lock().await = Some(handle);
        *self.client.lock().await = Some(client);

        match Self::wait_for_connection_confirmation(link_rx, options.connect_timeout).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.stop_event_loop().await;
                *self.client.lock().await = None;
                self.connected.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.closing.store(true, Ordering::SeqCst);
        let Some(client) = self.client.lock().await.take() else {
            debug!(target: "mqtt_transport", "Disconnect without an open connection");
            return Ok(());
        };

        let result = client
            .disconnect()
            .await
            .map_err(|e| TransportError::DisconnectFailed(Box::new(e)));
        self.connected.store(false, Ordering::SeqCst);

        if let Some(mut handle) = self.event_loop_handle.lock().await.take() {
            if tokio::time::timeout(DISCONNECT_GRACE, &mut handle).await.is_err() {
                warn!(target: "mqtt_transport", "Event loop did not stop in time, aborting");
                handle.abort();
            }
        }
        result
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        // Queue and send under the client lock so waiters line up with request order
        let suback = {
            let client = self.client.lock().await;
            let client = client.as_ref().ok_or(TransportError::NotConnected)?;
            let suback = lock_tracker(&self.suback_tracker).queue(topic);
            if let Err(e) = client.subscribe(topic, qos).await {
                lock_tracker(&self.suback_tracker).unqueue_last();
                return Err(TransportError::SubscriptionFailed(Box::new(e)));
            }
            suback
        };

        let timeout = Duration::from_millis(self.suback_timeout_ms.load(Ordering::SeqCst));
        match tokio::time::timeout(timeout, suback).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::SubscriptionFailed(
                "Connection closed before SubAck".into(),
            )),
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
    ) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let client = self
            .client
            .lock()
            .await
            .clone()
            .ok_or(TransportError::NotConnected)?;

        client
            .publish(topic, qos, false, payload)
            .await
            .map_err(|e| TransportError::PublishFailed(Box::new(e)))
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

impl Drop for MqttTransport {
    fn drop(&mut self) {
        if let Ok(mut handle) = self.event_loop_handle.try_lock() {
            if let Some(handle) = handle.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_confirmation_succeeds_on_connack() {
        let (link_tx, link_rx) = watch::channel(LinkStatus::Connecting);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            link_tx.send_replace(LinkStatus::Connected);
            // Keep the sender alive until the receiver has seen the change
            tokio::time::sleep(Duration::from_millis(50)).await;
        });

        let result =
            MqttTransport::wait_for_connection_confirmation(link_rx, Duration::from_secs(1)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_confirmation_reports_failure() {
        let (_link_tx, link_rx) = watch::channel(LinkStatus::Failed("refused".to_string()));

        let result =
            MqttTransport::wait_for_connection_confirmation(link_rx, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_confirmation_times_out() {
        let (_link_tx, link_rx) = watch::channel(LinkStatus::Connecting);

        let result =
            MqttTransport::wait_for_connection_confirmation(link_rx, Duration::from_millis(20))
                .await;
        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_suback_success_resolves_waiter() {
        let mut tracker = SubAckTracker::default();
        let waiter = tracker.queue("chat/1");

        tracker.sent(4);
        tracker.acknowledged(4, &[SubscribeReasonCode::Success(rumqttc::QoS::AtLeastOnce)]);

        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_suback_failure_code_fails_waiter() {
        let mut tracker = SubAckTracker::default();
        let waiter = tracker.queue("chat/forbidden");

        tracker.sent(9);
        tracker.acknowledged(9, &[SubscribeReasonCode::Failure]);

        let result = waiter.await.unwrap();
        match result {
            Err(TransportError::SubscriptionFailed(reason)) => {
                assert!(reason.to_string().contains("chat/forbidden"));
            }
            other => panic!("expected subscription failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_subacks_match_by_packet_id_in_send_order() {
        let mut tracker = SubAckTracker::default();
        let first = tracker.queue("chat/1");
        let second = tracker.queue("chat/2");

        tracker.sent(1);
        tracker.sent(2);
        tracker.acknowledged(2, &[SubscribeReasonCode::Failure]);
        tracker.acknowledged(1, &[SubscribeReasonCode::Success(rumqttc::QoS::AtMostOnce)]);

        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_unknown_suback_is_ignored() {
        let mut tracker = SubAckTracker::default();
        let mut waiter = tracker.queue("chat/1");
        tracker.sent(1);

        tracker.acknowledged(2, &[SubscribeReasonCode::Failure]);

        assert!(waiter.try_recv().is_err());
        assert_eq!(tracker.sent.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_closes_pending_waiters() {
        let mut tracker = SubAckTracker::default();
        let sent = tracker.queue("chat/1");
        tracker.sent(1);
        let queued = tracker.queue("chat/2");

        tracker.clear();

        assert!(sent.await.is_err());
        assert!(queued.await.is_err());
    }

    #[tokio::test]
    async fn test_unqueue_drops_newest_waiter() {
        let mut tracker = SubAckTracker::default();
        let kept = tracker.queue("chat/1");
        let dropped = tracker.queue("chat/2");

        tracker.unqueue_last();
        tracker.sent(5);
        tracker.acknowledged(5, &[SubscribeReasonCode::Success(rumqttc::QoS::AtLeastOnce)]);

        assert!(dropped.await.is_err());
        assert!(kept.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_new_transport_is_not_connected() {
        let transport = MqttTransport::new();
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.publish("chat/1", b"{}".to_vec(), QoS::AtLeastOnce).await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            transport.subscribe("chat/1", QoS::AtLeastOnce).await,
            Err(TransportError::NotConnected)
        ));
        assert!(transport.disconnect().await.is_ok());
    }
}
