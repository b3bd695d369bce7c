//! Messaging session over an abstract transport
//!
//! All mutable session state lives in one [`SessionState`] behind one tokio mutex.
//! Transport notifications arrive on an mpsc channel and are handled by a pump task,
//! so they may run concurrently with application calls. State changes are published
//! on a watch channel so callers can wait for an in-flight connect to settle.

use super::dedup::{DedupCache, Fingerprint};
use super::retry::{PublishAttempt, PublishFailure, PublishStep, RetryPolicy, StepInput};
use super::state::{
    deactivate_for_clean_session, ConnectionState, SessionEvent, StateMachine, Subscription,
};
use super::SessionSettings;
use crate::error::{SessionError, SessionResult};
use crate::observability::metrics::metrics;
use crate::protocol::messages::{ChatMessage, InboundMessage};
use crate::protocol::topics::{validate_topic_filter, validate_topic_name};
use crate::transport::{ConnectOptions, QoS, Transport, TransportError, TransportEvent};
use crate::session_span;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Capacity of the transport event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Extra time allowed on top of the connect timeout when waiting for another
/// caller's connect attempt to settle
const SETTLE_GRACE: Duration = Duration::from_millis(500);

/// Result of a connect or reconnect request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// This call established the connection
    Connected,
    /// Already connected; nothing was sent to the transport
    AlreadyConnected,
    /// Another attempt was already running; this call did not start one
    InFlight,
    /// Disconnect was requested while connecting; the new link was closed again
    Cancelled,
}

/// Result of a subscribe request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    /// The topic already has an active subscription in this session
    AlreadyActive,
    /// The session is not connected; nothing was sent and nothing is scheduled
    NotConnected,
}

/// What happened to one inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDisposition {
    Delivered(Fingerprint),
    Duplicate(Fingerprint),
    /// New, but the application channel was full; the fingerprint was forgotten
    Dropped(Fingerprint),
    Malformed,
}

/// Successful publish summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub topic: String,
    /// Size of the serialized envelope
    pub bytes: usize,
    /// Reconnects this publish had to perform before sending
    pub reconnects: u32,
}

struct SessionState {
    connection: ConnectionState,
    subscriptions: HashMap<String, Subscription>,
    dedup: DedupCache,
    message_sender: Option<mpsc::Sender<InboundMessage>>,
    has_connected: bool,
    reconnect_count: u32,
    /// Transport connect currently running, which may outlive a cancelling disconnect
    attempt_in_flight: Option<u64>,
    next_attempt_id: u64,
}

impl SessionState {
    /// Apply a state machine event, broadcasting the new state. Returns false when
    /// the event does not apply in the current state.
    fn apply(&mut self, event: SessionEvent, state_tx: &watch::Sender<ConnectionState>) -> bool {
        match StateMachine::next_state(self.connection, &event) {
            Some(next) => {
                StateMachine::log_state_transition(self.connection, next, &event);
                self.connection = next;
                state_tx.send_replace(next);
                true
            }
            None => false,
        }
    }

    /// Mark every inactive subscription active and return their topics
    ///
    /// Claimed here, under the lock, so a concurrent subscribe sees them as active
    /// while they are re-issued.
    fn claim_inactive_subscriptions(&mut self) -> Vec<String> {
        self.subscriptions
            .values_mut()
            .filter(|subscription| !subscription.active)
            .map(|subscription| {
                subscription.active = true;
                subscription.topic.clone()
            })
            .collect()
    }

    /// Close out attempt `id`; false if it is not the outstanding attempt
    fn finish_attempt(&mut self, id: u64, state_tx: &watch::Sender<ConnectionState>) -> bool {
        if self.attempt_in_flight != Some(id) {
            return false;
        }
        self.attempt_in_flight = None;
        // Wake waiters even when the connection state itself did not change
        state_tx.send_replace(self.connection);
        true
    }
}

struct SessionInner<T: Transport> {
    options: ConnectOptions,
    qos: QoS,
    retry: RetryPolicy,
    transport: Arc<T>,
    state: Mutex<SessionState>,
    state_tx: watch::Sender<ConnectionState>,
}

/// Releases the in-flight marker if a connect future is dropped before the
/// transport returns
struct AttemptGuard<T: Transport> {
    inner: Arc<SessionInner<T>>,
    id: u64,
    armed: bool,
}

impl<T: Transport> AttemptGuard<T> {
    fn abandon(state: &mut SessionState, id: u64, state_tx: &watch::Sender<ConnectionState>) {
        if state.finish_attempt(id, state_tx) {
            state.apply(
                SessionEvent::ConnectFailed("connect attempt abandoned".to_string()),
                state_tx,
            );
        }
    }
}

impl<T: Transport> Drop for AttemptGuard<T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let id = self.id;
        match self.inner.state.try_lock() {
            Ok(mut state) => Self::abandon(&mut state, id, &self.inner.state_tx),
            Err(_) => {
                let inner = self.inner.clone();
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        let mut state = inner.state.lock().await;
                        Self::abandon(&mut state, id, &inner.state_tx);
                    });
                }
            }
        }
    }
}

impl<T: Transport> SessionInner<T> {
    async fn attempt_connect(self: &Arc<Self>) -> SessionResult<ConnectOutcome> {
        let (attempt_id, reconnecting) = {
            let mut state = self.state.lock().await;
            if state.connection == ConnectionState::Connected {
                debug!(client_id = %self.options.client_id, "Already connected");
                return Ok(ConnectOutcome::AlreadyConnected);
            }
            if state.attempt_in_flight.is_some() {
                debug!(state = ?state.connection, "Connect attempt already in flight");
                return Ok(ConnectOutcome::InFlight);
            }
            state.apply(SessionEvent::ConnectRequested, &self.state_tx);
            state.next_attempt_id += 1;
            let id = state.next_attempt_id;
            state.attempt_in_flight = Some(id);
            (id, state.has_connected)
        };

        metrics().connection_attempt();
        info!(
            broker = %self.options.broker_address(),
            client_id = %self.options.client_id,
            clean_session = self.options.clean_session,
            reconnect = reconnecting,
            "Connecting to broker"
        );

        let mut guard = AttemptGuard {
            inner: self.clone(),
            id: attempt_id,
            armed: true,
        };
        let connect_timeout = self.options.connect_timeout;
        let result = match tokio::time::timeout(
            connect_timeout,
            self.transport.connect(&self.options),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(connect_timeout)),
        };

        match result {
            Ok(()) => {
                let pending = {
                    let mut state = self.state.lock().await;
                    if state.attempt_in_flight == Some(attempt_id)
                        && state.apply(SessionEvent::ConnectSucceeded, &self.state_tx)
                    {
                        state.finish_attempt(attempt_id, &self.state_tx);
                        guard.armed = false;
                        if reconnecting {
                            state.reconnect_count += 1;
                        }
                        state.has_connected = true;
                        Some(state.claim_inactive_subscriptions())
                    } else {
                        None
                    }
                };

                let Some(pending) = pending else {
                    info!("Disconnect requested while connecting, closing new connection");
                    if let Err(e) = self.transport.disconnect().await {
                        warn!(error = %e, "Failed to close cancelled connection");
                    }
                    // Held until the stray link is closed, so no new connect overlaps it
                    self.state
                        .lock()
                        .await
                        .finish_attempt(attempt_id, &self.state_tx);
                    guard.armed = false;
                    return Ok(ConnectOutcome::Cancelled);
                };

                metrics().connection_established();
                if reconnecting {
                    metrics().reconnect_succeeded();
                }
                self.resubscribe(pending).await;
                Ok(ConnectOutcome::Connected)
            }
            Err(e) => {
                {
                    let mut state = self.state.lock().await;
                    if state.finish_attempt(attempt_id, &self.state_tx) {
                        state.apply(SessionEvent::ConnectFailed(e.to_string()), &self.state_tx);
                    }
                    guard.armed = false;
                }
                metrics().connection_failed();
                error!(
                    broker = %self.options.broker_address(),
                    error = %e,
                    "Failed to connect to broker"
                );
                Err(SessionError::ConnectionError(e))
            }
        }
    }

    /// Re-issue subscriptions the broker dropped with a clean session
    ///
    /// The topics were already claimed active; a failed re-subscribe releases its
    /// claim so the next connect or an explicit subscribe tries again.
    async fn resubscribe(&self, topics: Vec<String>) {
        for topic in topics {
            match self.transport.subscribe(&topic, self.qos).await {
                Ok(()) => info!(topic = %topic, "Re-subscribed after reconnect"),
                Err(e) => {
                    let mut state = self.state.lock().await;
                    if let Some(subscription) = state.subscriptions.get_mut(&topic) {
                        subscription.active = false;
                    }
                    warn!(topic = %topic, error = %e, "Failed to re-subscribe after reconnect");
                }
            }
        }
    }

    /// Wait until no connect attempt is in flight, bounded by the connect timeout
    ///
    /// This includes an attempt already cancelled by disconnect whose transport
    /// connect has not returned yet.
    async fn wait_for_settled(&self) -> ConnectionState {
        let mut state_rx = self.state_tx.subscribe();
        let limit = self.options.connect_timeout + SETTLE_GRACE;

        let settled = tokio::time::timeout(limit, async {
            loop {
                state_rx.borrow_and_update();
                {
                    let state = self.state.lock().await;
                    if state.attempt_in_flight.is_none() {
                        return state.connection;
                    }
                }
                if state_rx.changed().await.is_err() {
                    return *state_rx.borrow();
                }
            }
        })
        .await;

        settled.unwrap_or_else(|_| *self.state_tx.borrow())
    }

    /// Both the session and the transport agree the link is up
    async fn ensure_connected(&self) -> bool {
        let connection = {
            let mut state = self.state.lock().await;
            if state.connection == ConnectionState::Connected && !self.transport.is_connected() {
                warn!("Transport link is down while session reports connected");
                self.mark_lost(&mut state, "transport link down");
                metrics().connection_lost();
            }
            state.connection
        };

        let connection = match connection {
            ConnectionState::Connecting => self.wait_for_settled().await,
            other => other,
        };
        StateMachine::can_publish(connection) && self.transport.is_connected()
    }

    fn mark_lost(&self, state: &mut SessionState, cause: &str) -> bool {
        if !state.apply(SessionEvent::ConnectionLost(cause.to_string()), &self.state_tx) {
            return false;
        }
        deactivate_for_clean_session(
            state.subscriptions.values_mut(),
            self.options.clean_session,
        );
        true
    }

    async fn on_connection_lost(
        self: &Arc<Self>,
        cause: &str,
    ) -> SessionResult<Option<ConnectOutcome>> {
        let lost = {
            let mut state = self.state.lock().await;
            self.mark_lost(&mut state, cause)
        };
        if !lost {
            debug!(cause = %cause, "Connection loss ignored, session was not connected");
            return Ok(None);
        }

        metrics().connection_lost();
        self.reconnect_once().await.map(Some)
    }

    async fn reconnect_once(self: &Arc<Self>) -> SessionResult<ConnectOutcome> {
        info!(client_id = %self.options.client_id, "Attempting reconnect");
        self.attempt_connect().await
    }

    async fn on_message(&self, topic: &str, payload: &[u8]) -> MessageDisposition {
        let message = match ChatMessage::from_bytes(payload) {
            Ok(message) => message,
            Err(e) => {
                metrics().malformed_dropped();
                warn!(topic = %topic, error = %e, "Dropping malformed message");
                return MessageDisposition::Malformed;
            }
        };

        let fingerprint = Fingerprint::of(topic, payload);
        let sender = {
            let mut state = self.state.lock().await;
            if !state.dedup.check_and_insert(fingerprint, Instant::now()) {
                metrics().duplicate_dropped();
                debug!(topic = %topic, fingerprint = %fingerprint, "Duplicate message discarded");
                return MessageDisposition::Duplicate(fingerprint);
            }
            state.message_sender.clone()
        };

        let sender_address = message.sender.clone();
        if let Some(sender) = sender {
            let inbound = InboundMessage {
                topic: topic.to_string(),
                message,
                fingerprint,
            };
            // The event pump must not wait on the application
            match sender.try_send(inbound) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.state.lock().await.dedup.forget(&fingerprint);
                    metrics().delivery_dropped();
                    warn!(
                        topic = %topic,
                        fingerprint = %fingerprint,
                        "Message receiver is full, message dropped"
                    );
                    return MessageDisposition::Dropped(fingerprint);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(topic = %topic, "Message receiver dropped, message not handed over");
                }
            }
        }

        metrics().message_received();
        info!(
            topic = %topic,
            sender = %sender_address,
            fingerprint = %fingerprint,
            "Message received"
        );
        MessageDisposition::Delivered(fingerprint)
    }
}

/// Client-side session with a broker
///
/// Must be created inside a tokio runtime: construction spawns the task that
/// handles transport notifications.
pub struct MessagingSession<T: Transport> {
    inner: Arc<SessionInner<T>>,
    pump_handle: Option<JoinHandle<()>>,
}

impl<T: Transport> MessagingSession<T> {
    pub fn new(settings: SessionSettings, transport: Arc<T>) -> Self {
        let SessionSettings {
            options,
            qos,
            retry,
            dedup_capacity,
            dedup_window,
        } = settings;

        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let inner = Arc::new(SessionInner {
            options,
            qos,
            retry,
            transport,
            state: Mutex::new(SessionState {
                connection: ConnectionState::Disconnected,
                subscriptions: HashMap::new(),
                dedup: DedupCache::new(dedup_capacity, dedup_window),
                message_sender: None,
                has_connected: false,
                reconnect_count: 0,
                attempt_in_flight: None,
                next_attempt_id: 0,
            }),
            state_tx,
        });

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        inner.transport.set_event_sender(event_tx);
        let pump_handle = tokio::spawn(Self::run_event_pump(inner.clone(), event_rx));

        Self {
            inner,
            pump_handle: Some(pump_handle),
        }
    }

    async fn run_event_pump(
        inner: Arc<SessionInner<T>>,
        mut events: mpsc::Receiver<TransportEvent>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::MessageArrived { topic, payload } => {
                    inner.on_message(&topic, &payload).await;
                }
                TransportEvent::ConnectionLost { cause } => {
                    // Reconnect off the pump so arrivals queued behind the loss are not held up
                    let inner = inner.clone();
                    tokio::spawn(async move {
                        if let Err(e) = inner.on_connection_lost(&cause).await {
                            warn!(error = %e, "Reconnect after connection loss failed");
                        }
                    });
                }
                TransportEvent::DeliveryComplete { packet_id } => {
                    debug!(packet_id, "Broker acknowledged publish");
                }
            }
        }
        debug!("Transport event channel closed, event pump stopping");
    }

    /// Register the channel that receives newly seen messages
    ///
    /// Delivery never blocks: when the channel is full the message is dropped,
    /// counted, and its fingerprint forgotten so a redelivery can still get through.
    /// Size the channel for the application's worst-case backlog.
    pub async fn set_message_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        let mut state = self.inner.state.lock().await;
        state.message_sender = Some(sender);
    }

    /// Connect with the stored options
    ///
    /// A no-op when already connected. A failed initial connect is not retried; the
    /// session stays Disconnected until another operation or a connection-loss
    /// event triggers an attempt. While another attempt is outstanding, including
    /// one already cancelled by [`disconnect`](Self::disconnect), this waits for it
    /// and makes its own attempt only if that one did not leave the session connected.
    pub async fn connect(&self) -> SessionResult<ConnectOutcome> {
        let outcome = self.inner.attempt_connect().await?;
        if outcome != ConnectOutcome::InFlight {
            return Ok(outcome);
        }
        if self.inner.wait_for_settled().await == ConnectionState::Connected {
            return Ok(ConnectOutcome::InFlight);
        }

        match self.inner.attempt_connect().await? {
            ConnectOutcome::InFlight => {
                let settled = self.inner.wait_for_settled().await;
                if settled == ConnectionState::Connected {
                    Ok(ConnectOutcome::InFlight)
                } else {
                    Err(SessionError::NotConnected {
                        state: settled,
                        attempts: 0,
                    })
                }
            }
            outcome => Ok(outcome),
        }
    }

    /// One reconnect attempt; a no-op while another attempt is in flight
    pub async fn reconnect_once(&self) -> SessionResult<ConnectOutcome> {
        self.inner.reconnect_once().await
    }

    /// Gracefully close the connection
    ///
    /// A no-op when already disconnected. A transport failure is logged and
    /// returned, but the session is Disconnected either way.
    pub async fn disconnect(&self) -> SessionResult<()> {
        {
            let mut state = self.inner.state.lock().await;
            if !state.apply(SessionEvent::DisconnectRequested, &self.inner.state_tx) {
                debug!("Disconnect requested while already disconnected");
                return Ok(());
            }
            deactivate_for_clean_session(
                state.subscriptions.values_mut(),
                self.inner.options.clean_session,
            );
        }

        match self.inner.transport.disconnect().await {
            Ok(()) => {
                info!(broker = %self.inner.options.broker_address(), "Disconnected from broker");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Transport disconnect failed");
                Err(SessionError::ConnectionError(e))
            }
        }
    }

    /// Subscribe to a topic filter, at most once per session
    pub async fn subscribe(&self, topic: &str) -> SessionResult<SubscribeOutcome> {
        validate_topic_filter(topic)?;

        {
            let mut state = self.inner.state.lock().await;
            if !StateMachine::can_subscribe(state.connection) {
                error!(
                    topic = %topic,
                    state = ?state.connection,
                    "Cannot subscribe while not connected"
                );
                return Ok(SubscribeOutcome::NotConnected);
            }
            if state
                .subscriptions
                .get(topic)
                .is_some_and(|subscription| subscription.active)
            {
                debug!(topic = %topic, "Already subscribed");
                return Ok(SubscribeOutcome::AlreadyActive);
            }
            // Claimed before the transport call so a concurrent subscribe sees it active
            state
                .subscriptions
                .insert(topic.to_string(), Subscription::active(topic));
        }

        match self.inner.transport.subscribe(topic, self.inner.qos).await {
            Ok(()) => {
                info!(topic = %topic, qos = ?self.inner.qos, "Subscribed");
                Ok(SubscribeOutcome::Subscribed)
            }
            Err(e) => {
                {
                    let mut state = self.inner.state.lock().await;
                    state.subscriptions.remove(topic);
                }
                error!(topic = %topic, error = %e, "Subscribe failed");
                Err(SessionError::subscribe_failed(topic, e))
            }
        }
    }

    /// Build the chat envelope and publish it
    pub async fn publish(
        &self,
        topic: &str,
        content: &str,
        sender: &str,
        timestamp: &str,
    ) -> SessionResult<PublishReport> {
        let message = ChatMessage::new(content, sender, timestamp);
        self.publish_message(topic, &message).await
    }

    /// Publish a prepared envelope, reconnecting first if the retry policy allows
    ///
    /// At most one send is made per call. A send failure is returned and never
    /// retried; nothing is queued.
    pub async fn publish_message(
        &self,
        topic: &str,
        message: &ChatMessage,
    ) -> SessionResult<PublishReport> {
        validate_topic_name(topic)?;
        let payload = message.to_bytes()?;
        let bytes = payload.len();

        let span = session_span!(
            operation = "publish",
            topic = %topic,
            max_reconnects = self.inner.retry.max_reconnect_attempts,
            max_backoff_ms = self.inner.retry.max_total_backoff().as_millis() as u64
        );
        let mut attempt = PublishAttempt::new(self.inner.retry.clone());
        let mut send_error = None;

        let terminal = async {
            loop {
                let input = match attempt.step() {
                    PublishStep::EnsureConnected => {
                        StepInput::ConnectionChecked(self.inner.ensure_connected().await)
                    }
                    PublishStep::Backoff { attempt: n, delay } => {
                        info!(
                            attempt = n,
                            delay_ms = delay.as_millis() as u64,
                            "Not connected, reconnecting before publish"
                        );
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        StepInput::BackoffElapsed
                    }
                    PublishStep::Reconnect { .. } => {
                        match self.inner.reconnect_once().await {
                            Ok(ConnectOutcome::InFlight) => {
                                self.inner.wait_for_settled().await;
                            }
                            Ok(_) => {}
                            Err(e) => debug!(error = %e, "Reconnect before publish failed"),
                        }
                        StepInput::ReconnectFinished
                    }
                    PublishStep::Send => {
                        match self
                            .inner
                            .transport
                            .publish(topic, payload.clone(), self.inner.qos)
                            .await
                        {
                            Ok(()) => StepInput::SendSucceeded,
                            Err(e) => {
                                send_error = Some(e);
                                StepInput::SendFailed
                            }
                        }
                    }
                    terminal @ (PublishStep::Delivered | PublishStep::Failed(_)) => {
                        break terminal;
                    }
                };
                attempt.advance(input);
            }
        }
        .instrument(span)
        .await;

        match terminal {
            PublishStep::Failed(PublishFailure::NotConnected { attempts }) => {
                let state = self.connection_state();
                metrics().publish_failed();
                error!(topic = %topic, attempts, state = ?state, "Publish failed, session not connected");
                Err(SessionError::NotConnected { state, attempts })
            }
            PublishStep::Failed(PublishFailure::SendRejected) => {
                let source = send_error.unwrap_or(TransportError::NotConnected);
                metrics().publish_failed();
                error!(topic = %topic, error = %source, "Publish failed, message dropped");
                Err(SessionError::publish_failed(topic, source))
            }
            _ => {
                metrics().message_published();
                debug!(topic = %topic, bytes, "Message published");
                Ok(PublishReport {
                    topic: topic.to_string(),
                    bytes,
                    reconnects: attempt.reconnects_used(),
                })
            }
        }
    }

    /// Handle a message arriving from the transport
    ///
    /// The fingerprint check and insert happen under the session lock, so
    /// concurrent arrivals of the same payload deliver at most once.
    pub async fn on_message(&self, topic: &str, payload: &[u8]) -> MessageDisposition {
        self.inner.on_message(topic, payload).await
    }

    /// Handle loss of an established connection with exactly one reconnect attempt
    ///
    /// Returns `Ok(None)` when the session was not connected, which is how a second
    /// loss during an in-flight reconnect is ignored.
    pub async fn on_connection_lost(&self, cause: &str) -> SessionResult<Option<ConnectOutcome>> {
        self.inner.on_connection_lost(cause).await
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Observe connection state changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Topics with an active subscription, sorted
    pub async fn active_subscriptions(&self) -> Vec<String> {
        let state = self.inner.state.lock().await;
        let mut topics: Vec<String> = state
            .subscriptions
            .values()
            .filter(|subscription| subscription.active)
            .map(|subscription| subscription.topic.clone())
            .collect();
        topics.sort();
        topics
    }

    /// Successful reconnects over the session's lifetime
    pub async fn reconnect_count(&self) -> u32 {
        self.inner.state.lock().await.reconnect_count
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.inner.options
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.inner.transport
    }

    /// Disconnect and stop handling transport notifications
    pub async fn shutdown(mut self) -> SessionResult<()> {
        let result = self.disconnect().await;
        if let Some(handle) = self.pump_handle.take() {
            handle.abort();
        }
        info!(client_id = %self.inner.options.client_id, "Session shut down");
        result
    }
}

impl<T: Transport> Drop for MessagingSession<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.pump_handle.take() {
            handle.abort();
        }
    }
}
