//! Pure connection state management for the messaging session
//!
//! This module contains the session state machine and subscription bookkeeping.
//! Nothing here performs I/O; the session applies the transitions under its lock.

use tracing::{info, warn};

/// Connection state of a messaging session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live connection; eligible for a connect or reconnect attempt
    Disconnected,
    /// A connect or reconnect attempt is in flight
    Connecting,
    /// Connected and ready for publish/subscribe
    Connected,
}

/// Events that drive state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Connect() or a reconnect trigger started an attempt
    ConnectRequested,
    /// Transport accepted the connection
    ConnectSucceeded,
    /// Transport rejected the connection or timed out
    ConnectFailed(String),
    /// Transport reported loss of an established connection
    ConnectionLost(String),
    /// Application asked to disconnect
    DisconnectRequested,
}

/// Pure state transition logic
pub struct StateMachine;

impl StateMachine {
    /// Determine next state after an event (pure function)
    ///
    /// Returns `None` when the event does not apply in the current state; callers
    /// leave the state unchanged in that case. There is no Connecting -> Connecting
    /// transition, which is what keeps reconnects single-flight.
    pub fn next_state(current: ConnectionState, event: &SessionEvent) -> Option<ConnectionState> {
        use ConnectionState::*;

        match (current, event) {
            (Disconnected, SessionEvent::ConnectRequested) => Some(Connecting),
            (Connecting, SessionEvent::ConnectSucceeded) => Some(Connected),
            (Connecting, SessionEvent::ConnectFailed(_)) => Some(Disconnected),
            (Connected, SessionEvent::ConnectionLost(_)) => Some(Disconnected),
            (Connected | Connecting, SessionEvent::DisconnectRequested) => Some(Disconnected),
            _ => None,
        }
    }

    /// Check if connection state allows publishing (pure function)
    pub fn can_publish(state: ConnectionState) -> bool {
        matches!(state, ConnectionState::Connected)
    }

    /// Check if connection state allows subscribing (pure function)
    pub fn can_subscribe(state: ConnectionState) -> bool {
        matches!(state, ConnectionState::Connected)
    }

    /// Log connection state transition
    pub fn log_state_transition(from: ConnectionState, to: ConnectionState, event: &SessionEvent) {
        match (from, to, event) {
            (ConnectionState::Connecting, ConnectionState::Connected, _) => {
                info!("Connection to broker established");
            }
            (ConnectionState::Connected, ConnectionState::Disconnected, SessionEvent::ConnectionLost(cause)) => {
                warn!(cause = %cause, "Connection to broker lost");
            }
            (ConnectionState::Connecting, ConnectionState::Disconnected, SessionEvent::ConnectFailed(reason)) => {
                warn!(reason = %reason, "Connection attempt failed");
            }
            _ => {
                info!("Session state: {:?} -> {:?}", from, to);
            }
        }
    }
}

/// A topic subscription owned by the session
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub topic: String,
    /// True while the broker holds this subscription for us
    pub active: bool,
}

impl Subscription {
    pub fn active(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            active: true,
        }
    }
}

/// Mark subscriptions the broker will have dropped (pure function)
///
/// A clean session loses every subscription when the connection ends; a persistent
/// session keeps them on the broker side.
pub fn deactivate_for_clean_session<'a>(
    subscriptions: impl IntoIterator<Item = &'a mut Subscription>,
    clean_session: bool,
) {
    if !clean_session {
        return;
    }
    for subscription in subscriptions {
        subscription.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn test_connect_lifecycle_transitions() {
        assert_eq!(
            StateMachine::next_state(Disconnected, &SessionEvent::ConnectRequested),
            Some(Connecting)
        );
        assert_eq!(
            StateMachine::next_state(Connecting, &SessionEvent::ConnectSucceeded),
            Some(Connected)
        );
        assert_eq!(
            StateMachine::next_state(Connecting, &SessionEvent::ConnectFailed("refused".into())),
            Some(Disconnected)
        );
        assert_eq!(
            StateMachine::next_state(Connected, &SessionEvent::ConnectionLost("eof".into())),
            Some(Disconnected)
        );
        assert_eq!(
            StateMachine::next_state(Connected, &SessionEvent::DisconnectRequested),
            Some(Disconnected)
        );
    }

    #[test]
    fn test_no_connecting_self_loop() {
        assert_eq!(
            StateMachine::next_state(Connecting, &SessionEvent::ConnectRequested),
            None
        );
    }

    #[test]
    fn test_ignored_events() {
        assert_eq!(
            StateMachine::next_state(Connected, &SessionEvent::ConnectRequested),
            None
        );
        assert_eq!(
            StateMachine::next_state(Disconnected, &SessionEvent::ConnectionLost("x".into())),
            None
        );
        assert_eq!(
            StateMachine::next_state(Disconnected, &SessionEvent::DisconnectRequested),
            None
        );
        assert_eq!(
            StateMachine::next_state(Disconnected, &SessionEvent::ConnectSucceeded),
            None
        );
        assert_eq!(
            StateMachine::next_state(Connecting, &SessionEvent::ConnectionLost("x".into())),
            None
        );
    }

    #[test]
    fn test_disconnect_cancels_in_flight_connect() {
        assert_eq!(
            StateMachine::next_state(Connecting, &SessionEvent::DisconnectRequested),
            Some(Disconnected)
        );
    }

    #[test]
    fn test_can_publish_and_subscribe() {
        assert!(StateMachine::can_publish(Connected));
        assert!(!StateMachine::can_publish(Connecting));
        assert!(!StateMachine::can_publish(Disconnected));
        assert!(StateMachine::can_subscribe(Connected));
        assert!(!StateMachine::can_subscribe(Connecting));
        assert!(!StateMachine::can_subscribe(Disconnected));
    }

    #[test]
    fn test_clean_session_deactivates_subscriptions() {
        let mut first = Subscription::active("chat/1");
        let mut second = Subscription::active("chat/2");
        deactivate_for_clean_session([&mut first, &mut second], true);
        assert!(!first.active);
        assert!(!second.active);
    }

    #[test]
    fn test_persistent_session_keeps_subscriptions() {
        let mut subscription = Subscription::active("chat/1");
        deactivate_for_clean_session([&mut subscription], false);
        assert!(subscription.active);
    }
}
