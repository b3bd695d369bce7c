//! Managed publish/subscribe session
//!
//! [`MessagingSession`] owns the transport and all session state: connection
//! lifecycle, subscriptions, duplicate suppression and publish retry.

pub mod dedup;
pub mod messaging;
pub mod retry;
pub mod state;

pub use dedup::{DedupCache, Fingerprint};
pub use messaging::{
    ConnectOutcome, MessageDisposition, MessagingSession, PublishReport, SubscribeOutcome,
};
pub use retry::{PublishAttempt, PublishFailure, PublishStep, RetryPolicy, StepInput};
pub use state::{ConnectionState, SessionEvent, StateMachine, Subscription};

use crate::transport::{ConnectOptions, QoS};
use std::time::Duration;

/// Everything fixed at session construction
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub options: ConnectOptions,
    pub qos: QoS,
    pub retry: RetryPolicy,
    pub dedup_capacity: usize,
    pub dedup_window: Duration,
}

impl SessionSettings {
    /// Settings with at-least-once delivery and default retry and dedup bounds
    pub fn new(options: ConnectOptions) -> Self {
        Self {
            options,
            qos: QoS::AtLeastOnce,
            retry: RetryPolicy::default(),
            dedup_capacity: dedup::DEFAULT_DEDUP_CAPACITY,
            dedup_window: dedup::DEFAULT_DEDUP_WINDOW,
        }
    }
}
