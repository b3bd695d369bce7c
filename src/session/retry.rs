//! Bounded publish retry
//!
//! A publish is driven through [`PublishStep`]s by [`PublishAttempt::advance`]. The
//! session performs the I/O each step asks for and feeds the result back in, so the
//! number of reconnects and sends per call is fixed by the [`RetryPolicy`] rather
//! than by call-stack depth.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How hard a publish tries to restore the connection before giving up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Reconnect attempts a single publish may trigger
    pub max_reconnect_attempts: u32,
    /// Delay before each reconnect attempt in milliseconds; the last value is
    /// reused once the pattern runs out
    pub backoff_ms: Vec<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 1,
            backoff_ms: vec![0],
        }
    }
}

impl RetryPolicy {
    /// Backoff before reconnect attempt `attempt` (1-based)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        let millis = self
            .backoff_ms
            .get(index)
            .or_else(|| self.backoff_ms.last())
            .copied()
            .unwrap_or(0);
        Duration::from_millis(millis)
    }

    /// Total time a publish may spend sleeping between reconnects
    pub fn max_total_backoff(&self) -> Duration {
        (1..=self.max_reconnect_attempts)
            .map(|attempt| self.backoff_delay(attempt))
            .sum()
    }
}

/// Why a publish ended without reaching the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishFailure {
    /// The session was still not connected after using every reconnect attempt
    NotConnected { attempts: u32 },
    /// The transport refused the send; never retried
    SendRejected,
}

/// Where a publish currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStep {
    EnsureConnected,
    Backoff { attempt: u32, delay: Duration },
    Reconnect { attempt: u32 },
    Send,
    Delivered,
    Failed(PublishFailure),
}

impl PublishStep {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PublishStep::Delivered | PublishStep::Failed(_))
    }
}

/// Outcome of the I/O a step requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepInput {
    ConnectionChecked(bool),
    BackoffElapsed,
    ReconnectFinished,
    SendSucceeded,
    SendFailed,
}

/// One publish call's progress through the retry state machine
#[derive(Debug, Clone)]
pub struct PublishAttempt {
    policy: RetryPolicy,
    reconnects_used: u32,
    step: PublishStep,
}

impl PublishAttempt {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            reconnects_used: 0,
            step: PublishStep::EnsureConnected,
        }
    }

    pub fn step(&self) -> PublishStep {
        self.step
    }

    pub fn reconnects_used(&self) -> u32 {
        self.reconnects_used
    }

    /// Feed the result of the current step and move to the next one
    ///
    /// Inputs that do not belong to the current step leave it unchanged.
    pub fn advance(&mut self, input: StepInput) -> PublishStep {
        let next = match (self.step, input) {
            (PublishStep::EnsureConnected, StepInput::ConnectionChecked(true)) => PublishStep::Send,
            (PublishStep::EnsureConnected, StepInput::ConnectionChecked(false)) => {
                if self.reconnects_used < self.policy.max_reconnect_attempts {
                    let attempt = self.reconnects_used + 1;
                    PublishStep::Backoff {
                        attempt,
                        delay: self.policy.backoff_delay(attempt),
                    }
                } else {
                    PublishStep::Failed(PublishFailure::NotConnected {
                        attempts: self.reconnects_used,
                    })
                }
            }
            (PublishStep::Backoff { attempt, .. }, StepInput::BackoffElapsed) => {
                PublishStep::Reconnect { attempt }
            }
            (PublishStep::Reconnect { attempt }, StepInput::ReconnectFinished) => {
                self.reconnects_used = attempt;
                PublishStep::EnsureConnected
            }
            (PublishStep::Send, StepInput::SendSucceeded) => PublishStep::Delivered,
            (PublishStep::Send, StepInput::SendFailed) => {
                PublishStep::Failed(PublishFailure::SendRejected)
            }
            (current, _) => current,
        };
        self.step = next;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_reconnect_attempts, 1);
        assert_eq!(policy.backoff_delay(1), Duration::ZERO);
        assert_eq!(policy.max_total_backoff(), Duration::ZERO);
    }

    #[test]
    fn test_backoff_pattern_sustains_last_value() {
        let policy = RetryPolicy {
            max_reconnect_attempts: 5,
            backoff_ms: vec![25, 50, 100],
        };
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(25));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(50));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(4), Duration::from_millis(100));
        assert_eq!(policy.max_total_backoff(), Duration::from_millis(375));
    }

    #[test]
    fn test_empty_backoff_pattern_means_no_delay() {
        let policy = RetryPolicy {
            max_reconnect_attempts: 2,
            backoff_ms: vec![],
        };
        assert_eq!(policy.backoff_delay(1), Duration::ZERO);
    }

    #[test]
    fn test_connected_publish_sends_once() {
        let mut attempt = PublishAttempt::new(RetryPolicy::default());
        assert_eq!(attempt.advance(StepInput::ConnectionChecked(true)), PublishStep::Send);
        assert_eq!(attempt.advance(StepInput::SendSucceeded), PublishStep::Delivered);
        assert_eq!(attempt.reconnects_used(), 0);
    }

    #[test]
    fn test_disconnected_publish_reconnects_then_sends() {
        let mut attempt = PublishAttempt::new(RetryPolicy::default());

        assert_eq!(
            attempt.advance(StepInput::ConnectionChecked(false)),
            PublishStep::Backoff {
                attempt: 1,
                delay: Duration::ZERO
            }
        );
        assert_eq!(
            attempt.advance(StepInput::BackoffElapsed),
            PublishStep::Reconnect { attempt: 1 }
        );
        assert_eq!(
            attempt.advance(StepInput::ReconnectFinished),
            PublishStep::EnsureConnected
        );
        assert_eq!(attempt.advance(StepInput::ConnectionChecked(true)), PublishStep::Send);
        assert_eq!(attempt.advance(StepInput::SendSucceeded), PublishStep::Delivered);
        assert_eq!(attempt.reconnects_used(), 1);
    }

    #[test]
    fn test_reconnect_budget_exhausted() {
        let mut attempt = PublishAttempt::new(RetryPolicy::default());
        attempt.advance(StepInput::ConnectionChecked(false));
        attempt.advance(StepInput::BackoffElapsed);
        attempt.advance(StepInput::ReconnectFinished);

        assert_eq!(
            attempt.advance(StepInput::ConnectionChecked(false)),
            PublishStep::Failed(PublishFailure::NotConnected { attempts: 1 })
        );
    }

    #[test]
    fn test_send_failure_is_terminal() {
        let mut attempt = PublishAttempt::new(RetryPolicy {
            max_reconnect_attempts: 3,
            backoff_ms: vec![0],
        });
        attempt.advance(StepInput::ConnectionChecked(true));
        let step = attempt.advance(StepInput::SendFailed);

        assert_eq!(step, PublishStep::Failed(PublishFailure::SendRejected));
        assert!(step.is_terminal());
        // Terminal steps ignore further input
        assert_eq!(attempt.advance(StepInput::ConnectionChecked(true)), step);
    }

    #[test]
    fn test_zero_attempt_policy_fails_immediately() {
        let mut attempt = PublishAttempt::new(RetryPolicy {
            max_reconnect_attempts: 0,
            backoff_ms: vec![],
        });
        assert_eq!(
            attempt.advance(StepInput::ConnectionChecked(false)),
            PublishStep::Failed(PublishFailure::NotConnected { attempts: 0 })
        );
    }

    proptest! {
        #[test]
        fn never_exceeds_reconnect_budget_or_one_send(
            max_attempts in 0u32..6,
            checks in proptest::collection::vec(any::<bool>(), 1..32),
        ) {
            let mut attempt = PublishAttempt::new(RetryPolicy {
                max_reconnect_attempts: max_attempts,
                backoff_ms: vec![0],
            });
            let mut sends = 0;
            let mut reconnects = 0;
            let mut checks = checks.into_iter();

            while !attempt.step().is_terminal() {
                let input = match attempt.step() {
                    PublishStep::EnsureConnected => match checks.next() {
                        Some(up) => StepInput::ConnectionChecked(up),
                        None => StepInput::ConnectionChecked(false),
                    },
                    PublishStep::Backoff { .. } => StepInput::BackoffElapsed,
                    PublishStep::Reconnect { .. } => {
                        reconnects += 1;
                        StepInput::ReconnectFinished
                    }
                    PublishStep::Send => {
                        sends += 1;
                        StepInput::SendFailed
                    }
                    PublishStep::Delivered | PublishStep::Failed(_) => unreachable!(),
                };
                attempt.advance(input);
            }

            prop_assert!(reconnects <= max_attempts);
            prop_assert!(sends <= 1);
        }
    }
}
