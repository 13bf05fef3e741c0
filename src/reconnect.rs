//! Reconnect backoff policies and the per-socket reconnect timer.

use log::debug;
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};

/// Hard cap on any reconnect delay.
pub const RECONNECT_DELAY_CAP: Duration = Duration::from_secs(30);

/// Consecutive drops tolerated before the socket gives up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Delay strategy between reconnect attempts. Attempts are numbered from
/// 1; both variants are capped at [`RECONNECT_DELAY_CAP`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// `base * 2^(attempt - 1)`, used by team and call channels.
    Exponential { base: Duration },
    /// `step * attempt`, used by the room channel.
    Linear { step: Duration },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let raw = match *self {
            BackoffPolicy::Exponential { base } => {
                // Past a dozen doublings the cap always wins; clamping the
                // shift keeps the multiply in range.
                let shift = (attempt - 1).min(12);
                base.saturating_mul(1u32 << shift)
            }
            BackoffPolicy::Linear { step } => step.saturating_mul(attempt),
        };
        raw.min(RECONNECT_DELAY_CAP)
    }
}

/// One-shot reconnect timer. Each socket owns exactly one live wait at a
/// time: scheduling a new wait replaces the pending one, which then
/// reports itself cancelled.
pub struct ReconnectScheduler {
    policy: BackoffPolicy,
    pending: Mutex<Option<oneshot::Sender<()>>>,
}

impl ReconnectScheduler {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            pending: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> BackoffPolicy {
        self.policy
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.policy.delay_for(attempt)
    }

    /// Waits out the backoff delay for `attempt`. Returns `false` if the
    /// wait was cancelled or replaced before the delay elapsed.
    pub async fn schedule(&self, attempt: u32) -> bool {
        let (tx, rx) = oneshot::channel::<()>();
        // Replacing the stored sender drops the previous one, which wakes
        // (and cancels) any wait still pending on it.
        *self.pending.lock().await = Some(tx);

        let delay = self.delay_for(attempt);
        debug!(target: "Socket", "Reconnect attempt {attempt} scheduled in {delay:?}");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                self.pending.lock().await.take();
                true
            }
            _ = rx => false,
        }
    }

    /// Cancels the pending wait, if any.
    pub async fn cancel(&self) {
        self.pending.lock().await.take();
    }
}
