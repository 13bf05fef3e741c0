use crate::reconnect::{BackoffPolicy, MAX_RECONNECT_ATTEMPTS};
use std::time::Duration;

/// Tuning knobs for a [`crate::socket::SignalingSocket`].
///
/// The defaults are the contractual values: exponential backoff from 1s,
/// capped at 30s, giving up after 5 consecutive drops.
#[derive(Debug, Clone, Copy)]
pub struct SocketConfig {
    /// Delay strategy between reconnect attempts.
    pub backoff: BackoffPolicy,
    /// Consecutive drops tolerated before reporting exhaustion.
    pub max_attempts: u32,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            max_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl SocketConfig {
    /// The room-channel variant: a fixed 2s step per attempt instead of
    /// exponential growth.
    pub fn room_channel() -> Self {
        Self {
            backoff: BackoffPolicy::Linear {
                step: Duration::from_secs(2),
            },
            ..Self::default()
        }
    }
}
