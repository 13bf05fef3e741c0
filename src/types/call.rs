use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned call identifier. Absent locally until the server
/// echoes `call_started` for an outgoing call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Negotiated media kind for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    #[default]
    Audio,
    Video,
}

/// Which side initiated the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDirection {
    Outgoing,
    Incoming,
}

/// Why a call reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Local user hung up (or cancelled before the callee answered).
    Hangup,
    /// Rejected, locally or by the remote side.
    Rejected,
    /// The remote side ended an established call.
    RemoteEnded,
    /// The media engine reported a failed connection.
    MediaFailed,
    /// The media engine lost an established connection.
    ConnectionLost,
    /// Offer/answer or candidate exchange could not be applied.
    NegotiationFailed,
}
