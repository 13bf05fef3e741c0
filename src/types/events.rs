//! Typed event bus: one broadcast channel per event kind.

use std::sync::Arc;
use tokio::sync::broadcast;

use chrono::{DateTime, Utc};

use crate::calls::state::CallState;
use crate::types::call::{CallDirection, CallId, MediaKind};
use crate::types::participant::ParticipantId;
use crate::types::presence::{PresenceStatus, RosterEntry};

// The size of the broadcast channel buffer.
const CHANNEL_CAPACITY: usize = 100;

/// The connection (or a reconnection) is up.
#[derive(Debug, Clone)]
pub struct Connected;

/// The connection dropped. `will_retry` is false only for an explicit
/// close.
#[derive(Debug, Clone)]
pub struct Disconnected {
    pub will_retry: bool,
}

/// The transport gave up after its attempt ceiling; a manual reconnect
/// is required.
#[derive(Debug, Clone)]
pub struct ReconnectExhausted {
    pub attempts: u32,
}

/// Full roster snapshot for the joined session.
#[derive(Debug, Clone)]
pub struct RosterUpdate {
    pub session_id: String,
    pub participants: Vec<RosterEntry>,
}

/// A broadcast chat message in the joined session.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub from: ParticipantId,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

/// A direct message, bucketed under `counterpart` (the other side of
/// the exchange regardless of direction).
#[derive(Debug, Clone)]
pub struct PrivateMessage {
    pub counterpart: ParticipantId,
    pub from: ParticipantId,
    pub to: ParticipantId,
    pub body: String,
    pub at: DateTime<Utc>,
}

/// A participant started or stopped typing.
#[derive(Debug, Clone)]
pub struct TypingUpdate {
    pub participant: ParticipantId,
    pub typing: bool,
}

/// A participant's presence changed.
#[derive(Debug, Clone)]
pub struct PresenceEvent {
    pub participant: ParticipantId,
    pub status: PresenceStatus,
}

/// Snapshot of a call's lifecycle, published on every state change.
/// `call_id` is `None` until the server assigns one.
#[derive(Debug, Clone)]
pub struct CallUpdate {
    pub call_id: Option<CallId>,
    pub peer: ParticipantId,
    pub direction: CallDirection,
    pub media: MediaKind,
    pub state: CallState,
}

/// Server-reported `error` frame; the session remains joined.
#[derive(Debug, Clone)]
pub struct SessionErrorEvent {
    pub code: Option<String>,
    pub message: String,
}

// Macro to generate EventBus fields and constructor
macro_rules! define_event_bus {
    ($(($field:ident, $type:ty)),* $(,)?) => {
        /// Typed event bus that provides separate broadcast channels for each event type.
        #[derive(Debug)]
        pub struct EventBus {
            $(
                pub $field: broadcast::Sender<$type>,
            )*
        }

        impl EventBus {
            pub fn new() -> Self {
                Self {
                    $(
                        $field: broadcast::channel(CHANNEL_CAPACITY).0,
                    )*
                }
            }
        }
    };
}

define_event_bus! {
    // Connection events
    (connected, Arc<Connected>),
    (disconnected, Arc<Disconnected>),
    (reconnect_exhausted, Arc<ReconnectExhausted>),

    // Session events
    (roster, Arc<RosterUpdate>),
    (message, Arc<ChatMessage>),
    (private_message, Arc<PrivateMessage>),
    (typing, Arc<TypingUpdate>),
    (presence, Arc<PresenceEvent>),
    (session_error, Arc<SessionErrorEvent>),

    // Call events
    (call, Arc<CallUpdate>),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
