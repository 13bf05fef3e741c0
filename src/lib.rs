//! Real-time session transport and call negotiation core.
//!
//! A resilient duplex signaling channel ([`socket::SignalingSocket`]),
//! a room/roster membership protocol ([`session::RoomSession`]), and a
//! peer media-negotiation state machine ([`calls::CallManager`]) shared
//! by team chat, channel chat and roundtable sessions.

pub mod calls;
pub mod config;
pub mod handlers;
pub mod message;
pub mod reconnect;
pub mod session;
pub mod socket;
pub mod transport;
pub mod types;

pub use calls::{CallManager, MediaConnectionState, MediaError, MediaNegotiator};
pub use config::SocketConfig;
pub use message::{ClientFrame, IceCandidate, ServerFrame};
pub use reconnect::BackoffPolicy;
pub use session::{RoomSession, SessionError, SessionScope};
pub use socket::{ConnectionState, FrameSink, SignalingSocket, SocketError, SocketEvent};
pub use types::events::EventBus;
pub use types::{CallId, MediaKind, ParticipantId};
