//! Call negotiation over the session's signaling channel.
//!
//! # Architecture
//!
//! - [`CallState`] & [`CallSession`]: per-call state machine with
//!   out-of-order candidate buffering
//! - [`CallManager`]: orchestrates the call lifecycle; at most one
//!   non-terminal call per manager
//! - [`CallHandler`]: routes inbound call frames into the manager
//! - [`MediaNegotiator`]: seam to the external media engine
//!
//! # Protocol overview
//!
//! An outgoing call holds its offer until the server assigns a call id
//! (`call_started`), then flushes it as `sdp_offer`. An incoming call
//! may carry its offer inline or receive it as a follow-up frame; both
//! sequences are buffered until the local user accepts. Inbound network
//! candidates that beat the remote description are queued and drained
//! exactly once, in arrival order.

mod error;
mod handler;
mod manager;
mod negotiator;
pub mod state;


pub use error::CallError;
pub use handler::CallHandler;
pub use manager::CallManager;
pub use negotiator::{MediaConnectionState, MediaError, MediaNegotiator};
pub use state::{CallSession, CallState, CallTransition, InvalidTransition};
