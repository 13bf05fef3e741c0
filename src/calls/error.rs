//! Call-related error types.

use thiserror::Error;

use super::negotiator::MediaError;
use super::state::InvalidTransition;
use crate::socket::SocketError;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("no active call")]
    NoActiveCall,

    #[error("a call is already in progress")]
    AlreadyInCall,

    #[error("unknown call id: {0}")]
    UnknownCall(String),

    /// Accept was requested before the remote offer arrived (it may be
    /// inlined in `incoming_call` or follow as `sdp_offer`).
    #[error("no offer received yet for call {0}")]
    OfferMissing(String),

    #[error("media unavailable: {0}")]
    MediaUnavailable(#[source] MediaError),

    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error(transparent)]
    Socket(#[from] SocketError),
}
