//! Seam to the external media engine.
//!
//! The engine owns devices, codecs and the actual peer connection; this
//! crate only drives the offer/answer/candidate exchange through it.
//! Connection-state changes travel the other way: the embedder forwards
//! them into [`crate::calls::CallManager::on_media_state`].

use async_trait::async_trait;
use thiserror::Error;

use crate::message::IceCandidate;
use crate::types::MediaKind;

/// Error reported by the media engine.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media permission denied: {0}")]
    PermissionDenied(String),

    #[error("media device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("negotiation error: {0}")]
    Negotiation(String),
}

/// Connection state reported by the media engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

/// The external media-negotiation collaborator.
#[async_trait]
pub trait MediaNegotiator: Send + Sync {
    /// Acquires local media and produces an offer description.
    async fn create_offer(&self, media: MediaKind) -> Result<String, MediaError>;

    /// Acquires local media and produces an answer for `offer`.
    async fn create_answer(&self, offer: &str, media: MediaKind) -> Result<String, MediaError>;

    /// Applies the remote answer on the caller side.
    async fn set_remote_answer(&self, answer: &str) -> Result<(), MediaError>;

    /// Applies a remote network candidate.
    async fn add_remote_candidate(&self, candidate: &IceCandidate) -> Result<(), MediaError>;

    /// Releases local and remote media resources.
    async fn close(&self);
}
