use crate::message::ServerFrame;
use crate::session::RoomSession;
use async_trait::async_trait;
use std::sync::Arc;

/// Processes inbound frames of one or more kinds.
///
/// Handlers are stateless; all session state they touch lives on the
/// [`RoomSession`] passed at dispatch time.
#[async_trait]
pub trait FrameHandler: Send + Sync {
    /// The envelope `type` tags this handler consumes.
    fn kinds(&self) -> &'static [&'static str];

    /// Process a frame. Returns `true` if the frame was handled.
    async fn handle(&self, session: Arc<RoomSession>, frame: &ServerFrame) -> bool;
}
