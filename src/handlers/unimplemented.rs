use super::traits::FrameHandler;
use crate::message::{CALL_FRAME_KINDS, ServerFrame};
use crate::session::RoomSession;
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;

/// Catch-all handler for frame kinds the session was configured
/// without; logs and drops them instead of leaving them unrouted.
pub struct UnimplementedHandler {
    kinds: &'static [&'static str],
}

impl UnimplementedHandler {
    /// Sessions constructed without a call manager still receive call
    /// frames when a peer dials; swallow them quietly.
    pub fn for_calls() -> Self {
        Self {
            kinds: CALL_FRAME_KINDS,
        }
    }
}

#[async_trait]
impl FrameHandler for UnimplementedHandler {
    fn kinds(&self) -> &'static [&'static str] {
        self.kinds
    }

    async fn handle(&self, _session: Arc<RoomSession>, frame: &ServerFrame) -> bool {
        debug!(
            target: "Session",
            "Ignoring {} frame: no call support configured",
            frame.kind()
        );
        true
    }
}
