//! Call frame handler: routes the call-signaling subset of inbound
//! frames to the [`CallManager`].

use super::manager::CallManager;
use crate::handlers::traits::FrameHandler;
use crate::message::{CALL_FRAME_KINDS, ServerFrame};
use crate::session::RoomSession;
use async_trait::async_trait;
use std::sync::Arc;

pub struct CallHandler {
    manager: Arc<CallManager>,
}

impl CallHandler {
    pub fn new(manager: Arc<CallManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl FrameHandler for CallHandler {
    fn kinds(&self) -> &'static [&'static str] {
        CALL_FRAME_KINDS
    }

    async fn handle(&self, _session: Arc<RoomSession>, frame: &ServerFrame) -> bool {
        self.manager.handle_frame(frame).await;
        true
    }
}
