use super::traits::FrameHandler;
use crate::message::ServerFrame;
use crate::session::RoomSession;
use async_trait::async_trait;
use std::sync::Arc;

/// Handler for `new_message` frames (session-wide broadcast chat).
#[derive(Default)]
pub struct MessageHandler;

#[async_trait]
impl FrameHandler for MessageHandler {
    fn kinds(&self) -> &'static [&'static str] {
        &["new_message"]
    }

    async fn handle(&self, session: Arc<RoomSession>, frame: &ServerFrame) -> bool {
        let ServerFrame::NewMessage { from, body, .. } = frame else {
            return false;
        };
        session.emit_message(from.clone(), body.clone());
        true
    }
}

/// Handler for `private_message` frames.
///
/// Messages are bucketed by the counterpart: the sender unless we sent
/// it ourselves, in which case the recipient. Buckets are created
/// lazily; the counterpart need not be in the roster yet.
#[derive(Default)]
pub struct PrivateMessageHandler;

#[async_trait]
impl FrameHandler for PrivateMessageHandler {
    fn kinds(&self) -> &'static [&'static str] {
        &["private_message"]
    }

    async fn handle(&self, session: Arc<RoomSession>, frame: &ServerFrame) -> bool {
        let ServerFrame::PrivateMessage { from, to, body } = frame else {
            return false;
        };
        session.record_private(from.clone(), to.clone(), body.clone());
        true
    }
}
