use super::traits::FrameHandler;
use crate::message::ServerFrame;
use crate::session::RoomSession;
use async_trait::async_trait;
use std::sync::Arc;

/// Handler for `typing_indicator` frames.
///
/// Typing is pure set membership driven by what the remote signals; any
/// soft expiry is a UI concern, not a protocol one.
#[derive(Default)]
pub struct TypingHandler;

#[async_trait]
impl FrameHandler for TypingHandler {
    fn kinds(&self) -> &'static [&'static str] {
        &["typing_indicator"]
    }

    async fn handle(&self, session: Arc<RoomSession>, frame: &ServerFrame) -> bool {
        let ServerFrame::TypingIndicator {
            participant_id,
            typing,
        } = frame
        else {
            return false;
        };
        session.apply_typing(participant_id.clone(), *typing).await;
        true
    }
}

/// Handler for `presence_update` frames.
#[derive(Default)]
pub struct PresenceHandler;

#[async_trait]
impl FrameHandler for PresenceHandler {
    fn kinds(&self) -> &'static [&'static str] {
        &["presence_update"]
    }

    async fn handle(&self, session: Arc<RoomSession>, frame: &ServerFrame) -> bool {
        let ServerFrame::PresenceUpdate {
            participant_id,
            status,
        } = frame
        else {
            return false;
        };
        session
            .apply_presence(participant_id.clone(), *status)
            .await;
        true
    }
}
