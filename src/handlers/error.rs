use super::traits::FrameHandler;
use crate::message::ServerFrame;
use crate::session::RoomSession;
use async_trait::async_trait;
use log::warn;
use std::sync::Arc;

/// Handler for server-reported `error` frames.
///
/// Domain errors are surfaced to subscribers; the session stays joined
/// unless the server also closes the connection.
#[derive(Default)]
pub struct ServerErrorHandler;

#[async_trait]
impl FrameHandler for ServerErrorHandler {
    fn kinds(&self) -> &'static [&'static str] {
        &["error"]
    }

    async fn handle(&self, session: Arc<RoomSession>, frame: &ServerFrame) -> bool {
        let ServerFrame::Error { code, message } = frame else {
            return false;
        };
        warn!(
            target: "Session",
            "Server error{}: {message}",
            code.as_deref()
                .map(|c| format!(" ({c})"))
                .unwrap_or_default()
        );
        session.emit_session_error(code.clone(), message.clone());
        true
    }
}
