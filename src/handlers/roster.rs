use super::traits::FrameHandler;
use crate::message::ServerFrame;
use crate::session::RoomSession;
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;

/// Handler for `roster_update` frames.
///
/// Roster frames carry full snapshots, not deltas; the session replaces
/// its roster wholesale. The first snapshot after a join frame confirms
/// the membership.
#[derive(Default)]
pub struct RosterHandler;

#[async_trait]
impl FrameHandler for RosterHandler {
    fn kinds(&self) -> &'static [&'static str] {
        &["roster_update"]
    }

    async fn handle(&self, session: Arc<RoomSession>, frame: &ServerFrame) -> bool {
        let ServerFrame::RosterUpdate {
            session_id,
            participants,
        } = frame
        else {
            return false;
        };
        debug!(
            target: "Session",
            "Roster snapshot for {session_id}: {} participants",
            participants.len()
        );
        session
            .apply_roster(session_id.clone(), participants.clone())
            .await;
        true
    }
}
