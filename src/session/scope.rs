use crate::message::ClientFrame;
use crate::types::ParticipantId;

/// Scoping key for a realtime session.
///
/// Team chat, channel chat and roundtable sessions speak the same
/// protocol; only the scoping key and join kind differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionScope {
    Team { team_id: String },
    Channel { channel_id: String },
    Roundtable { session_id: String },
}

impl SessionScope {
    /// The raw scoping identifier, independent of variant.
    pub fn id(&self) -> &str {
        match self {
            SessionScope::Team { team_id } => team_id,
            SessionScope::Channel { channel_id } => channel_id,
            SessionScope::Roundtable { session_id } => session_id,
        }
    }

    pub(crate) fn join_frame(&self, local: &ParticipantId) -> ClientFrame {
        match self {
            SessionScope::Team { team_id } => ClientFrame::JoinTeam {
                team_id: team_id.clone(),
                participant_id: local.clone(),
            },
            SessionScope::Channel { .. } | SessionScope::Roundtable { .. } => {
                ClientFrame::JoinSession {
                    session_id: self.id().to_string(),
                    participant_id: local.clone(),
                }
            }
        }
    }

    pub(crate) fn leave_frame(&self, local: &ParticipantId) -> ClientFrame {
        ClientFrame::LeaveSession {
            session_id: self.id().to_string(),
            participant_id: local.clone(),
        }
    }
}
