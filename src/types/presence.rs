use crate::types::participant::ParticipantId;
use serde::{Deserialize, Serialize};

/// Presence of a roster participant as last reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    #[default]
    Online,
    Typing,
    Away,
}

/// One participant in a session roster. Roster entries are only ever
/// mutated by inbound roster/presence frames, never speculatively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: ParticipantId,
    pub display_name: String,
    #[serde(default)]
    pub presence: PresenceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}
