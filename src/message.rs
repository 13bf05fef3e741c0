//! The signaling envelope: JSON object frames tagged by a `type` field.
//!
//! Team chat, channel chat and roundtable sessions share this envelope;
//! the session scope only changes which join kind is sent.

use crate::types::{CallId, MediaKind, ParticipantId, PresenceStatus, RosterEntry};
use serde::{Deserialize, Serialize};

/// A discovered network path endpoint exchanged between call peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
}

/// Frames sent by this client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    JoinSession {
        session_id: String,
        participant_id: ParticipantId,
    },
    JoinTeam {
        team_id: String,
        participant_id: ParticipantId,
    },
    LeaveSession {
        session_id: String,
        participant_id: ParticipantId,
    },
    SendMessage {
        session_id: String,
        body: String,
    },
    SendPrivateMessage {
        session_id: String,
        to: ParticipantId,
        body: String,
    },
    StartTyping {
        session_id: String,
        participant_id: ParticipantId,
    },
    StopTyping {
        session_id: String,
        participant_id: ParticipantId,
    },
    StartCall {
        session_id: String,
        to: ParticipantId,
        media: MediaKind,
    },
    AcceptCall {
        call_id: CallId,
    },
    RejectCall {
        call_id: CallId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    EndCall {
        call_id: CallId,
    },
    SdpOffer {
        call_id: CallId,
        sdp: String,
    },
    SdpAnswer {
        call_id: CallId,
        sdp: String,
    },
    IceCandidate {
        call_id: CallId,
        candidate: IceCandidate,
    },
}

impl ClientFrame {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientFrame::JoinSession { .. } => "join_session",
            ClientFrame::JoinTeam { .. } => "join_team",
            ClientFrame::LeaveSession { .. } => "leave_session",
            ClientFrame::SendMessage { .. } => "send_message",
            ClientFrame::SendPrivateMessage { .. } => "send_private_message",
            ClientFrame::StartTyping { .. } => "start_typing",
            ClientFrame::StopTyping { .. } => "stop_typing",
            ClientFrame::StartCall { .. } => "start_call",
            ClientFrame::AcceptCall { .. } => "accept_call",
            ClientFrame::RejectCall { .. } => "reject_call",
            ClientFrame::EndCall { .. } => "end_call",
            ClientFrame::SdpOffer { .. } => "sdp_offer",
            ClientFrame::SdpAnswer { .. } => "sdp_answer",
            ClientFrame::IceCandidate { .. } => "ice_candidate",
        }
    }
}

/// Frames received from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    RosterUpdate {
        session_id: String,
        participants: Vec<RosterEntry>,
    },
    NewMessage {
        session_id: String,
        from: ParticipantId,
        body: String,
    },
    PrivateMessage {
        from: ParticipantId,
        to: ParticipantId,
        body: String,
    },
    TypingIndicator {
        participant_id: ParticipantId,
        typing: bool,
    },
    PresenceUpdate {
        participant_id: ParticipantId,
        status: PresenceStatus,
    },
    CallStarted {
        call_id: CallId,
    },
    /// The offer may be inlined here or delivered as a follow-up
    /// `sdp_offer` frame; receivers must tolerate both sequences.
    IncomingCall {
        call_id: CallId,
        caller_id: ParticipantId,
        media: MediaKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offer: Option<String>,
    },
    CallAccepted {
        call_id: CallId,
    },
    CallRejected {
        call_id: CallId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    CallEnded {
        call_id: CallId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    SdpOffer {
        call_id: CallId,
        sdp: String,
    },
    SdpAnswer {
        call_id: CallId,
        sdp: String,
    },
    IceCandidate {
        call_id: CallId,
        candidate: IceCandidate,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        message: String,
    },
}

/// The call-signaling subset of inbound frame kinds, routed as a group.
pub const CALL_FRAME_KINDS: &[&str] = &[
    "call_started",
    "incoming_call",
    "call_accepted",
    "call_rejected",
    "call_ended",
    "sdp_offer",
    "sdp_answer",
    "ice_candidate",
];

impl ServerFrame {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::RosterUpdate { .. } => "roster_update",
            ServerFrame::NewMessage { .. } => "new_message",
            ServerFrame::PrivateMessage { .. } => "private_message",
            ServerFrame::TypingIndicator { .. } => "typing_indicator",
            ServerFrame::PresenceUpdate { .. } => "presence_update",
            ServerFrame::CallStarted { .. } => "call_started",
            ServerFrame::IncomingCall { .. } => "incoming_call",
            ServerFrame::CallAccepted { .. } => "call_accepted",
            ServerFrame::CallRejected { .. } => "call_rejected",
            ServerFrame::CallEnded { .. } => "call_ended",
            ServerFrame::SdpOffer { .. } => "sdp_offer",
            ServerFrame::SdpAnswer { .. } => "sdp_answer",
            ServerFrame::IceCandidate { .. } => "ice_candidate",
            ServerFrame::Error { .. } => "error",
        }
    }

    pub fn is_call_frame(&self) -> bool {
        CALL_FRAME_KINDS.contains(&self.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParticipantId;

    #[test]
    fn join_frame_wire_shape() {
        let frame = ClientFrame::JoinSession {
            session_id: "room-7".to_string(),
            participant_id: ParticipantId::new("alice"),
        };
        let json = frame.encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "join_session");
        assert_eq!(value["session_id"], "room-7");
        assert_eq!(value["participant_id"], "alice");
    }

    #[test]
    fn incoming_call_offer_is_optional() {
        let inline: ServerFrame = ServerFrame::decode(
            r#"{"type":"incoming_call","call_id":"c1","caller_id":"bob","media":"video","offer":"v=0 inline"}"#,
        )
        .unwrap();
        match inline {
            ServerFrame::IncomingCall { offer, media, .. } => {
                assert_eq!(offer.as_deref(), Some("v=0 inline"));
                assert_eq!(media, crate::types::MediaKind::Video);
            }
            other => panic!("unexpected frame: {other:?}"),
        }

        let separate: ServerFrame = ServerFrame::decode(
            r#"{"type":"incoming_call","call_id":"c1","caller_id":"bob","media":"audio"}"#,
        )
        .unwrap();
        match separate {
            ServerFrame::IncomingCall { offer, .. } => assert!(offer.is_none()),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn ice_candidate_round_trip() {
        let frame = ClientFrame::IceCandidate {
            call_id: "c9".into(),
            candidate: IceCandidate {
                candidate: "candidate:0 1 UDP 2122252543 192.0.2.1 54321 typ host".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_m_line_index: Some(0),
            },
        };
        let json = frame.encode().unwrap();
        let back: ClientFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame, back);
    }

    #[test]
    fn malformed_frames_are_decode_errors() {
        assert!(ServerFrame::decode("not json").is_err());
        assert!(ServerFrame::decode(r#"{"type":"no_such_kind"}"#).is_err());
        assert!(ServerFrame::decode(r#"{"type":"call_started"}"#).is_err());
    }

    #[test]
    fn call_frame_kinds_match_kind_strings() {
        let frame = ServerFrame::CallStarted {
            call_id: "c1".into(),
        };
        assert!(frame.is_call_frame());
        let frame = ServerFrame::Error {
            code: None,
            message: "nope".to_string(),
        };
        assert!(!frame.is_call_frame());
    }
}
