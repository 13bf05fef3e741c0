//! Call session state machine.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use crate::message::IceCandidate;
use crate::types::{CallDirection, CallId, EndReason, MediaKind, ParticipantId};

/// Current state of a call. Idle is represented by the absence of a
/// [`CallSession`] on the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum CallState {
    /// Outgoing call: local media acquired, offer held, waiting for the
    /// server to assign a call id.
    Initiating,
    /// Outgoing call: offer sent, waiting for the callee.
    Ringing { offer_sent_at: DateTime<Utc> },
    /// Incoming call: ringing locally, waiting for accept or reject.
    IncomingRinging { received_at: DateTime<Utc> },
    /// Accepted on either side, establishing the media connection.
    Connecting { accepted_at: DateTime<Utc> },
    /// Media flowing.
    Active { connected_at: DateTime<Utc> },
    /// Terminal.
    Ended {
        reason: EndReason,
        ended_at: DateTime<Utc>,
        duration_secs: Option<i64>,
    },
}

impl CallState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn is_ringing(&self) -> bool {
        matches!(self, Self::Ringing { .. } | Self::IncomingRinging { .. })
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, Self::Ended { .. })
    }

    pub fn can_accept(&self) -> bool {
        matches!(self, Self::IncomingRinging { .. })
    }

    pub fn can_reject(&self) -> bool {
        matches!(
            self,
            Self::Initiating | Self::Ringing { .. } | Self::IncomingRinging { .. }
        )
    }
}

/// State transitions for calls.
#[derive(Debug, Clone)]
pub enum CallTransition {
    /// The server echoed `call_started` and assigned the call id.
    CallIdAssigned,
    /// The local user accepted an incoming call.
    LocalAccepted,
    /// The remote side accepted our outgoing call.
    RemoteAccepted,
    /// The media engine reported its transport connected.
    MediaConnected,
    /// Any non-terminal state ends here.
    Terminated { reason: EndReason },
}

/// Apply-transition failure: the trigger does not fit the current state.
#[derive(Debug, Clone)]
pub struct InvalidTransition {
    pub current_state: String,
    pub attempted: String,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} in state {}",
            self.attempted, self.current_state
        )
    }
}

impl std::error::Error for InvalidTransition {}

/// One call between the local participant and a peer.
///
/// Invariants: at most one non-terminal session exists per manager, and
/// the candidate queue is non-empty only while the remote description is
/// unset; it is drained exactly once when the description is applied.
#[derive(Debug, Clone)]
pub struct CallSession {
    pub call_id: Option<CallId>,
    pub peer: ParticipantId,
    pub direction: CallDirection,
    pub media: MediaKind,
    pub state: CallState,
    pub created_at: DateTime<Utc>,
    pending_offer: Option<String>,
    remote_offer: Option<String>,
    remote_description_set: bool,
    candidate_queue: VecDeque<IceCandidate>,
}

impl CallSession {
    pub fn new_outgoing(peer: ParticipantId, media: MediaKind) -> Self {
        Self {
            call_id: None,
            peer,
            direction: CallDirection::Outgoing,
            media,
            state: CallState::Initiating,
            created_at: Utc::now(),
            pending_offer: None,
            remote_offer: None,
            remote_description_set: false,
            candidate_queue: VecDeque::new(),
        }
    }

    pub fn new_incoming(
        call_id: CallId,
        peer: ParticipantId,
        media: MediaKind,
        offer: Option<String>,
    ) -> Self {
        Self {
            call_id: Some(call_id),
            peer,
            direction: CallDirection::Incoming,
            media,
            state: CallState::IncomingRinging {
                received_at: Utc::now(),
            },
            created_at: Utc::now(),
            pending_offer: None,
            remote_offer: offer,
            remote_description_set: false,
            candidate_queue: VecDeque::new(),
        }
    }

    /// Apply a state transition. Returns an error if the transition is
    /// invalid for the current state.
    pub fn apply_transition(&mut self, transition: CallTransition) -> Result<(), InvalidTransition> {
        let new_state = match (&self.state, transition) {
            (CallState::Initiating, CallTransition::CallIdAssigned) => CallState::Ringing {
                offer_sent_at: Utc::now(),
            },
            (
                CallState::Initiating | CallState::Ringing { .. },
                CallTransition::RemoteAccepted,
            ) => CallState::Connecting {
                accepted_at: Utc::now(),
            },
            (CallState::IncomingRinging { .. }, CallTransition::LocalAccepted) => {
                CallState::Connecting {
                    accepted_at: Utc::now(),
                }
            }
            (CallState::Connecting { .. }, CallTransition::MediaConnected) => CallState::Active {
                connected_at: Utc::now(),
            },
            (CallState::Active { connected_at }, CallTransition::Terminated { reason }) => {
                let duration = Utc::now()
                    .signed_duration_since(*connected_at)
                    .num_seconds();
                CallState::Ended {
                    reason,
                    ended_at: Utc::now(),
                    duration_secs: Some(duration),
                }
            }
            (current, CallTransition::Terminated { reason }) if !current.is_ended() => {
                CallState::Ended {
                    reason,
                    ended_at: Utc::now(),
                    duration_secs: None,
                }
            }
            (current, transition) => {
                return Err(InvalidTransition {
                    current_state: format!("{:?}", current),
                    attempted: format!("{:?}", transition),
                });
            }
        };
        self.state = new_state;
        Ok(())
    }

    /// Caller side: hold the locally generated offer until the server
    /// assigns a call id.
    pub fn hold_pending_offer(&mut self, sdp: String) {
        self.pending_offer = Some(sdp);
    }

    pub fn take_pending_offer(&mut self) -> Option<String> {
        self.pending_offer.take()
    }

    pub fn has_pending_offer(&self) -> bool {
        self.pending_offer.is_some()
    }

    /// Callee side: buffer the remote offer (inlined in `incoming_call`
    /// or delivered as a follow-up `sdp_offer`) until accept.
    pub fn buffer_remote_offer(&mut self, sdp: String) {
        self.remote_offer = Some(sdp);
    }

    pub fn remote_offer(&self) -> Option<&str> {
        self.remote_offer.as_deref()
    }

    pub fn remote_description_set(&self) -> bool {
        self.remote_description_set
    }

    /// Buffer an inbound candidate that arrived before the remote
    /// description.
    pub fn push_candidate(&mut self, candidate: IceCandidate) {
        self.candidate_queue.push_back(candidate);
    }

    pub fn queued_candidates(&self) -> usize {
        self.candidate_queue.len()
    }

    /// Marks the remote description as applied and hands out the
    /// buffered candidates in arrival order. Subsequent calls return an
    /// empty list: the queue is drained exactly once.
    pub fn mark_remote_description(&mut self) -> Vec<IceCandidate> {
        self.remote_description_set = true;
        self.candidate_queue.drain(..).collect()
    }

    /// Drops all negotiation intermediates on the cleanup path.
    pub fn clear_negotiation_state(&mut self) {
        self.pending_offer = None;
        self.remote_offer = None;
        self.candidate_queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_outgoing_call() -> CallSession {
        CallSession::new_outgoing(ParticipantId::new("peer-b"), MediaKind::Audio)
    }

    fn make_incoming_call() -> CallSession {
        CallSession::new_incoming(
            CallId::new("c1"),
            ParticipantId::new("peer-a"),
            MediaKind::Video,
            None,
        )
    }

    /// Flow: Initiating → Ringing → Connecting → Active → Ended
    #[test]
    fn outgoing_call_flow() {
        let mut call = make_outgoing_call();
        assert!(matches!(call.state, CallState::Initiating));

        call.apply_transition(CallTransition::CallIdAssigned)
            .unwrap();
        assert!(call.state.is_ringing());

        call.apply_transition(CallTransition::RemoteAccepted)
            .unwrap();
        assert!(matches!(call.state, CallState::Connecting { .. }));

        call.apply_transition(CallTransition::MediaConnected)
            .unwrap();
        assert!(call.state.is_active());

        call.apply_transition(CallTransition::Terminated {
            reason: EndReason::Hangup,
        })
        .unwrap();
        assert!(call.state.is_ended());

        if let CallState::Ended { duration_secs, .. } = call.state {
            assert!(duration_secs.is_some());
        }
    }

    /// The accept echo may beat the `call_started` echo; the table
    /// allows RemoteAccepted straight out of Initiating.
    #[test]
    fn remote_accept_from_initiating() {
        let mut call = make_outgoing_call();
        call.apply_transition(CallTransition::RemoteAccepted)
            .unwrap();
        assert!(matches!(call.state, CallState::Connecting { .. }));
    }

    /// Flow: IncomingRinging → Connecting → Active → Ended
    #[test]
    fn incoming_call_flow() {
        let mut call = make_incoming_call();
        assert!(call.state.is_ringing());
        assert!(call.state.can_accept());

        call.apply_transition(CallTransition::LocalAccepted).unwrap();
        assert!(matches!(call.state, CallState::Connecting { .. }));

        call.apply_transition(CallTransition::MediaConnected)
            .unwrap();
        assert!(call.state.is_active());

        call.apply_transition(CallTransition::Terminated {
            reason: EndReason::RemoteEnded,
        })
        .unwrap();
        assert!(call.state.is_ended());
    }

    #[test]
    fn rejection_ends_without_a_duration() {
        let mut call = make_incoming_call();
        assert!(call.state.can_reject());

        call.apply_transition(CallTransition::Terminated {
            reason: EndReason::Rejected,
        })
        .unwrap();

        match call.state {
            CallState::Ended {
                reason,
                duration_secs,
                ..
            } => {
                assert_eq!(reason, EndReason::Rejected);
                assert!(duration_secs.is_none());
            }
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let mut call = make_outgoing_call();

        assert!(call.apply_transition(CallTransition::LocalAccepted).is_err());
        assert!(call.apply_transition(CallTransition::MediaConnected).is_err());
    }

    #[test]
    fn ended_calls_reject_further_transitions() {
        let mut call = make_incoming_call();
        call.apply_transition(CallTransition::Terminated {
            reason: EndReason::Rejected,
        })
        .unwrap();

        assert!(call.apply_transition(CallTransition::LocalAccepted).is_err());
        assert!(call.apply_transition(CallTransition::MediaConnected).is_err());
        assert!(
            call.apply_transition(CallTransition::Terminated {
                reason: EndReason::Hangup,
            })
            .is_err()
        );
    }

    #[test]
    fn candidate_queue_drains_exactly_once() {
        let mut call = make_incoming_call();
        for n in 0..3 {
            call.push_candidate(IceCandidate {
                candidate: format!("candidate-{n}"),
                sdp_mid: None,
                sdp_m_line_index: Some(n),
            });
        }
        assert_eq!(call.queued_candidates(), 3);
        assert!(!call.remote_description_set());

        let drained = call.mark_remote_description();
        let order: Vec<_> = drained.iter().map(|c| c.candidate.as_str()).collect();
        assert_eq!(order, vec!["candidate-0", "candidate-1", "candidate-2"]);
        assert_eq!(call.queued_candidates(), 0);
        assert!(call.remote_description_set());

        // A second drain hands out nothing.
        assert!(call.mark_remote_description().is_empty());
    }

    #[test]
    fn cleanup_clears_all_negotiation_state() {
        let mut call = make_outgoing_call();
        call.hold_pending_offer("v=0 offer".to_string());
        call.push_candidate(IceCandidate {
            candidate: "candidate-x".to_string(),
            sdp_mid: None,
            sdp_m_line_index: None,
        });

        call.clear_negotiation_state();
        assert!(!call.has_pending_offer());
        assert!(call.remote_offer().is_none());
        assert_eq!(call.queued_candidates(), 0);
    }
}
