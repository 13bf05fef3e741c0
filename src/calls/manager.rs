//! Call manager: the per-session negotiation state machine.
//!
//! One manager exists per (local participant, transport) pair, and at
//! most one non-terminal [`CallSession`] lives on it at a time. All
//! transitions happen on the session dispatch loop or a local user
//! action, so the `RwLock` only guards against readers observing a
//! half-applied transition.

use super::error::CallError;
use super::negotiator::{MediaConnectionState, MediaError, MediaNegotiator};
use super::state::{CallSession, CallState, CallTransition, InvalidTransition};
use crate::message::{ClientFrame, IceCandidate, ServerFrame};
use crate::socket::FrameSink;
use crate::types::events::{CallUpdate, EventBus};
use crate::types::{CallDirection, CallId, EndReason, MediaKind, ParticipantId};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct CallManager {
    local: ParticipantId,
    negotiator: Arc<dyn MediaNegotiator>,
    sink: Arc<dyn FrameSink>,
    bus: Arc<EventBus>,
    session: RwLock<Option<CallSession>>,
}

impl CallManager {
    pub fn new(
        local: ParticipantId,
        negotiator: Arc<dyn MediaNegotiator>,
        sink: Arc<dyn FrameSink>,
        bus: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new(Self {
            local,
            negotiator,
            sink,
            bus,
            session: RwLock::new(None),
        })
    }

    pub fn local_participant(&self) -> &ParticipantId {
        &self.local
    }

    /// A copy of the current call session, if any. `None` means Idle.
    pub async fn snapshot(&self) -> Option<CallSession> {
        self.session.read().await.clone()
    }

    // -- local user actions ----------------------------------------------

    /// Starts an outgoing call: acquires local media, holds the offer
    /// until the server assigns a call id, and sends `start_call`.
    ///
    /// Media-acquisition failure aborts before any frame is sent and
    /// leaves the manager Idle.
    pub async fn start_call(
        &self,
        session_id: &str,
        peer: ParticipantId,
        media: MediaKind,
    ) -> Result<(), CallError> {
        {
            let mut guard = self.session.write().await;
            if guard.as_ref().is_some_and(|s| !s.state.is_ended()) {
                return Err(CallError::AlreadyInCall);
            }
            *guard = Some(CallSession::new_outgoing(peer.clone(), media));
        }

        let offer = match self.negotiator.create_offer(media).await {
            Ok(offer) => offer,
            Err(e) => {
                *self.session.write().await = None;
                return Err(CallError::MediaUnavailable(e));
            }
        };

        let torn_down = {
            let mut guard = self.session.write().await;
            match guard.as_mut() {
                Some(s) if matches!(s.state, CallState::Initiating) => {
                    s.hold_pending_offer(offer);
                    false
                }
                // Torn down while we waited on media acquisition.
                _ => true,
            }
        };
        if torn_down {
            self.negotiator.close().await;
            return Err(CallError::NoActiveCall);
        }
        self.publish_current().await;

        info!(target: "Calls", "Starting {media:?} call to {peer}");
        let frame = ClientFrame::StartCall {
            session_id: session_id.to_string(),
            to: peer,
            media,
        };
        if let Err(e) = self.sink.send(&frame).await {
            self.negotiator.close().await;
            *self.session.write().await = None;
            return Err(e.into());
        }
        Ok(())
    }

    /// Accepts the ringing incoming call: builds the answer from the
    /// buffered offer, sends `accept_call` + `sdp_answer`, and drains
    /// any buffered candidates.
    pub async fn accept_call(&self, call_id: &CallId) -> Result<(), CallError> {
        let (offer, media) = {
            let guard = self.session.read().await;
            let s = guard.as_ref().ok_or(CallError::NoActiveCall)?;
            if s.call_id.as_ref() != Some(call_id) {
                return Err(CallError::UnknownCall(call_id.to_string()));
            }
            if !s.state.can_accept() {
                return Err(CallError::InvalidTransition(InvalidTransition {
                    current_state: format!("{:?}", s.state),
                    attempted: "LocalAccepted".to_string(),
                }));
            }
            let offer = s
                .remote_offer()
                .map(str::to_owned)
                .ok_or_else(|| CallError::OfferMissing(call_id.to_string()))?;
            (offer, s.media)
        };

        let answer = self
            .negotiator
            .create_answer(&offer, media)
            .await
            .map_err(CallError::MediaUnavailable)?;

        let transitioned = {
            let mut guard = self.session.write().await;
            match guard.as_mut() {
                Some(s) if s.call_id.as_ref() == Some(call_id) && s.state.can_accept() => {
                    let result = s
                        .apply_transition(CallTransition::LocalAccepted)
                        .map(|_| s.mark_remote_description());
                    Some(result)
                }
                // Ended while we waited on media acquisition.
                _ => None,
            }
        };
        let drained = match transitioned {
            Some(result) => result?,
            None => {
                self.negotiator.close().await;
                return Err(CallError::NoActiveCall);
            }
        };
        self.publish_current().await;

        info!(target: "Calls", "Accepting call {call_id}");
        self.sink
            .send(&ClientFrame::AcceptCall {
                call_id: call_id.clone(),
            })
            .await?;
        self.sink
            .send(&ClientFrame::SdpAnswer {
                call_id: call_id.clone(),
                sdp: answer,
            })
            .await?;

        if let Err(e) = self.apply_candidates(drained).await {
            self.fail_negotiation(&format!("applying buffered candidates: {e}"))
                .await;
            return Err(CallError::NegotiationFailed(e.to_string()));
        }
        Ok(())
    }

    /// Rejects the current call. Local state transitions immediately;
    /// the reject frame is fire-and-forget.
    pub async fn reject_call(&self, call_id: &CallId) -> Result<(), CallError> {
        {
            let guard = self.session.read().await;
            let s = guard.as_ref().ok_or(CallError::NoActiveCall)?;
            if s.call_id.as_ref() != Some(call_id) {
                return Err(CallError::UnknownCall(call_id.to_string()));
            }
            if !s.state.can_reject() {
                return Err(CallError::InvalidTransition(InvalidTransition {
                    current_state: format!("{:?}", s.state),
                    attempted: "Reject".to_string(),
                }));
            }
        }
        self.cleanup(EndReason::Rejected).await;
        if let Err(e) = self
            .sink
            .send(&ClientFrame::RejectCall {
                call_id: call_id.clone(),
                reason: None,
            })
            .await
        {
            debug!(target: "Calls", "Reject frame not delivered (ignored): {e}");
        }
        Ok(())
    }

    /// Ends (or cancels) the current call. Local state transitions
    /// immediately; the end frame is fire-and-forget and only sent when
    /// a call id was ever bound.
    pub async fn end_call(&self) -> Result<(), CallError> {
        let call_id = {
            let guard = self.session.read().await;
            let s = guard
                .as_ref()
                .filter(|s| !s.state.is_ended())
                .ok_or(CallError::NoActiveCall)?;
            s.call_id.clone()
        };
        self.cleanup(EndReason::Hangup).await;
        if let Some(call_id) = call_id {
            if let Err(e) = self.sink.send(&ClientFrame::EndCall { call_id }).await {
                debug!(target: "Calls", "End frame not delivered (ignored): {e}");
            }
        }
        Ok(())
    }

    // -- media engine notifications ---------------------------------------

    /// Forwarded by the embedder whenever the media engine reports a
    /// connection-state change.
    pub async fn on_media_state(&self, state: MediaConnectionState) {
        match state {
            MediaConnectionState::Connecting => {
                debug!(target: "Calls", "Media transport connecting");
            }
            MediaConnectionState::Connected => {
                let transitioned = {
                    let mut guard = self.session.write().await;
                    match guard.as_mut() {
                        Some(s) if matches!(s.state, CallState::Connecting { .. }) => {
                            s.apply_transition(CallTransition::MediaConnected).is_ok()
                        }
                        _ => false,
                    }
                };
                if transitioned {
                    self.publish_current().await;
                }
            }
            MediaConnectionState::Failed => {
                self.cleanup(EndReason::MediaFailed).await;
            }
            MediaConnectionState::Disconnected => {
                self.cleanup(EndReason::ConnectionLost).await;
            }
        }
    }

    /// Forwards a locally discovered candidate, tagged with the bound
    /// call id. Candidates discovered before the id is bound are
    /// dropped; only inbound buffering is guaranteed.
    pub async fn send_local_candidate(&self, candidate: IceCandidate) {
        let call_id = {
            self.session
                .read()
                .await
                .as_ref()
                .filter(|s| !s.state.is_ended())
                .and_then(|s| s.call_id.clone())
        };
        match call_id {
            Some(call_id) => {
                if let Err(e) = self
                    .sink
                    .send(&ClientFrame::IceCandidate { call_id, candidate })
                    .await
                {
                    debug!(target: "Calls", "Local candidate not delivered (dropped): {e}");
                }
            }
            None => {
                debug!(target: "Calls", "Dropping local candidate: no call id bound yet");
            }
        }
    }

    // -- inbound frames ---------------------------------------------------

    /// Entry point for inbound call-signaling frames.
    pub async fn handle_frame(&self, frame: &ServerFrame) {
        match frame {
            ServerFrame::CallStarted { call_id } => {
                self.handle_call_started(call_id.clone()).await
            }
            ServerFrame::IncomingCall {
                call_id,
                caller_id,
                media,
                offer,
            } => {
                self.handle_incoming(call_id.clone(), caller_id.clone(), *media, offer.clone())
                    .await
            }
            ServerFrame::CallAccepted { call_id } => {
                self.handle_call_accepted(call_id.clone()).await
            }
            ServerFrame::CallRejected { call_id, .. } => {
                self.handle_remote_terminate(call_id, EndReason::Rejected)
                    .await
            }
            ServerFrame::CallEnded { call_id, .. } => {
                self.handle_remote_terminate(call_id, EndReason::RemoteEnded)
                    .await
            }
            ServerFrame::SdpOffer { call_id, sdp } => {
                self.handle_remote_offer(call_id, sdp.clone()).await
            }
            ServerFrame::SdpAnswer { call_id, sdp } => {
                self.handle_remote_answer(call_id, sdp.clone()).await
            }
            ServerFrame::IceCandidate { call_id, candidate } => {
                self.handle_remote_candidate(call_id, candidate.clone()).await
            }
            other => {
                debug!(target: "Calls", "Not a call frame: {}", other.kind());
            }
        }
    }

    /// The server assigned our outgoing call its id: bind it, flush the
    /// pending offer, move to Ringing.
    async fn handle_call_started(&self, call_id: CallId) {
        let pending = {
            let mut guard = self.session.write().await;
            let Some(s) = guard.as_mut() else {
                debug!(target: "Calls", "call_started {call_id} with no active call, dropping");
                return;
            };
            if s.direction != CallDirection::Outgoing
                || !matches!(s.state, CallState::Initiating)
            {
                debug!(
                    target: "Calls",
                    "Unexpected call_started {call_id} in {:?}, dropping", s.state
                );
                return;
            }
            s.call_id = Some(call_id.clone());
            if let Err(e) = s.apply_transition(CallTransition::CallIdAssigned) {
                warn!(target: "Calls", "{e}");
                return;
            }
            s.take_pending_offer()
        };
        self.publish_current().await;

        if let Some(sdp) = pending {
            debug!(target: "Calls", "Flushing held offer for call {call_id}");
            if let Err(e) = self
                .sink
                .send(&ClientFrame::SdpOffer { call_id, sdp })
                .await
            {
                warn!(target: "Calls", "Offer frame not delivered: {e}");
            }
        }
    }

    /// A peer is calling. If a non-terminal call already exists the new
    /// one is rejected as busy; otherwise it surfaces as pending-accept.
    async fn handle_incoming(
        &self,
        call_id: CallId,
        caller: ParticipantId,
        media: MediaKind,
        offer: Option<String>,
    ) {
        let busy = {
            let mut guard = self.session.write().await;
            if guard.as_ref().is_some_and(|s| !s.state.is_ended()) {
                true
            } else {
                *guard = Some(CallSession::new_incoming(
                    call_id.clone(),
                    caller.clone(),
                    media,
                    offer,
                ));
                false
            }
        };
        if busy {
            info!(target: "Calls", "Rejecting incoming call {call_id} from {caller}: busy");
            let _ = self
                .sink
                .send(&ClientFrame::RejectCall {
                    call_id,
                    reason: Some("busy".to_string()),
                })
                .await;
            return;
        }
        info!(target: "Calls", "Incoming {media:?} call {call_id} from {caller}");
        self.publish_current().await;
    }

    /// Callee accepted our call. Bookkeeping only: the answer follows
    /// as a separate `sdp_answer` frame.
    async fn handle_call_accepted(&self, call_id: CallId) {
        {
            let mut guard = self.session.write().await;
            let Some(s) = guard.as_mut() else {
                debug!(target: "Calls", "call_accepted {call_id} with no active call, dropping");
                return;
            };
            if s.call_id.as_ref() != Some(&call_id) || s.direction != CallDirection::Outgoing {
                debug!(target: "Calls", "Unexpected call_accepted {call_id}, dropping");
                return;
            }
            if let Err(e) = s.apply_transition(CallTransition::RemoteAccepted) {
                warn!(target: "Calls", "{e}");
                return;
            }
        }
        self.publish_current().await;
    }

    /// The offer arrived separately from `incoming_call`; buffer it
    /// until the local user accepts.
    async fn handle_remote_offer(&self, call_id: &CallId, sdp: String) {
        let mut guard = self.session.write().await;
        match guard.as_mut() {
            Some(s)
                if s.call_id.as_ref() == Some(call_id)
                    && s.direction == CallDirection::Incoming
                    && s.state.can_accept() =>
            {
                debug!(target: "Calls", "Buffering offer for call {call_id}");
                s.buffer_remote_offer(sdp);
            }
            _ => {
                debug!(target: "Calls", "Unexpected sdp_offer for {call_id}, dropping");
            }
        }
    }

    /// Caller side: apply the answer, then drain candidates buffered
    /// while the remote description was unset.
    async fn handle_remote_answer(&self, call_id: &CallId, sdp: String) {
        {
            let guard = self.session.read().await;
            match guard.as_ref() {
                Some(s)
                    if s.call_id.as_ref() == Some(call_id)
                        && matches!(s.state, CallState::Connecting { .. })
                        && !s.remote_description_set() => {}
                _ => {
                    debug!(target: "Calls", "Unexpected sdp_answer for {call_id}, dropping");
                    return;
                }
            }
        }

        if let Err(e) = self.negotiator.set_remote_answer(&sdp).await {
            self.fail_negotiation(&format!("applying remote answer: {e}"))
                .await;
            return;
        }

        let drained = {
            let mut guard = self.session.write().await;
            match guard.as_mut() {
                Some(s) if s.call_id.as_ref() == Some(call_id) => s.mark_remote_description(),
                _ => return,
            }
        };
        if let Err(e) = self.apply_candidates(drained).await {
            self.fail_negotiation(&format!("applying buffered candidates: {e}"))
                .await;
        }
    }

    /// Inbound candidate: applied immediately once the remote
    /// description is set, buffered in arrival order before that.
    async fn handle_remote_candidate(&self, call_id: &CallId, candidate: IceCandidate) {
        let apply_now = {
            let mut guard = self.session.write().await;
            match guard.as_mut() {
                Some(s) if s.call_id.as_ref() == Some(call_id) && !s.state.is_ended() => {
                    if s.remote_description_set() {
                        Some(candidate)
                    } else {
                        debug!(
                            target: "Calls",
                            "Buffering candidate for call {call_id} (no remote description yet)"
                        );
                        s.push_candidate(candidate);
                        None
                    }
                }
                _ => {
                    debug!(target: "Calls", "Dropping candidate for unknown call {call_id}");
                    return;
                }
            }
        };
        if let Some(candidate) = apply_now {
            if let Err(e) = self.negotiator.add_remote_candidate(&candidate).await {
                self.fail_negotiation(&format!("applying candidate: {e}"))
                    .await;
            }
        }
    }

    async fn handle_remote_terminate(&self, call_id: &CallId, reason: EndReason) {
        {
            let guard = self.session.read().await;
            match guard.as_ref() {
                Some(s) if s.call_id.as_ref() == Some(call_id) && !s.state.is_ended() => {}
                _ => {
                    debug!(target: "Calls", "Terminate for unknown call {call_id}, dropping");
                    return;
                }
            }
        }
        info!(target: "Calls", "Call {call_id} terminated remotely: {reason:?}");
        self.cleanup(reason).await;
    }

    // -- shared plumbing --------------------------------------------------

    async fn apply_candidates(&self, candidates: Vec<IceCandidate>) -> Result<(), MediaError> {
        for candidate in candidates {
            self.negotiator.add_remote_candidate(&candidate).await?;
        }
        Ok(())
    }

    /// The single teardown path: transition to Ended, clear the session
    /// (back to Idle), release media, publish the terminal update.
    async fn cleanup(&self, reason: EndReason) -> bool {
        let ended = {
            let mut guard = self.session.write().await;
            if guard.as_ref().is_some_and(|s| !s.state.is_ended()) {
                guard.take().map(|mut s| {
                    // Terminated is valid from every non-terminal state.
                    let _ = s.apply_transition(CallTransition::Terminated { reason });
                    s.clear_negotiation_state();
                    s
                })
            } else {
                None
            }
        };
        match ended {
            Some(session) => {
                self.negotiator.close().await;
                self.publish_session(&session);
                true
            }
            None => false,
        }
    }

    async fn fail_negotiation(&self, context: &str) {
        warn!(target: "Calls", "Negotiation failed: {context}");
        self.cleanup(EndReason::NegotiationFailed).await;
    }

    fn publish_session(&self, session: &CallSession) {
        let _ = self.bus.call.send(Arc::new(CallUpdate {
            call_id: session.call_id.clone(),
            peer: session.peer.clone(),
            direction: session.direction,
            media: session.media,
            state: session.state.clone(),
        }));
    }

    async fn publish_current(&self) {
        if let Some(session) = self.session.read().await.as_ref() {
            self.publish_session(session);
        }
    }
}
