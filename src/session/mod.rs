//! The room/session membership protocol: join handshake, roster and
//! presence tracking, message routing, and the call-frame hookup.
//!
//! One [`RoomSession`] is constructed per active session. All state
//! mutations happen either on the dispatch loop ([`RoomSession::run`])
//! or in response to a local user action, never concurrently from two
//! inbound sources.

pub mod roster;
pub mod scope;

pub use scope::SessionScope;

use crate::calls::{CallError, CallManager};
use crate::handlers::chat::{MessageHandler, PrivateMessageHandler};
use crate::handlers::error::ServerErrorHandler;
use crate::handlers::presence::{PresenceHandler, TypingHandler};
use crate::handlers::roster::RosterHandler;
use crate::handlers::router::FrameRouter;
use crate::handlers::unimplemented::UnimplementedHandler;
use crate::message::{ClientFrame, ServerFrame};
use crate::socket::{SignalingSocket, SocketError, SocketEvent};
use crate::types::events::{
    ChatMessage, Connected, Disconnected, EventBus, PresenceEvent, PrivateMessage,
    ReconnectExhausted, RosterUpdate, SessionErrorEvent, TypingUpdate,
};
use crate::types::{CallId, MediaKind, ParticipantId, PresenceStatus, RosterEntry};
use chrono::Utc;
use dashmap::DashMap;
use log::{debug, info, warn};
use roster::RosterState;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock, mpsc};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not joined to a session")]
    NotJoined,

    #[error("call support is not configured for this session")]
    CallsUnavailable,

    #[error(transparent)]
    Call(#[from] CallError),

    #[error(transparent)]
    Socket(#[from] SocketError),
}

/// The local side of a join handshake. Created on `join`, invalidated by
/// `leave` or a scope change. `joined` flips true on the first roster
/// snapshot; it is reset (and the join frame re-sent) after a reconnect.
#[derive(Debug, Clone)]
struct SessionMembership {
    scope: SessionScope,
    joined: bool,
}

/// A scoped realtime session over one [`SignalingSocket`].
pub struct RoomSession {
    local: ParticipantId,
    socket: Arc<SignalingSocket>,
    socket_events: Mutex<Option<mpsc::Receiver<SocketEvent>>>,
    membership: RwLock<Option<SessionMembership>>,
    roster: RwLock<RosterState>,
    private_logs: DashMap<ParticipantId, Vec<PrivateMessage>>,
    router: FrameRouter,
    bus: Arc<EventBus>,
    calls: Option<Arc<CallManager>>,
    running: AtomicBool,
}

impl RoomSession {
    pub fn new(
        socket: Arc<SignalingSocket>,
        socket_events: mpsc::Receiver<SocketEvent>,
        local: ParticipantId,
        bus: Arc<EventBus>,
        calls: Option<Arc<CallManager>>,
    ) -> Arc<Self> {
        let router = Self::build_router(calls.clone());
        Arc::new(Self {
            local,
            socket,
            socket_events: Mutex::new(Some(socket_events)),
            membership: RwLock::new(None),
            roster: RwLock::new(RosterState::default()),
            private_logs: DashMap::new(),
            router,
            bus,
            calls,
            running: AtomicBool::new(false),
        })
    }

    fn build_router(calls: Option<Arc<CallManager>>) -> FrameRouter {
        let mut router = FrameRouter::new();
        router.register(Arc::new(RosterHandler));
        router.register(Arc::new(MessageHandler));
        router.register(Arc::new(PrivateMessageHandler));
        router.register(Arc::new(TypingHandler));
        router.register(Arc::new(PresenceHandler));
        router.register(Arc::new(ServerErrorHandler));
        match calls {
            Some(manager) => router.register(Arc::new(crate::calls::CallHandler::new(manager))),
            None => router.register(Arc::new(UnimplementedHandler::for_calls())),
        }
        router
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn local_participant(&self) -> &ParticipantId {
        &self.local
    }

    pub fn call_manager(&self) -> Option<&Arc<CallManager>> {
        self.calls.as_ref()
    }

    /// Consumes socket events until the socket is dropped or closed.
    /// Spawn this once after construction.
    pub async fn run(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!(target: "Session", "run() called while already running");
            return;
        }
        let Some(mut events) = self.socket_events.lock().await.take() else {
            warn!(target: "Session", "Socket event stream already consumed");
            self.running.store(false, Ordering::SeqCst);
            return;
        };

        while let Some(event) = events.recv().await {
            match event {
                SocketEvent::Connected => self.handle_connected().await,
                SocketEvent::Frame(frame) => self.dispatch(frame).await,
                SocketEvent::Disconnected { will_retry } => {
                    self.handle_disconnected(will_retry).await
                }
                SocketEvent::ReconnectExhausted { attempts } => {
                    warn!(target: "Session", "Transport gave up after {attempts} attempts");
                    let _ = self
                        .bus
                        .reconnect_exhausted
                        .send(Arc::new(ReconnectExhausted { attempts }));
                }
            }
        }
        debug!(target: "Session", "Socket event stream ended");
        self.running.store(false, Ordering::SeqCst);
    }

    async fn handle_connected(&self) {
        let _ = self.bus.connected.send(Arc::new(Connected));

        // Re-issue the join handshake after a reconnect. The server
        // forgot us with the old connection; nothing else is replayed;
        // consumers re-request state on the connected event.
        let rejoin = {
            let mut membership = self.membership.write().await;
            membership.as_mut().map(|m| {
                m.joined = false;
                m.scope.clone()
            })
        };
        if let Some(scope) = rejoin {
            info!(target: "Session", "Re-joining {} after (re)connect", scope.id());
            if let Err(e) = self.socket.send(&scope.join_frame(&self.local)).await {
                warn!(target: "Session", "Join frame failed, will retry on next connect: {e}");
            }
        }
    }

    async fn handle_disconnected(&self, will_retry: bool) {
        if let Some(m) = self.membership.write().await.as_mut() {
            m.joined = false;
        }
        let _ = self
            .bus
            .disconnected
            .send(Arc::new(Disconnected { will_retry }));
    }

    async fn dispatch(self: &Arc<Self>, frame: ServerFrame) {
        if !self.router.dispatch(self.clone(), &frame).await {
            // Unexpected kind: log and drop, never tear down the session.
            debug!(target: "Session", "No handler for frame kind {}", frame.kind());
        }
    }

    /// Sends the join handshake for `scope`. Idempotent for the scope
    /// already joined (or joining): no duplicate join frame is emitted.
    /// Joining a different scope leaves the current one first.
    ///
    /// Success is not assumed until a roster snapshot arrives; if the
    /// socket is down the membership is still recorded and the join
    /// frame goes out automatically on the next connect.
    pub async fn join(&self, scope: SessionScope) -> Result<(), SessionError> {
        {
            let membership = self.membership.read().await;
            if let Some(m) = membership.as_ref() {
                if m.scope == scope {
                    debug!(target: "Session", "Already joined {}, ignoring join", scope.id());
                    return Ok(());
                }
            }
        }
        if self.membership.read().await.is_some() {
            self.leave().await;
        }

        *self.membership.write().await = Some(SessionMembership {
            scope: scope.clone(),
            joined: false,
        });
        info!(target: "Session", "Joining {}", scope.id());
        self.socket
            .send(&scope.join_frame(&self.local))
            .await
            .map_err(SessionError::from)
    }

    /// Leaves the current session. The leave frame is best-effort: local
    /// state is torn down whether or not the frame makes it out.
    pub async fn leave(&self) {
        let Some(membership) = self.membership.write().await.take() else {
            return;
        };
        self.roster.write().await.clear();
        self.private_logs.clear();
        info!(target: "Session", "Leaving {}", membership.scope.id());
        if let Err(e) = self
            .socket
            .send(&membership.scope.leave_frame(&self.local))
            .await
        {
            debug!(target: "Session", "Leave frame not delivered (ignored): {e}");
        }
    }

    /// True once a roster snapshot confirmed the join handshake.
    pub async fn is_joined(&self) -> bool {
        self.membership
            .read()
            .await
            .as_ref()
            .is_some_and(|m| m.joined)
    }

    pub async fn scope(&self) -> Option<SessionScope> {
        self.membership
            .read()
            .await
            .as_ref()
            .map(|m| m.scope.clone())
    }

    async fn scope_id(&self) -> Result<String, SessionError> {
        self.membership
            .read()
            .await
            .as_ref()
            .map(|m| m.scope.id().to_string())
            .ok_or(SessionError::NotJoined)
    }

    /// Sends an arbitrary pre-built frame over the session's socket.
    pub async fn publish(&self, frame: ClientFrame) -> Result<(), SessionError> {
        self.socket.send(&frame).await.map_err(SessionError::from)
    }

    pub async fn send_message(&self, body: impl Into<String>) -> Result<(), SessionError> {
        let session_id = self.scope_id().await?;
        self.publish(ClientFrame::SendMessage {
            session_id,
            body: body.into(),
        })
        .await
    }

    /// Sends a direct message and appends it to the counterpart's local
    /// log so the per-counterpart ordering covers both directions.
    pub async fn send_private_message(
        &self,
        to: ParticipantId,
        body: impl Into<String>,
    ) -> Result<(), SessionError> {
        let session_id = self.scope_id().await?;
        let body = body.into();
        self.publish(ClientFrame::SendPrivateMessage {
            session_id,
            to: to.clone(),
            body: body.clone(),
        })
        .await?;

        let entry = PrivateMessage {
            counterpart: to.clone(),
            from: self.local.clone(),
            to,
            body,
            at: Utc::now(),
        };
        self.private_logs
            .entry(entry.counterpart.clone())
            .or_default()
            .push(entry);
        Ok(())
    }

    pub async fn set_typing(&self, typing: bool) -> Result<(), SessionError> {
        let session_id = self.scope_id().await?;
        let frame = if typing {
            ClientFrame::StartTyping {
                session_id,
                participant_id: self.local.clone(),
            }
        } else {
            ClientFrame::StopTyping {
                session_id,
                participant_id: self.local.clone(),
            }
        };
        self.publish(frame).await
    }

    // -- call passthroughs ------------------------------------------------

    /// Starts an outgoing call to `to` within the joined session.
    pub async fn start_call(&self, to: ParticipantId, media: MediaKind) -> Result<(), SessionError> {
        let session_id = self.scope_id().await?;
        let calls = self.calls.as_ref().ok_or(SessionError::CallsUnavailable)?;
        calls.start_call(&session_id, to, media).await?;
        Ok(())
    }

    pub async fn accept_call(&self, call_id: &CallId) -> Result<(), SessionError> {
        let calls = self.calls.as_ref().ok_or(SessionError::CallsUnavailable)?;
        calls.accept_call(call_id).await?;
        Ok(())
    }

    pub async fn reject_call(&self, call_id: &CallId) -> Result<(), SessionError> {
        let calls = self.calls.as_ref().ok_or(SessionError::CallsUnavailable)?;
        calls.reject_call(call_id).await?;
        Ok(())
    }

    pub async fn end_call(&self) -> Result<(), SessionError> {
        let calls = self.calls.as_ref().ok_or(SessionError::CallsUnavailable)?;
        calls.end_call().await?;
        Ok(())
    }

    // -- read accessors ---------------------------------------------------

    pub async fn roster(&self) -> Vec<RosterEntry> {
        self.roster.read().await.participants()
    }

    pub async fn typing_participants(&self) -> Vec<ParticipantId> {
        self.roster.read().await.typing()
    }

    /// The ordered private-message log for one counterpart.
    pub fn private_log(&self, counterpart: &ParticipantId) -> Vec<PrivateMessage> {
        self.private_logs
            .get(counterpart)
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    // -- handler entry points ---------------------------------------------

    pub(crate) async fn apply_roster(&self, session_id: String, participants: Vec<RosterEntry>) {
        if let Some(m) = self.membership.write().await.as_mut() {
            m.joined = true;
        }
        self.roster.write().await.apply_snapshot(participants.clone());
        let _ = self.bus.roster.send(Arc::new(RosterUpdate {
            session_id,
            participants,
        }));
    }

    pub(crate) fn emit_message(&self, from: ParticipantId, body: String) {
        let _ = self.bus.message.send(Arc::new(ChatMessage {
            from,
            body,
            received_at: Utc::now(),
        }));
    }

    pub(crate) fn record_private(&self, from: ParticipantId, to: ParticipantId, body: String) {
        let counterpart = if from == self.local {
            to.clone()
        } else {
            from.clone()
        };
        let entry = PrivateMessage {
            counterpart: counterpart.clone(),
            from,
            to,
            body,
            at: Utc::now(),
        };
        self.private_logs
            .entry(counterpart)
            .or_default()
            .push(entry.clone());
        let _ = self.bus.private_message.send(Arc::new(entry));
    }

    pub(crate) async fn apply_typing(&self, participant: ParticipantId, typing: bool) {
        let changed = self
            .roster
            .write()
            .await
            .set_typing(participant.clone(), typing);
        if changed {
            let _ = self
                .bus
                .typing
                .send(Arc::new(TypingUpdate { participant, typing }));
        }
    }

    pub(crate) async fn apply_presence(&self, participant: ParticipantId, status: PresenceStatus) {
        self.roster.write().await.set_presence(&participant, status);
        let _ = self
            .bus
            .presence
            .send(Arc::new(PresenceEvent {
                participant,
                status,
            }));
    }

    pub(crate) fn emit_session_error(&self, code: Option<String>, message: String) {
        let _ = self
            .bus
            .session_error
            .send(Arc::new(SessionErrorEvent { code, message }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SocketConfig;
    use crate::transport::mock::MockTransportFactory;

    fn make_session() -> Arc<RoomSession> {
        let (socket, events) = SignalingSocket::new(
            Arc::new(MockTransportFactory::new()),
            SocketConfig::default(),
        );
        RoomSession::new(
            socket,
            events,
            ParticipantId::new("self"),
            Arc::new(EventBus::new()),
            None,
        )
    }

    #[tokio::test]
    async fn private_messages_bucket_by_counterpart() {
        let session = make_session();
        let alice = ParticipantId::new("alice");
        let me = ParticipantId::new("self");

        session.record_private(alice.clone(), me.clone(), "hi".to_string());
        session.record_private(me.clone(), alice.clone(), "hello".to_string());
        session.record_private(alice.clone(), me.clone(), "how are you".to_string());

        let log = session.private_log(&alice);
        let bodies: Vec<_> = log.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["hi", "hello", "how are you"]);
        for entry in &log {
            assert_eq!(entry.counterpart, alice);
        }
    }

    #[tokio::test]
    async fn buckets_are_created_lazily_for_unknown_counterparts() {
        let session = make_session();
        // No roster at all: the counterpart has never been seen.
        let ghost = ParticipantId::new("ghost");
        session.record_private(ghost.clone(), ParticipantId::new("self"), "boo".to_string());
        assert_eq!(session.private_log(&ghost).len(), 1);
    }

    #[tokio::test]
    async fn join_while_disconnected_records_membership() {
        let session = make_session();
        let scope = SessionScope::Roundtable {
            session_id: "rt-9".to_string(),
        };
        // The socket was never connected: the frame fails fast, but the
        // membership sticks so the handshake fires on next connect.
        let result = session.join(scope.clone()).await;
        assert!(matches!(
            result,
            Err(SessionError::Socket(SocketError::NotConnected))
        ));
        assert_eq!(session.scope().await, Some(scope));
        assert!(!session.is_joined().await);
    }

    #[tokio::test]
    async fn roster_snapshot_confirms_join() {
        let session = make_session();
        let _ = session
            .join(SessionScope::Channel {
                channel_id: "ch-1".to_string(),
            })
            .await;
        assert!(!session.is_joined().await);

        session
            .apply_roster(
                "ch-1".to_string(),
                vec![RosterEntry {
                    id: ParticipantId::new("self"),
                    display_name: "Self".to_string(),
                    presence: PresenceStatus::Online,
                    role: None,
                }],
            )
            .await;
        assert!(session.is_joined().await);
        assert_eq!(session.roster().await.len(), 1);
    }

    #[tokio::test]
    async fn leave_tears_down_local_state_even_without_network() {
        let session = make_session();
        let _ = session
            .join(SessionScope::Team {
                team_id: "t-1".to_string(),
            })
            .await;
        session
            .apply_roster("t-1".to_string(), vec![])
            .await;

        session.leave().await;
        assert!(session.scope().await.is_none());
        assert!(!session.is_joined().await);
        assert!(session.roster().await.is_empty());
    }

    #[tokio::test]
    async fn calls_are_unavailable_without_a_manager() {
        let session = make_session();
        let _ = session
            .join(SessionScope::Roundtable {
                session_id: "rt-1".to_string(),
            })
            .await;
        assert!(matches!(
            session
                .start_call(ParticipantId::new("bob"), MediaKind::Audio)
                .await,
            Err(SessionError::CallsUnavailable)
        ));
    }
}
