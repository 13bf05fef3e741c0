//! Shared test harness: a scripted transport that captures outbound
//! frames and lets tests inject inbound ones, plus a recording media
//! negotiator.

// Each integration binary compiles this module separately and uses a
// different slice of it.
#![allow(dead_code)]

use async_trait::async_trait;
use roundtable_signaling::calls::{CallManager, MediaError, MediaNegotiator};
use roundtable_signaling::config::SocketConfig;
use roundtable_signaling::message::{ClientFrame, IceCandidate, ServerFrame};
use roundtable_signaling::reconnect::BackoffPolicy;
use roundtable_signaling::session::RoomSession;
use roundtable_signaling::socket::SignalingSocket;
use roundtable_signaling::transport::{Transport, TransportEvent, TransportFactory};
use roundtable_signaling::types::events::EventBus;
use roundtable_signaling::types::{MediaKind, ParticipantId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

pub struct ScriptedTransport {
    sent: Arc<Mutex<Vec<String>>>,
    events: mpsc::Sender<TransportEvent>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send_frame(&self, frame: &str) -> Result<(), anyhow::Error> {
        self.sent.lock().unwrap().push(frame.to_owned());
        Ok(())
    }

    async fn disconnect(&self) {
        let _ = self.events.send(TransportEvent::Disconnected).await;
    }
}

/// One scripted connection: what the client sent, and a way to push
/// inbound events at it.
pub struct ConnHandle {
    sent: Arc<Mutex<Vec<String>>>,
    tx: mpsc::Sender<TransportEvent>,
}

impl ConnHandle {
    pub fn sent_frames(&self) -> Vec<ClientFrame> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|text| serde_json::from_str(text).expect("client sent malformed frame"))
            .collect()
    }

    pub fn sent_kinds(&self) -> Vec<&'static str> {
        self.sent_frames().iter().map(|f| f.kind()).collect()
    }

    pub async fn inject(&self, frame: ServerFrame) {
        let text = serde_json::to_string(&frame).unwrap();
        self.tx
            .send(TransportEvent::FrameReceived(text))
            .await
            .expect("socket pump is gone");
    }

    pub async fn inject_raw(&self, text: &str) {
        self.tx
            .send(TransportEvent::FrameReceived(text.to_string()))
            .await
            .expect("socket pump is gone");
    }

    /// Simulates an abnormal connection drop.
    pub async fn drop_connection(&self) {
        let _ = self.tx.send(TransportEvent::Disconnected).await;
    }

    /// Polls until the client has sent a frame of `kind`, then returns
    /// it. Panics after five seconds.
    pub async fn wait_for_kind(&self, kind: &str) -> ClientFrame {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(frame) = self.sent_frames().into_iter().rev().find(|f| f.kind() == kind) {
                return frame;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "no '{kind}' frame sent within deadline; saw {:?}",
                    self.sent_kinds()
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.sent_kinds().iter().filter(|k| **k == kind).count()
    }
}

#[derive(Default)]
pub struct ScriptedFactory {
    connections: Mutex<Vec<Arc<ConnHandle>>>,
    pub refuse: AtomicBool,
}

impl ScriptedFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn connection(&self, index: usize) -> Arc<ConnHandle> {
        self.connections.lock().unwrap()[index].clone()
    }

    /// Polls until at least `count` connections have been dialed.
    pub async fn wait_for_connections(&self, count: usize) -> Arc<ConnHandle> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if self.connection_count() >= count {
                return self.connection(count - 1);
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "expected {count} connections, saw {}",
                    self.connection_count()
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl TransportFactory for ScriptedFactory {
    async fn create_transport(
        &self,
        _endpoint: &str,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("connection refused"));
        }
        let (tx, rx) = mpsc::channel(64);
        let sent = Arc::new(Mutex::new(Vec::new()));
        let handle = Arc::new(ConnHandle {
            sent: sent.clone(),
            tx: tx.clone(),
        });
        self.connections.lock().unwrap().push(handle);
        Ok((Arc::new(ScriptedTransport { sent, events: tx }), rx))
    }
}

/// Media engine double that fabricates descriptions and records what
/// was applied.
#[derive(Default)]
pub struct RecordingNegotiator {
    pub applied_candidates: Mutex<Vec<IceCandidate>>,
    pub remote_answers: Mutex<Vec<String>>,
    pub closed: AtomicBool,
}

#[async_trait]
impl MediaNegotiator for RecordingNegotiator {
    async fn create_offer(&self, media: MediaKind) -> Result<String, MediaError> {
        Ok(format!("v=0 offer {media:?}"))
    }

    async fn create_answer(&self, offer: &str, _media: MediaKind) -> Result<String, MediaError> {
        Ok(format!("v=0 answer-to [{offer}]"))
    }

    async fn set_remote_answer(&self, answer: &str) -> Result<(), MediaError> {
        self.remote_answers.lock().unwrap().push(answer.to_string());
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: &IceCandidate) -> Result<(), MediaError> {
        self.applied_candidates.lock().unwrap().push(candidate.clone());
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// A full client stack over a scripted transport.
pub struct TestStack {
    pub factory: Arc<ScriptedFactory>,
    pub socket: Arc<SignalingSocket>,
    pub session: Arc<RoomSession>,
    pub bus: Arc<EventBus>,
    pub negotiator: Arc<RecordingNegotiator>,
}

pub fn fast_config() -> SocketConfig {
    SocketConfig {
        backoff: BackoffPolicy::Linear {
            step: Duration::from_millis(1),
        },
        max_attempts: 5,
    }
}

/// Builds a stack with call support, spawns its dispatch loop, and
/// connects the socket; returns once the first connection is up.
pub async fn connected_stack(name: &str) -> TestStack {
    let _ = env_logger::builder().is_test(true).try_init();
    let factory = ScriptedFactory::new();
    let (socket, socket_events) = SignalingSocket::new(factory.clone(), fast_config());
    let bus = Arc::new(EventBus::new());
    let negotiator = Arc::new(RecordingNegotiator::default());
    let manager = CallManager::new(
        ParticipantId::new(name),
        negotiator.clone(),
        socket.clone(),
        bus.clone(),
    );
    let session = RoomSession::new(
        socket.clone(),
        socket_events,
        ParticipantId::new(name),
        bus.clone(),
        Some(manager),
    );
    {
        let session = session.clone();
        tokio::spawn(async move { session.run().await });
    }
    socket.connect("wss://realtime.test/ws").await;
    factory.wait_for_connections(1).await;
    // Give the dispatch loop a beat to observe Connected.
    tokio::time::sleep(Duration::from_millis(5)).await;

    TestStack {
        factory,
        socket,
        session,
        bus,
        negotiator,
    }
}

/// Awaits the next event on a broadcast channel, with a deadline.
pub async fn recv_event<T: Clone>(rx: &mut broadcast::Receiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Polls an async condition until it holds. Panics after five seconds.
pub async fn wait_until<F, Fut>(mut condition: F, what: &str)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if condition().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting until {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
