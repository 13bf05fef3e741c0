//! The resilient signaling socket: owns one duplex connection, its
//! reconnect policy, and frame encoding/dispatch.
//!
//! All connection mutations happen inside the run loop spawned by
//! [`SignalingSocket::connect`], so consumers observe a serialized
//! stream of [`SocketEvent`]s.

pub mod error;

pub use error::SocketError;

use crate::config::SocketConfig;
use crate::message::{ClientFrame, ServerFrame};
use crate::reconnect::ReconnectScheduler;
use crate::transport::{Transport, TransportEvent, TransportFactory};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::{Mutex, RwLock, mpsc};

const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Closed,
    Connecting,
    Open,
}

/// An event surfaced by the socket to its single consumer (the session
/// dispatch loop).
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// The connection (or a reconnection) is established.
    Connected,
    /// A decoded inbound signaling frame.
    Frame(ServerFrame),
    /// The connection dropped. `will_retry` is false only for an
    /// explicit close.
    Disconnected { will_retry: bool },
    /// The attempt ceiling was reached; no further attempts follow.
    ReconnectExhausted { attempts: u32 },
}

/// Anything that can put a [`ClientFrame`] on the wire.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send(&self, frame: &ClientFrame) -> Result<(), SocketError>;
}

/// A duplex signaling connection that reconnects with backoff on
/// abnormal closure.
///
/// In-flight sends are at-most-once: nothing is buffered or replayed
/// across a reconnect, and callers re-request state once [`SocketEvent::Connected`]
/// is observed again.
pub struct SignalingSocket {
    factory: Arc<dyn TransportFactory>,
    config: SocketConfig,
    state: RwLock<ConnectionState>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    events_tx: mpsc::Sender<SocketEvent>,
    scheduler: ReconnectScheduler,
    attempts: AtomicU32,
    closed: AtomicBool,
    exhausted: AtomicBool,
    running: AtomicBool,
}

impl SignalingSocket {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        config: SocketConfig,
    ) -> (Arc<Self>, mpsc::Receiver<SocketEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let socket = Arc::new(Self {
            factory,
            scheduler: ReconnectScheduler::new(config.backoff),
            config,
            state: RwLock::new(ConnectionState::Closed),
            transport: Mutex::new(None),
            events_tx,
            attempts: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            exhausted: AtomicBool::new(false),
            running: AtomicBool::new(false),
        });
        (socket, events_rx)
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn is_open(&self) -> bool {
        self.state().await == ConnectionState::Open
    }

    /// Opens the connection and keeps it alive until [`close`](Self::close)
    /// is called or the attempt ceiling is reached. Idempotent while
    /// already connecting or open.
    pub async fn connect(self: &Arc<Self>, endpoint: &str) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!(target: "Socket", "connect() called while already running");
            return;
        }
        self.closed.store(false, Ordering::SeqCst);
        self.exhausted.store(false, Ordering::SeqCst);
        self.attempts.store(0, Ordering::SeqCst);

        let socket = self.clone();
        let endpoint = endpoint.to_string();
        tokio::spawn(async move { socket.run(endpoint).await });
    }

    async fn run(self: Arc<Self>, endpoint: String) {
        let socket = self.clone();
        let _running_guard = scopeguard::guard((), move |_| {
            socket.running.store(false, Ordering::SeqCst);
        });

        loop {
            if self.closed.load(Ordering::SeqCst) {
                break;
            }

            *self.state.write().await = ConnectionState::Connecting;
            match self.factory.create_transport(&endpoint).await {
                Ok((transport, transport_events)) => {
                    *self.transport.lock().await = Some(transport);
                    *self.state.write().await = ConnectionState::Open;
                    self.attempts.store(0, Ordering::SeqCst);
                    info!(target: "Socket", "Connected to {endpoint}");
                    if self.events_tx.send(SocketEvent::Connected).await.is_err() {
                        break;
                    }

                    self.pump(transport_events).await;
                    self.teardown_transport().await;
                }
                Err(e) => {
                    warn!(target: "Socket", "Connect to {endpoint} failed: {e:#}");
                    *self.state.write().await = ConnectionState::Closed;
                }
            }

            if self.closed.load(Ordering::SeqCst) {
                let _ = self
                    .events_tx
                    .send(SocketEvent::Disconnected { will_retry: false })
                    .await;
                break;
            }

            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt > self.config.max_attempts {
                warn!(
                    target: "Socket",
                    "Giving up after {} reconnect attempts", self.config.max_attempts
                );
                self.exhausted.store(true, Ordering::SeqCst);
                let _ = self
                    .events_tx
                    .send(SocketEvent::ReconnectExhausted {
                        attempts: self.config.max_attempts,
                    })
                    .await;
                break;
            }

            let _ = self
                .events_tx
                .send(SocketEvent::Disconnected { will_retry: true })
                .await;
            if !self.scheduler.schedule(attempt).await {
                debug!(target: "Socket", "Reconnect wait cancelled");
                break;
            }
        }
    }

    /// Forwards decoded frames until the transport reports closure.
    /// Malformed frames are logged and dropped; they never tear down the
    /// session.
    async fn pump(&self, mut transport_events: mpsc::Receiver<TransportEvent>) {
        while let Some(event) = transport_events.recv().await {
            match event {
                TransportEvent::Connected => {
                    debug!(target: "Socket", "Transport reported connected")
                }
                TransportEvent::FrameReceived(text) => match ServerFrame::decode(&text) {
                    Ok(frame) => {
                        debug!(target: "Socket", "<-- {}", frame.kind());
                        if self.events_tx.send(SocketEvent::Frame(frame)).await.is_err() {
                            warn!(target: "Socket", "Event receiver dropped, stopping pump");
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(target: "Socket", "Dropping malformed frame: {e}");
                    }
                },
                TransportEvent::Disconnected => {
                    debug!(target: "Socket", "Transport disconnected");
                    return;
                }
            }
        }
        debug!(target: "Socket", "Transport event stream ended");
    }

    async fn teardown_transport(&self) {
        *self.transport.lock().await = None;
        *self.state.write().await = ConnectionState::Closed;
    }

    /// Sends one frame. Fails fast while not connected instead of
    /// queueing, so callers can surface a transient error state.
    pub async fn send(&self, frame: &ClientFrame) -> Result<(), SocketError> {
        if self.exhausted.load(Ordering::SeqCst) {
            return Err(SocketError::ReconnectExhausted {
                attempts: self.config.max_attempts,
            });
        }
        if !self.is_open().await {
            return Err(SocketError::NotConnected);
        }
        let transport = self
            .transport
            .lock()
            .await
            .clone()
            .ok_or(SocketError::NotConnected)?;

        let text = frame.encode()?;
        debug!(target: "Socket", "--> {}", frame.kind());
        transport.send_frame(&text).await.map_err(SocketError::from)
    }

    /// Closes the connection and cancels any pending reconnect. The
    /// socket issues no further attempts until `connect` is called
    /// again.
    pub async fn close(&self) {
        info!(target: "Socket", "Closing socket");
        self.closed.store(true, Ordering::SeqCst);
        self.scheduler.cancel().await;
        if let Some(transport) = self.transport.lock().await.take() {
            transport.disconnect().await;
        }
        *self.state.write().await = ConnectionState::Closed;
    }
}

#[async_trait]
impl FrameSink for SignalingSocket {
    async fn send(&self, frame: &ClientFrame) -> Result<(), SocketError> {
        SignalingSocket::send(self, frame).await
    }
}
