use thiserror::Error;

pub type Result<T> = std::result::Result<T, SocketError>;

#[derive(Debug, Error)]
pub enum SocketError {
    /// The socket is closed, connecting, or mid-reconnect. Sends fail
    /// fast instead of queueing so callers can surface a transient
    /// error state.
    #[error("socket is not connected")]
    NotConnected,

    /// The attempt ceiling was reached; the socket stays down until a
    /// manual `connect` is requested.
    #[error("reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },

    #[error("frame encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
}
