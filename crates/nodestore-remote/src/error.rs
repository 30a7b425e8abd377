//! Transport-layer errors (`spec.md` §7 "transport errors").

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("frame decode failed: {0}")]
    Decode(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("pick request timed out")]
    Timeout,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Core(#[from] nodestore_core::CoreError),
}

pub type RemoteResult<T> = Result<T, RemoteError>;
