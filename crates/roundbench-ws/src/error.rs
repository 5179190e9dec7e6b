//! Push session error types.

use roundbench_rest::RestError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    /// Listen key request failed.
    #[error("Listen key request failed: {0}")]
    ListenKey(#[from] RestError),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Session open timed out after {timeout_ms}ms")]
    OpenTimeout { timeout_ms: u64 },

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Stream ended")]
    StreamEnded,

    #[error("Listen key expired")]
    ListenKeyExpired,

    /// Queried after the terminal error was already delivered.
    #[error("Session ended")]
    SessionEnded,

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}

pub type WsResult<T> = Result<T, WsError>;
