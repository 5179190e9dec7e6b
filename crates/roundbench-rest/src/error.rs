//! REST client error types.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RestError {
    /// Transport failure: DNS, connect, TLS, timeout, truncated body.
    #[error("Network error: {0}")]
    Network(String),

    /// Credentials or signature rejected by the venue.
    #[error("Auth rejected: status={status}, code={code:?}, msg={msg}")]
    Auth {
        status: u16,
        code: Option<i64>,
        msg: String,
    },

    /// Body was not the JSON shape expected.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Well-formed venue error that is not an auth failure.
    #[error("Request rejected: status={status}, code={code:?}, msg={msg}")]
    Rejected {
        status: u16,
        code: Option<i64>,
        msg: String,
    },

    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

pub type RestResult<T> = Result<T, RestError>;
