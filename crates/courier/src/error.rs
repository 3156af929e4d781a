//! Error types.

use std::time::Duration;

/// Errors surfaced by the client and the façade.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Empty or otherwise unusable input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Input that does not parse as an absolute http(s) URI.
    #[error("invalid URI: {0}")]
    InvalidUri(String),

    /// A request resolved outside the origin the client is bound to.
    #[error("origin mismatch: client is bound to {bound}, request resolved to {requested}")]
    OriginMismatch { bound: String, requested: String },

    /// Unknown HTTP verb.
    #[error("unsupported HTTP method: {0}")]
    InvalidMethod(String),

    /// No request has completed on this client yet.
    #[error("no response received yet")]
    NoResponse,

    /// Misuse of a stateful object.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Payload could not be serialized.
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    /// Network failure reported by the transport.
    #[error(transparent)]
    Network(#[from] TransportError),
}

impl Error {
    /// Whether the retry policy may re-issue the request.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network(e) if e.is_transient())
    }
}

/// Result type alias using courier's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised at the transport boundary.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection refused, reset, or name resolution failed.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Connect or read timeout elapsed.
    #[error("request timed out")]
    Timeout,

    /// Malformed response or protocol violation.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The underlying client could not be configured.
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    /// Any other failure from the HTTP stack.
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
}

impl TransportError {
    /// Connection-level failures presumed recoverable by retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Connect(_) | TransportError::Timeout | TransportError::Protocol(_) => {
                true
            }
            TransportError::Build(_) => false,
            TransportError::Request(e) => !e.is_builder(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_builder() {
            TransportError::Build(e)
        } else {
            TransportError::Request(e)
        }
    }
}

/// Retry budget bookkeeping for one logical request.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryBudget {
    remaining: u32,
    wait: Duration,
}

impl RetryBudget {
    pub(crate) fn new(remaining: u32, wait: Duration) -> Self {
        Self { remaining, wait }
    }

    /// Consume one retry, returning the delay to wait before it.
    pub(crate) fn take(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.wait)
    }

    pub(crate) fn remaining(&self) -> u32 {
        self.remaining
    }
}
