//! Errors raised by external collaborators
//!
//! The timer core itself never fails; these only describe transport and
//! storage problems, which callers log and move past.

use thiserror::Error;

/// Failure talking to the real-time store or the durable key/value store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote store rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Transport(e.to_string())
    }
}
