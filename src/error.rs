use std::path::PathBuf;

use crate::request::RequestStatus;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("pending request not found: {id}")]
    RequestNotFound { id: String },

    #[error("invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error("corrupt request file {path}: {reason}")]
    CorruptRequest { path: PathBuf, reason: String },

    #[error("storage error: {reason}")]
    Storage { reason: String },

    #[error("channel error: {reason}")]
    Channel { reason: String },

    #[error("terminal error on {target}: {reason}")]
    Terminal { target: String, reason: String },

    #[error("no channel route for session {session_id}")]
    NoRoute { session_id: String },

    #[error("invalid hook event: {reason}")]
    InvalidEvent { reason: String },

    #[error("ipc error: {reason}")]
    Ipc { reason: String },

    #[error("daemon not reachable at {url}")]
    DaemonUnavailable { url: String },

    #[error("hook decision timeout after {timeout_secs}s")]
    HookTimeout { timeout_secs: u64 },

    #[error("config parse error in {path}: {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RelayError {
    /// A missing request means the decision already settled (or never existed).
    pub fn is_not_found(&self) -> bool {
        matches!(self, RelayError::RequestNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
