//! Loopback HTTP API between hooks, tooling and the daemon.

pub mod client;
pub mod server;

use serde::{Deserialize, Serialize};

use crate::event::HookEvent;

pub use client::DaemonClient;

/// A lifecycle hook event forwarded to the daemon, with the terminal target
/// the hook was running in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub event: HookEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_target: Option<String>,
}

/// Bind a session's terminal target to a chat. Exactly one of `session_id`,
/// `cwd` or `target` picks the target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindRequest {
    pub chat_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindResponse {
    pub target: String,
    pub chat_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub session_id: String,
    pub known: bool,
    pub alive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_target: Option<String>,
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub error: String,
}
