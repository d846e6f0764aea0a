//! Hook events as the agent delivers them on stdin.
//!
//! The JSON shape varies by event name; it is decoded once here into a tagged
//! union and never handled as loose JSON afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RelayError, Result};

/// Tool name of the agent's multiple-choice question tool.
pub const ASK_USER_QUESTION: &str = "AskUserQuestion";

/// Fields every session-scoped event carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    pub session_id: String,
    #[serde(default)]
    pub cwd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<String>,
}

/// A tool-related event: permission request, pre/post tool use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEvent {
    #[serde(flatten)]
    pub context: EventContext,
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permission_suggestions: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "hook_event_name")]
pub enum HookEvent {
    SessionStart {
        #[serde(flatten)]
        context: EventContext,
    },
    SessionEnd {
        #[serde(flatten)]
        context: EventContext,
    },
    UserPromptSubmit {
        #[serde(flatten)]
        context: EventContext,
        #[serde(default)]
        prompt: String,
    },
    PreToolUse(ToolEvent),
    PostToolUse(ToolEvent),
    PermissionRequest(ToolEvent),
    Notification {
        #[serde(flatten)]
        context: EventContext,
        #[serde(default)]
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notification_type: Option<String>,
    },
    Stop {
        #[serde(flatten)]
        context: EventContext,
    },
    #[serde(other)]
    Other,
}

impl HookEvent {
    /// Decode a single hook event from its JSON text.
    pub fn parse(input: &str) -> Result<Self> {
        serde_json::from_str(input.trim()).map_err(|e| RelayError::InvalidEvent {
            reason: e.to_string(),
        })
    }

    pub fn context(&self) -> Option<&EventContext> {
        match self {
            HookEvent::SessionStart { context }
            | HookEvent::SessionEnd { context }
            | HookEvent::UserPromptSubmit { context, .. }
            | HookEvent::Notification { context, .. }
            | HookEvent::Stop { context } => Some(context),
            HookEvent::PreToolUse(tool)
            | HookEvent::PostToolUse(tool)
            | HookEvent::PermissionRequest(tool) => Some(&tool.context),
            HookEvent::Other => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HookEvent::SessionStart { .. } => "SessionStart",
            HookEvent::SessionEnd { .. } => "SessionEnd",
            HookEvent::UserPromptSubmit { .. } => "UserPromptSubmit",
            HookEvent::PreToolUse(_) => "PreToolUse",
            HookEvent::PostToolUse(_) => "PostToolUse",
            HookEvent::PermissionRequest(_) => "PermissionRequest",
            HookEvent::Notification { .. } => "Notification",
            HookEvent::Stop { .. } => "Stop",
            HookEvent::Other => "Other",
        }
    }

    /// Events that mean the agent is producing new output.
    pub fn is_agent_activity(&self) -> bool {
        matches!(
            self,
            HookEvent::PreToolUse(_)
                | HookEvent::PostToolUse(_)
                | HookEvent::Stop { .. }
                | HookEvent::Notification { .. }
        )
    }
}
