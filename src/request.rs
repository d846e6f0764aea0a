use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::decision::Decision;
use crate::error::{RelayError, Result};

/// The two kinds of decision a hook can hand off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Permission,
    Question,
}

/// Lifecycle of a pending request.
///
/// Pending -> Sent -> {Answered, Cancelled}. No other edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Sent,
    Answered,
    Cancelled,
}

impl RequestStatus {
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (RequestStatus::Pending, RequestStatus::Sent)
                | (RequestStatus::Sent, RequestStatus::Answered)
                | (RequestStatus::Sent, RequestStatus::Cancelled)
        )
    }

    /// Answered and Cancelled have no way out.
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Answered | RequestStatus::Cancelled)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "pending"),
            RequestStatus::Sent => write!(f, "sent"),
            RequestStatus::Answered => write!(f, "answered"),
            RequestStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestKind::Permission => write!(f, "permission"),
            RequestKind::Question => write!(f, "question"),
        }
    }
}

/// Where a prompt was rendered on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelMessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

/// One option of an `AskUserQuestion` question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One question of an `AskUserQuestion` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    #[serde(default, rename = "multiSelect")]
    pub multi_select: bool,
}

/// Immutable copy of the originating event, one shape per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RequestPayload {
    Permission {
        tool_name: String,
        tool_input: Value,
        /// "Always allow" permission updates offered by the agent.
        #[serde(default)]
        suggestions: Vec<Value>,
    },
    Question {
        tool_input: Value,
        questions: Vec<Question>,
    },
}

impl RequestPayload {
    pub fn kind(&self) -> RequestKind {
        match self {
            RequestPayload::Permission { .. } => RequestKind::Permission,
            RequestPayload::Question { .. } => RequestKind::Question,
        }
    }

    /// Build a question payload from raw `AskUserQuestion` tool input.
    pub fn question_from_input(tool_input: Value) -> Result<Self> {
        let questions: Vec<Question> = tool_input
            .get("questions")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        if questions.is_empty() {
            return Err(RelayError::InvalidEvent {
                reason: "AskUserQuestion input carries no questions".into(),
            });
        }
        Ok(RequestPayload::Question {
            tool_input,
            questions,
        })
    }

    pub fn tool_name(&self) -> &str {
        match self {
            RequestPayload::Permission { tool_name, .. } => tool_name,
            RequestPayload::Question { .. } => crate::event::ASK_USER_QUESTION,
        }
    }

    pub fn tool_input(&self) -> &Value {
        match self {
            RequestPayload::Permission { tool_input, .. } => tool_input,
            RequestPayload::Question { tool_input, .. } => tool_input,
        }
    }
}

/// The durable record of one hook event awaiting a human decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRequest {
    pub id: String,
    pub status: RequestStatus,
    pub payload: RequestPayload,
    #[serde(default)]
    pub channel_message: Option<ChannelMessageRef>,
    pub session_id: String,
    #[serde(default)]
    pub terminal_target: Option<String>,
    pub cwd: String,
    #[serde(default)]
    pub decision: Option<Decision>,
    pub origin_pid: u32,
    pub created_at: DateTime<Utc>,
}

impl PendingRequest {
    /// A fresh request in `Pending` state with a random id.
    pub fn new(
        payload: RequestPayload,
        session_id: &str,
        terminal_target: Option<String>,
        cwd: &str,
        origin_pid: u32,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: RequestStatus::Pending,
            payload,
            channel_message: None,
            session_id: session_id.to_string(),
            terminal_target,
            cwd: cwd.to_string(),
            decision: None,
            origin_pid,
            created_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> RequestKind {
        self.payload.kind()
    }

    /// Move to `next`, rejecting any edge outside the lifecycle DAG.
    pub fn transition(&mut self, next: RequestStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(RelayError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Pending -> Sent, recording where the prompt landed.
    pub fn mark_sent(&mut self, message: ChannelMessageRef) -> Result<()> {
        self.transition(RequestStatus::Sent)?;
        self.channel_message = Some(message);
        Ok(())
    }

    /// Sent -> Answered with the decision payload.
    pub fn mark_answered(&mut self, decision: Decision) -> Result<()> {
        self.transition(RequestStatus::Answered)?;
        self.decision = Some(decision);
        Ok(())
    }
}
