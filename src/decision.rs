use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a permission prompt, in the shape the agent expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "behavior", rename_all = "lowercase")]
pub enum PermissionDecision {
    Allow {
        #[serde(
            rename = "updatedPermissions",
            default,
            skip_serializing_if = "Vec::is_empty"
        )]
        updated_permissions: Vec<Value>,
    },
    Deny {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl PermissionDecision {
    pub fn allow() -> Self {
        PermissionDecision::Allow {
            updated_permissions: Vec::new(),
        }
    }

    pub fn deny(message: Option<String>) -> Self {
        PermissionDecision::Deny { message }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, PermissionDecision::Allow { .. })
    }
}

/// The labels chosen for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question: String,
    pub labels: Vec<String>,
}

/// Outcome of a question prompt: either selections or a free-text reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionDecision {
    #[serde(default)]
    pub answers: Vec<QuestionAnswer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

/// A decision written into a pending request. The variant matches the
/// request's kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Permission(PermissionDecision),
    Question(QuestionDecision),
}

/// An operator action against a rendered prompt. Button presses, replies and
/// the HTTP resolve endpoint all funnel into this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Interaction {
    Allow,
    Deny {
        #[serde(default)]
        message: Option<String>,
    },
    AlwaysAllow {
        index: usize,
    },
    Toggle {
        question: usize,
        option: usize,
    },
    Submit,
    Reply {
        text: String,
    },
}

/// Callback data carried by frozen buttons. Pressing them changes nothing.
pub const FROZEN_CALLBACK: &str = "-";

impl Interaction {
    /// Encode as compact button callback data.
    pub fn to_callback(&self) -> String {
        match self {
            Interaction::Allow => "p:a".into(),
            Interaction::Deny { .. } => "p:d".into(),
            Interaction::AlwaysAllow { index } => format!("p:s:{index}"),
            Interaction::Toggle { question, option } => format!("q:{question}:{option}"),
            Interaction::Submit => "q:ok".into(),
            Interaction::Reply { .. } => FROZEN_CALLBACK.into(),
        }
    }

    /// Decode button callback data. Frozen or unknown data yields `None`.
    pub fn from_callback(data: &str) -> Option<Self> {
        let parts: Vec<&str> = data.split(':').collect();
        match parts.as_slice() {
            ["p", "a"] => Some(Interaction::Allow),
            ["p", "d"] => Some(Interaction::Deny { message: None }),
            ["p", "s", index] => index
                .parse()
                .ok()
                .map(|index| Interaction::AlwaysAllow { index }),
            ["q", "ok"] => Some(Interaction::Submit),
            ["q", question, option] => {
                let question = question.parse().ok()?;
                let option = option.parse().ok()?;
                Some(Interaction::Toggle { question, option })
            }
            _ => None,
        }
    }
}

/// What happened to an interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    /// A decision was written and the prompt frozen.
    Resolved,
    /// Selection state changed; the prompt is still open.
    Updated,
    /// The prompt was already resolved; nothing changed.
    AlreadyAnswered,
    /// The request is unknown or its file is gone.
    Expired,
    /// The hook that asked is gone; the prompt was frozen as cancelled.
    Stale,
    /// The interaction doesn't apply to this prompt.
    Rejected(String),
}

impl Outcome {
    /// Short text shown to the operator after a button press.
    pub fn operator_text(&self) -> Option<String> {
        match self {
            Outcome::Resolved => Some("✅ Submitted".into()),
            Outcome::Updated => None,
            Outcome::AlreadyAnswered => Some("Already answered".into()),
            Outcome::Expired => Some("This prompt has expired".into()),
            Outcome::Stale => Some("The agent has moved on; prompt cancelled".into()),
            Outcome::Rejected(reason) => Some(reason.clone()),
        }
    }
}
