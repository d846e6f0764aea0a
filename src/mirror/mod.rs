//! In-memory mirrors of rendered prompts.
//!
//! These are caches of the request store for O(1) lookup while the operator
//! interacts with a prompt. They are rebuilt from the store on startup and
//! never written back to it.

pub mod question;

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;

use crate::render;
use crate::request::{ChannelMessageRef, PendingRequest, RequestPayload};

pub use question::{QuestionItem, QuestionState, Selection, ToggleEffect};

/// Mirror of a rendered permission prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionState {
    pub request_id: String,
    pub session_id: String,
    pub tool_name: String,
    pub suggestions: Vec<Value>,
    /// Rendered body of the active page, kept to re-render the keyboard.
    pub text: String,
    pub resolved: bool,
}

/// Result of trying to take exclusive ownership of a prompt's resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim<T> {
    Missing,
    AlreadyResolved,
    Claimed(T),
}

#[derive(Default)]
pub struct Mirrors {
    permissions: DashMap<ChannelMessageRef, PermissionState>,
    questions: DashMap<ChannelMessageRef, QuestionState>,
    /// Prompt message -> request id.
    links: DashMap<ChannelMessageRef, String>,
    /// Notice message -> terminal target, for routing replies.
    notices: DashMap<ChannelMessageRef, NoticeLink>,
}

#[derive(Debug, Clone)]
struct NoticeLink {
    target: String,
    linked_at: Instant,
}

impl Mirrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the mirror entry for a request that reached `Sent`.
    pub fn insert_from_request(
        &self,
        request: &PendingRequest,
        message: ChannelMessageRef,
        text: String,
    ) {
        match &request.payload {
            RequestPayload::Permission {
                tool_name,
                suggestions,
                ..
            } => {
                self.permissions.insert(
                    message,
                    PermissionState {
                        request_id: request.id.clone(),
                        session_id: request.session_id.clone(),
                        tool_name: tool_name.clone(),
                        suggestions: suggestions.clone(),
                        text,
                        resolved: false,
                    },
                );
            }
            RequestPayload::Question { questions, .. } => {
                self.questions.insert(
                    message,
                    QuestionState::new(&request.id, &request.session_id, questions, text),
                );
            }
        }
        self.links.insert(message, request.id.clone());
    }

    /// Rebuild an entry from the stored request alone, re-rendering the
    /// active page text.
    pub fn rebuild(&self, request: &PendingRequest, max_len: usize) -> bool {
        let Some(message) = request.channel_message else {
            return false;
        };
        let text = render::active_page(&request.payload, max_len);
        self.insert_from_request(request, message, text);
        true
    }

    pub fn request_for(&self, message: &ChannelMessageRef) -> Option<String> {
        self.links.get(message).map(|id| id.clone())
    }

    /// Reverse lookup of a prompt message by request id.
    pub fn message_for(&self, request_id: &str) -> Option<ChannelMessageRef> {
        self.links
            .iter()
            .find(|entry| entry.value() == request_id)
            .map(|entry| *entry.key())
    }

    pub fn permission(&self, message: &ChannelMessageRef) -> Option<PermissionState> {
        self.permissions.get(message).map(|s| s.clone())
    }

    pub fn question(&self, message: &ChannelMessageRef) -> Option<QuestionState> {
        self.questions.get(message).map(|s| s.clone())
    }

    /// Atomically mark a permission prompt resolved.
    pub fn claim_permission(&self, message: &ChannelMessageRef) -> Claim<PermissionState> {
        match self.permissions.get_mut(message) {
            None => Claim::Missing,
            Some(state) if state.resolved => Claim::AlreadyResolved,
            Some(mut state) => {
                state.resolved = true;
                Claim::Claimed(state.clone())
            }
        }
    }

    /// Run `f` on an unresolved question entry. `f` may set `resolved`.
    pub fn with_question<R>(
        &self,
        message: &ChannelMessageRef,
        f: impl FnOnce(&mut QuestionState) -> R,
    ) -> Claim<R> {
        match self.questions.get_mut(message) {
            None => Claim::Missing,
            Some(state) if state.resolved => Claim::AlreadyResolved,
            Some(mut state) => Claim::Claimed(f(&mut state)),
        }
    }

    /// Undo a claim after the decision failed to persist.
    pub fn release(&self, message: &ChannelMessageRef) {
        if let Some(mut state) = self.permissions.get_mut(message) {
            state.resolved = false;
        }
        if let Some(mut state) = self.questions.get_mut(message) {
            state.resolved = false;
        }
    }

    /// Snapshot of every tracked prompt as (message, request id).
    pub fn tracked(&self) -> Vec<(ChannelMessageRef, String)> {
        self.links
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Drop every entry for a prompt message.
    pub fn remove(&self, message: &ChannelMessageRef) {
        self.permissions.remove(message);
        self.questions.remove(message);
        self.links.remove(message);
    }

    pub fn link_notice(&self, message: ChannelMessageRef, target: &str) {
        self.notices.insert(
            message,
            NoticeLink {
                target: target.to_string(),
                linked_at: Instant::now(),
            },
        );
    }

    pub fn notice_target(&self, message: &ChannelMessageRef) -> Option<String> {
        self.notices.get(message).map(|n| n.target.clone())
    }

    /// Forget notices pointing at a target that no longer exists.
    pub fn forget_target(&self, target: &str) {
        self.notices.retain(|_, n| n.target != target);
    }

    /// Forget notices linked longer than `max_age` ago. Returns how many.
    pub fn prune_notices(&self, max_age: Duration) -> usize {
        let before = self.notices.len();
        self.notices.retain(|_, n| n.linked_at.elapsed() < max_age);
        before.saturating_sub(self.notices.len())
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
