//! Bot-side processor and resolver.
//!
//! The coordinator turns pending requests into rendered prompts, resolves
//! operator interactions into decisions written back to the store, and
//! freezes prompts once they are settled. Every state transition for a
//! session happens under that session's lock.

pub mod events;
pub mod inbound;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::channel::{Channel, Keyboard, Transcriber};
use crate::config::RelayConfig;
use crate::decision::{Decision, Interaction, Outcome, PermissionDecision, QuestionDecision};
use crate::error::{RelayError, Result};
use crate::mirror::{Claim, Mirrors, PermissionState, QuestionState, ToggleEffect};
use crate::process::process_alive;
use crate::render;
use crate::request::{ChannelMessageRef, PendingRequest, RequestPayload, RequestStatus};
use crate::session::{ChannelBindings, ReactionBook, SessionRegistry};
use crate::storage::{RequestStore, StoredEntry};
use crate::terminal::Terminal;

/// How long a notice stays routable for replies.
const NOTICE_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

pub struct Coordinator {
    config: RelayConfig,
    store: Arc<dyn RequestStore>,
    mirrors: Mirrors,
    sessions: SessionRegistry,
    bindings: ChannelBindings,
    reactions: ReactionBook,
    channel: Arc<dyn Channel>,
    terminal: Arc<dyn Terminal>,
    transcriber: Option<Arc<dyn Transcriber>>,
    /// Leading pages already sent for requests whose keyboard page hasn't.
    delivered_pages: DashMap<String, usize>,
}

impl Coordinator {
    pub fn new(
        config: RelayConfig,
        store: Arc<dyn RequestStore>,
        channel: Arc<dyn Channel>,
        terminal: Arc<dyn Terminal>,
    ) -> Self {
        Self {
            config,
            store,
            mirrors: Mirrors::new(),
            sessions: SessionRegistry::new(),
            bindings: ChannelBindings::new(),
            reactions: ReactionBook::new(),
            channel,
            terminal,
            transcriber: None,
            delivered_pages: DashMap::new(),
        }
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn RequestStore {
        self.store.as_ref()
    }

    pub fn mirrors(&self) -> &Mirrors {
        &self.mirrors
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn bindings(&self) -> &ChannelBindings {
        &self.bindings
    }

    pub fn reactions(&self) -> &ReactionBook {
        &self.reactions
    }

    pub fn channel(&self) -> &dyn Channel {
        self.channel.as_ref()
    }

    fn max_message_len(&self) -> usize {
        self.config
            .max_message_len
            .min(self.channel.max_message_len())
    }

    /// Run a terminal call on the blocking pool; tmux shells out and may hang.
    pub(crate) async fn on_terminal<R, F>(&self, target: &str, call: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&dyn Terminal) -> Result<R> + Send + 'static,
    {
        let terminal = Arc::clone(&self.terminal);
        tokio::task::spawn_blocking(move || call(terminal.as_ref()))
            .await
            .map_err(|e| RelayError::Terminal {
                target: target.to_string(),
                reason: format!("terminal task failed: {e}"),
            })?
    }

    /// Whether a terminal target still exists.
    pub async fn target_exists(&self, target: &str) -> bool {
        let owned = target.to_string();
        self.on_terminal(target, move |t| Ok(t.exists(&owned)))
            .await
            .unwrap_or(false)
    }

    /// Read a request, mapping "not found" to `None`.
    fn read_opt(&self, id: &str) -> Result<Option<PendingRequest>> {
        match self.store.read(id) {
            Ok(request) => Ok(Some(request)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Chat a session's prompts go to: its target's bound chat, else the
    /// default chat.
    pub fn route(&self, session_id: &str, target: Option<&str>) -> Result<i64> {
        target
            .and_then(|t| self.bindings.chat_for(t))
            .or(self.config.telegram.chat_id)
            .ok_or_else(|| RelayError::NoRoute {
                session_id: session_id.to_string(),
            })
    }

    // -----------------------------------------------------------------------
    // Render
    // -----------------------------------------------------------------------

    /// Render a Pending request to the channel and move it to Sent.
    ///
    /// Anything other than a Pending request is left alone, so repeated
    /// signals for the same id are harmless. Leading pages that went out on
    /// an earlier failed attempt are not sent again.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn process_pending(&self, id: &str) -> Result<()> {
        let Some(request) = self.read_opt(id)? else {
            tracing::debug!(request_id = %id, "request gone before processing");
            self.delivered_pages.remove(id);
            return Ok(());
        };
        let _guard = self.sessions.lock(&request.session_id).await;

        // Re-read under the lock; another signal may have won.
        let Some(request) = self.read_opt(id)? else {
            self.delivered_pages.remove(id);
            return Ok(());
        };
        if request.status != RequestStatus::Pending {
            self.delivered_pages.remove(id);
            tracing::debug!(request_id = %id, status = %request.status, "already processed");
            return Ok(());
        }

        self.sessions.add(
            &request.session_id,
            request.terminal_target.as_deref(),
            &request.cwd,
        );
        let chat_id = self.route(&request.session_id, request.terminal_target.as_deref())?;

        let mut pages = render::pages(&request.payload, self.max_message_len());
        let active = pages.pop().unwrap_or_default();
        let already = self.delivered_pages.get(id).map(|n| *n).unwrap_or(0);
        for (index, page) in pages.iter().enumerate().skip(already) {
            self.channel.send(chat_id, page, None).await?;
            self.delivered_pages.insert(id.to_string(), index + 1);
        }
        let keyboard = initial_keyboard(&request);
        let message = self.channel.send(chat_id, &active, Some(&keyboard)).await?;
        self.delivered_pages.remove(id);

        let sent = match self.store.update(id, &mut |r| r.mark_sent(message)) {
            Ok(sent) => sent,
            Err(e) if e.is_not_found() => {
                // The hook gave up while we were rendering.
                let text = render::with_footer(&active, render::FOOTER_CANCELLED);
                if let Err(e) = self.channel.edit(&message, &text, None).await {
                    tracing::warn!(request_id = %id, error = %e, "failed to freeze orphan prompt");
                }
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.mirrors.insert_from_request(&sent, message, active);
        tracing::info!(
            request_id = %id,
            session_id = %sent.session_id,
            kind = %sent.kind(),
            chat_id = message.chat_id,
            message_id = message.message_id,
            "prompt sent"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Resolve
    // -----------------------------------------------------------------------

    /// Apply an operator interaction to the prompt rendered as `message`.
    pub async fn interact(
        &self,
        message: ChannelMessageRef,
        interaction: Interaction,
    ) -> Result<Outcome> {
        match self.mirrors.request_for(&message) {
            Some(id) => self.resolve(&id, interaction).await,
            None => Ok(Outcome::Expired),
        }
    }

    /// Apply an interaction to a request by id, as the HTTP API does.
    pub async fn resolve_by_id(&self, id: &str, interaction: Interaction) -> Result<Outcome> {
        self.resolve(id, interaction).await
    }

    #[tracing::instrument(level = "info", skip(self))]
    async fn resolve(&self, id: &str, interaction: Interaction) -> Result<Outcome> {
        let Some(request) = self.read_opt(id)? else {
            self.forget_request(id);
            return Ok(Outcome::Expired);
        };
        let _guard = self.sessions.lock(&request.session_id).await;

        let Some(request) = self.read_opt(id)? else {
            self.forget_request(id);
            return Ok(Outcome::Expired);
        };
        match request.status {
            RequestStatus::Pending => {
                return Ok(Outcome::Rejected(
                    "This request has not been delivered yet".into(),
                ))
            }
            RequestStatus::Answered => return Ok(Outcome::AlreadyAnswered),
            RequestStatus::Cancelled => return Ok(Outcome::Expired),
            RequestStatus::Sent => {}
        }
        let Some(message) = request.channel_message else {
            return Err(RelayError::Storage {
                reason: format!("sent request {id} has no channel message"),
            });
        };

        // Mirrors may be missing if the daemon restarted after a partial scan.
        if self.mirrors.request_for(&message).is_none() {
            self.mirrors.rebuild(&request, self.max_message_len());
        }

        if !process_alive(request.origin_pid) {
            tracing::info!(
                request_id = %id,
                origin_pid = request.origin_pid,
                "origin hook gone; cancelling stale prompt"
            );
            self.cancel_locked(&request).await?;
            return Ok(Outcome::Stale);
        }

        match &request.payload {
            RequestPayload::Permission { .. } => {
                self.resolve_permission(&request, message, interaction).await
            }
            RequestPayload::Question { .. } => {
                self.resolve_question(&request, message, interaction).await
            }
        }
    }

    async fn resolve_permission(
        &self,
        request: &PendingRequest,
        message: ChannelMessageRef,
        interaction: Interaction,
    ) -> Result<Outcome> {
        let Some(state) = self.mirrors.permission(&message) else {
            return Ok(Outcome::Expired);
        };
        let (decision, chosen) = match interaction {
            Interaction::Allow => (PermissionDecision::allow(), Interaction::Allow),
            Interaction::Deny { message: reason } => (
                PermissionDecision::deny(reason.clone()),
                Interaction::Deny { message: reason },
            ),
            Interaction::AlwaysAllow { index } => {
                let Some(suggestion) = state.suggestions.get(index) else {
                    return Ok(Outcome::Rejected(format!("No suggestion #{index}")));
                };
                (
                    PermissionDecision::Allow {
                        updated_permissions: vec![suggestion.clone()],
                    },
                    Interaction::AlwaysAllow { index },
                )
            }
            Interaction::Reply { text } => (
                PermissionDecision::deny(Some(text.clone())),
                Interaction::Deny {
                    message: Some(text),
                },
            ),
            Interaction::Toggle { .. } | Interaction::Submit => {
                return Ok(Outcome::Rejected(
                    "That control doesn't apply to a permission prompt".into(),
                ))
            }
        };

        let state = match self.mirrors.claim_permission(&message) {
            Claim::Missing => return Ok(Outcome::Expired),
            Claim::AlreadyResolved => return Ok(Outcome::AlreadyAnswered),
            Claim::Claimed(state) => state,
        };

        let allowed = decision.is_allow();
        if let Some(outcome) = self
            .write_decision(request, message, Decision::Permission(decision))
            .await?
        {
            return Ok(outcome);
        }
        let keyboard = render::permission_keyboard(&state, Some(&chosen), true);
        self.freeze(&message, &state.text, render::FOOTER_SUBMITTED, Some(&keyboard))
            .await;
        tracing::info!(request_id = %request.id, allowed, "permission resolved");
        Ok(Outcome::Resolved)
    }

    async fn resolve_question(
        &self,
        request: &PendingRequest,
        message: ChannelMessageRef,
        interaction: Interaction,
    ) -> Result<Outcome> {
        let claim = match interaction {
            Interaction::Toggle { question, option } => {
                self.mirrors
                    .with_question(&message, |state| match state.toggle(question, option) {
                        Ok(ToggleEffect::Complete) => {
                            state.resolved = true;
                            let decision = QuestionDecision {
                                answers: state.answers(),
                                reply: None,
                            };
                            Ok((Some(decision), state.clone()))
                        }
                        Ok(ToggleEffect::Changed) => Ok((None, state.clone())),
                        Err(reason) => Err(reason),
                    })
            }
            Interaction::Submit => self.mirrors.with_question(&message, |state| {
                if !state.is_complete() {
                    return Err("Pick at least one option for every question".to_string());
                }
                state.resolved = true;
                let decision = QuestionDecision {
                    answers: state.answers(),
                    reply: None,
                };
                Ok((Some(decision), state.clone()))
            }),
            Interaction::Reply { text } => self.mirrors.with_question(&message, |state| {
                state.resolved = true;
                let decision = QuestionDecision {
                    answers: Vec::new(),
                    reply: Some(text),
                };
                Ok((Some(decision), state.clone()))
            }),
            Interaction::Allow | Interaction::Deny { .. } | Interaction::AlwaysAllow { .. } => {
                return Ok(Outcome::Rejected(
                    "That control doesn't apply to a question".into(),
                ))
            }
        };

        let (decision, state) = match claim {
            Claim::Missing => return Ok(Outcome::Expired),
            Claim::AlreadyResolved => return Ok(Outcome::AlreadyAnswered),
            Claim::Claimed(Err(reason)) => return Ok(Outcome::Rejected(reason)),
            Claim::Claimed(Ok(result)) => result,
        };

        let Some(decision) = decision else {
            let keyboard = render::question_keyboard(&state, false);
            if let Err(e) = self
                .channel
                .edit(&message, &state.text, Some(&keyboard))
                .await
            {
                tracing::warn!(request_id = %request.id, error = %e, "failed to re-render question");
            }
            return Ok(Outcome::Updated);
        };

        if let Some(outcome) = self
            .write_decision(request, message, Decision::Question(decision))
            .await?
        {
            return Ok(outcome);
        }
        let keyboard = render::question_keyboard(&state, true);
        self.freeze(&message, &state.text, render::FOOTER_SUBMITTED, Some(&keyboard))
            .await;
        tracing::info!(request_id = %request.id, "question resolved");
        Ok(Outcome::Resolved)
    }

    /// Persist a decision for a claimed prompt. On failure the claim is
    /// released; a vanished file turns into `Some(Expired)`.
    async fn write_decision(
        &self,
        request: &PendingRequest,
        message: ChannelMessageRef,
        decision: Decision,
    ) -> Result<Option<Outcome>> {
        let mut decision = Some(decision);
        let result = self.store.update(&request.id, &mut |r| {
            let decision = decision.take().ok_or_else(|| RelayError::Storage {
                reason: "decision already consumed".into(),
            })?;
            r.mark_answered(decision)
        });
        match result {
            Ok(_) => Ok(None),
            Err(e) if e.is_not_found() => {
                self.mirrors.remove(&message);
                Ok(Some(Outcome::Expired))
            }
            Err(e) => {
                self.mirrors.release(&message);
                Err(e)
            }
        }
    }

    /// Re-render a prompt with a footer. Failures only lose cosmetics.
    async fn freeze(
        &self,
        message: &ChannelMessageRef,
        text: &str,
        footer: &str,
        keyboard: Option<&Keyboard>,
    ) {
        let text = render::with_footer(text, footer);
        if let Err(e) = self.channel.edit(message, &text, keyboard).await {
            tracing::warn!(
                chat_id = message.chat_id,
                message_id = message.message_id,
                error = %e,
                "failed to freeze prompt"
            );
        }
    }

    fn forget_request(&self, id: &str) {
        if let Some(message) = self.mirrors.message_for(id) {
            self.mirrors.remove(&message);
        }
    }

    // -----------------------------------------------------------------------
    // Cancel
    // -----------------------------------------------------------------------

    /// Move a Sent request to Cancelled, freeze its prompt and drop its
    /// mirror. No decision is written. Caller holds the session lock.
    async fn cancel_locked(&self, request: &PendingRequest) -> Result<()> {
        match self
            .store
            .update(&request.id, &mut |r| r.transition(RequestStatus::Cancelled))
        {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let Some(message) = request.channel_message else {
            return Ok(());
        };
        let (text, keyboard) = self.frozen_view(request, &message);
        self.freeze(&message, &text, render::FOOTER_CANCELLED, keyboard.as_ref())
            .await;
        self.mirrors.remove(&message);
        tracing::info!(request_id = %request.id, session_id = %request.session_id, "request cancelled");
        Ok(())
    }

    /// Last rendered text and an inert keyboard for a prompt.
    fn frozen_view(
        &self,
        request: &PendingRequest,
        message: &ChannelMessageRef,
    ) -> (String, Option<Keyboard>) {
        if let Some(state) = self.mirrors.permission(message) {
            let keyboard = render::permission_keyboard(&state, None, true);
            return (state.text, Some(keyboard));
        }
        if let Some(state) = self.mirrors.question(message) {
            let keyboard = render::question_keyboard(&state, true);
            return (state.text, Some(keyboard));
        }
        (
            render::active_page(&request.payload, self.max_message_len()),
            None,
        )
    }

    /// Cancel every Sent request of a session matching `filter`. Caller
    /// holds the session lock.
    async fn cancel_sent_locked(
        &self,
        session_id: &str,
        filter: impl Fn(&PendingRequest) -> bool,
    ) -> Result<usize> {
        let mut cancelled = 0;
        for entry in self.store.scan()? {
            let StoredEntry::Request(request) = entry else {
                continue;
            };
            if request.session_id != session_id
                || request.status != RequestStatus::Sent
                || !filter(&request)
            {
                continue;
            }
            self.cancel_locked(&request).await?;
            cancelled += 1;
        }
        Ok(cancelled)
    }

    /// Cancel Sent requests whose originating hook process has exited, then
    /// forget prompts whose request has settled or been consumed.
    pub async fn sweep_stale(&self) -> Result<usize> {
        // Snapshots come before the scan so that anything tracked after it
        // is left for the next sweep.
        let tracked = self.mirrors.tracked();
        let partial: Vec<String> = self
            .delivered_pages
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let entries = self.store.scan()?;
        let open: HashSet<String> = entries
            .iter()
            .filter_map(|entry| match entry {
                StoredEntry::Request(r) if !r.status.is_terminal() => Some(r.id.clone()),
                StoredEntry::Request(_) => None,
                StoredEntry::Corrupt { id, .. } => Some(id.clone()),
            })
            .collect();

        let mut cancelled = 0;
        for entry in entries {
            let StoredEntry::Request(request) = entry else {
                continue;
            };
            if request.status != RequestStatus::Sent || process_alive(request.origin_pid) {
                continue;
            }
            let _guard = self.sessions.lock(&request.session_id).await;
            let Some(current) = self.read_opt(&request.id)? else {
                continue;
            };
            if current.status == RequestStatus::Sent && !process_alive(current.origin_pid) {
                self.cancel_locked(&current).await?;
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            tracing::info!(cancelled, "stale sweep cancelled requests");
        }

        let mut forgotten = 0;
        for (message, id) in tracked {
            if !open.contains(&id) {
                self.mirrors.remove(&message);
                forgotten += 1;
            }
        }
        for id in partial {
            if !open.contains(&id) {
                self.delivered_pages.remove(&id);
            }
        }
        let notices = self.mirrors.prune_notices(NOTICE_RETENTION);
        if forgotten > 0 || notices > 0 {
            tracing::debug!(forgotten, notices, "pruned settled prompts");
        }
        Ok(cancelled)
    }
}

/// Keyboard for a freshly rendered prompt.
fn initial_keyboard(request: &PendingRequest) -> Keyboard {
    match &request.payload {
        RequestPayload::Permission {
            tool_name,
            suggestions,
            ..
        } => {
            let state = PermissionState {
                request_id: request.id.clone(),
                session_id: request.session_id.clone(),
                tool_name: tool_name.clone(),
                suggestions: suggestions.clone(),
                text: String::new(),
                resolved: false,
            };
            render::permission_keyboard(&state, None, false)
        }
        RequestPayload::Question { questions, .. } => {
            let state = QuestionState::new(&request.id, &request.session_id, questions, String::new());
            render::question_keyboard(&state, false)
        }
    }
}
