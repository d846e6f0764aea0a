use crate::channel::InboundEvent;
use crate::decision::{Interaction, Outcome};
use crate::error::Result;
use crate::render::split_pages;
use crate::request::ChannelMessageRef;
use crate::terminal::{is_allowed_key, ALLOWED_KEYS};

use super::Coordinator;

/// Reaction marking operator input that was typed into a terminal.
pub const RELAYED_REACTION: &str = "👀";

const HINT: &str = "Reply to a prompt or notice to route your message, or bind this chat to a session. Use /sessions to list sessions.";

impl Coordinator {
    /// Handle one operator event from the channel.
    pub async fn handle_inbound(&self, event: InboundEvent) -> Result<()> {
        let chat_id = event.chat_id();
        if !self.config.telegram.is_allowed(chat_id) {
            tracing::debug!(chat_id, "ignoring event from unknown chat");
            return Ok(());
        }

        match event {
            InboundEvent::Callback {
                callback_id,
                message,
                data,
            } => {
                let outcome = match Interaction::from_callback(&data) {
                    Some(interaction) => match self.interact(message, interaction).await {
                        Ok(outcome) => Some(outcome),
                        Err(e) => {
                            tracing::warn!(chat_id, error = %e, "interaction failed");
                            Some(Outcome::Rejected("Something went wrong, try again".into()))
                        }
                    },
                    None => None,
                };
                let toast = outcome.and_then(|o| o.operator_text());
                self.channel
                    .answer_interaction(&callback_id, toast.as_deref())
                    .await
            }
            InboundEvent::Voice {
                message,
                reply_to,
                file_id,
            } => {
                let Some(transcriber) = self.transcriber.clone() else {
                    self.say(chat_id, "Voice messages aren't supported here; send text instead.")
                        .await;
                    return Ok(());
                };
                match transcriber.transcribe(&file_id).await {
                    Ok(text) if !text.trim().is_empty() => {
                        self.handle_text(message, reply_to, text.trim()).await
                    }
                    Ok(_) => {
                        self.say(chat_id, "Couldn't make out that voice message.").await;
                        Ok(())
                    }
                    Err(e) => {
                        tracing::warn!(chat_id, error = %e, "transcription failed");
                        self.say(chat_id, "Transcription failed.").await;
                        Ok(())
                    }
                }
            }
            InboundEvent::Text {
                message,
                reply_to,
                text,
            } => self.handle_text(message, reply_to, &text).await,
        }
    }

    async fn handle_text(
        &self,
        message: ChannelMessageRef,
        reply_to: Option<i64>,
        text: &str,
    ) -> Result<()> {
        if let Some(command) = text.strip_prefix('/') {
            return self.handle_command(message.chat_id, command).await;
        }

        if let Some(reply_to) = reply_to {
            let parent = ChannelMessageRef {
                chat_id: message.chat_id,
                message_id: reply_to,
            };
            if self.mirrors.request_for(&parent).is_some() {
                let interaction = Interaction::Reply {
                    text: text.to_string(),
                };
                let outcome = self.interact(parent, interaction).await?;
                if outcome != Outcome::Resolved {
                    if let Some(text) = outcome.operator_text() {
                        self.say(message.chat_id, &text).await;
                    }
                }
                return Ok(());
            }
            if let Some(target) = self.mirrors.notice_target(&parent) {
                return self.relay(&target, message, text).await;
            }
        }

        match self.default_target(message.chat_id) {
            Some(target) => self.relay(&target, message, text).await,
            None => {
                self.say(message.chat_id, HINT).await;
                Ok(())
            }
        }
    }

    /// Target for chat input that names none: the chat's only bound target,
    /// else the only session with a target.
    fn default_target(&self, chat_id: i64) -> Option<String> {
        if let Some(target) = self.bindings.sole_target_for(chat_id) {
            return Some(target);
        }
        let targets: Vec<String> = self
            .sessions
            .list()
            .into_iter()
            .filter_map(|s| s.terminal_target)
            .collect();
        match targets.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        }
    }

    /// Type operator text into a terminal target.
    ///
    /// A dead target is torn down (binding, sessions, notice links) and the
    /// operator is told instead.
    pub async fn relay(&self, target: &str, message: ChannelMessageRef, text: &str) -> Result<()> {
        if !self.ensure_alive(target, message.chat_id).await {
            return Ok(());
        }
        let (pane, typed) = (target.to_string(), text.to_string());
        let injected = self
            .on_terminal(target, move |t| t.inject(&pane, &typed))
            .await;
        if let Err(e) = injected {
            tracing::warn!(target, error = %e, "relay failed");
            self.say(message.chat_id, &format!("⚠️ Couldn't deliver to {target}: {e}"))
                .await;
            return Ok(());
        }
        match self.channel.react(&message, Some(RELAYED_REACTION)).await {
            Ok(()) => self.reactions.record(target, message),
            Err(e) => tracing::debug!(target, error = %e, "failed to mark relayed message"),
        }
        tracing::info!(target, chars = text.chars().count(), "relayed operator input");
        Ok(())
    }

    /// Liveness probe. Returns false after tearing down a dead target.
    async fn ensure_alive(&self, target: &str, chat_id: i64) -> bool {
        if self.target_exists(target).await {
            return true;
        }
        self.bindings.unbind(target);
        let removed = self.sessions.remove_by_target(target);
        self.mirrors.forget_target(target);
        self.reactions.take(target);
        tracing::info!(target, sessions = removed.len(), "terminal target gone");
        self.say(
            chat_id,
            &format!("⚠️ The session in {target} has ended; its binding was removed."),
        )
        .await;
        false
    }

    async fn handle_command(&self, chat_id: i64, command: &str) -> Result<()> {
        let mut parts = command.split_whitespace();
        let name = parts.next().unwrap_or_default();
        // Telegram appends "@botname" to commands in groups.
        let name = name.split('@').next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        match name {
            "sessions" => {
                let sessions = self.sessions.list();
                if sessions.is_empty() {
                    self.say(chat_id, "No active sessions.").await;
                    return Ok(());
                }
                let lines: Vec<String> = sessions
                    .iter()
                    .map(|s| {
                        let target = s.terminal_target.as_deref().unwrap_or("-");
                        let bound = s
                            .terminal_target
                            .as_deref()
                            .and_then(|t| self.bindings.chat_for(t))
                            .map(|chat| if chat == chat_id { " (bound here)" } else { " (bound)" })
                            .unwrap_or("");
                        format!(
                            "• {target} {}{bound}\n  session {} seen {}",
                            s.cwd,
                            short_id(&s.session_id),
                            s.last_seen.format("%H:%M:%S")
                        )
                    })
                    .collect();
                self.say(chat_id, &lines.join("\n")).await;
            }
            "screen" => {
                let Some(target) = self.command_target(chat_id, args.first().copied()) else {
                    self.say(chat_id, "Which session? Usage: /screen <target>").await;
                    return Ok(());
                };
                if !self.ensure_alive(&target, chat_id).await {
                    return Ok(());
                }
                let pane = target.clone();
                match self.on_terminal(&target, move |t| t.capture(&pane)).await {
                    Ok(screen) if screen.trim().is_empty() => {
                        self.say(chat_id, "(screen is empty)").await
                    }
                    Ok(screen) => {
                        for page in split_pages(&screen, self.max_message_len()) {
                            self.say(chat_id, &page).await;
                        }
                    }
                    Err(e) => self.say(chat_id, &format!("⚠️ {e}")).await,
                }
            }
            "key" => {
                let Some(key) = args.first().copied() else {
                    let usage = format!("Usage: /key <name>. Keys: {}", ALLOWED_KEYS.join(" "));
                    self.say(chat_id, &usage).await;
                    return Ok(());
                };
                if !is_allowed_key(key) {
                    self.say(chat_id, &format!("Unknown key {key}")).await;
                    return Ok(());
                }
                let Some(target) = self.command_target(chat_id, args.get(1).copied()) else {
                    self.say(chat_id, "Which session? Usage: /key <name> <target>").await;
                    return Ok(());
                };
                if !self.ensure_alive(&target, chat_id).await {
                    return Ok(());
                }
                let (pane, name) = (target.clone(), key.to_string());
                match self
                    .on_terminal(&target, move |t| t.send_key(&pane, &name))
                    .await
                {
                    Ok(()) => self.say(chat_id, &format!("Sent {key} to {target}")).await,
                    Err(e) => self.say(chat_id, &format!("⚠️ {e}")).await,
                }
            }
            _ => {
                self.say(chat_id, "Commands: /sessions, /screen [target], /key <name> [target]")
                    .await;
            }
        }
        Ok(())
    }

    fn command_target(&self, chat_id: i64, explicit: Option<&str>) -> Option<String> {
        explicit
            .map(String::from)
            .or_else(|| self.default_target(chat_id))
    }

    /// Best-effort plain message to the operator.
    async fn say(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.channel.send(chat_id, text, None).await {
            tracing::warn!(chat_id, error = %e, "failed to message operator");
        }
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
