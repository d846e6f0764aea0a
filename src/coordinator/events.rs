use crate::error::Result;
use crate::event::{EventContext, HookEvent};

use super::Coordinator;

/// Notification type the agent emits while it waits on a permission prompt.
/// The prompt itself already reached the operator, so no notice is sent.
const PERMISSION_PROMPT_NOTIFICATION: &str = "permission_prompt";

impl Coordinator {
    /// Apply a lifecycle hook event to the session state.
    #[tracing::instrument(level = "debug", skip_all, fields(event = event.name()))]
    pub async fn handle_event(
        &self,
        event: &HookEvent,
        terminal_target: Option<&str>,
    ) -> Result<()> {
        let Some(context) = event.context() else {
            return Ok(());
        };
        let session_id = context.session_id.as_str();
        let _guard = self.sessions.lock(session_id).await;

        self.sessions.add(session_id, terminal_target, &context.cwd);
        let target = terminal_target
            .map(String::from)
            .or_else(|| self.sessions.get(session_id)?.terminal_target);

        if event.is_agent_activity() {
            if let Some(target) = target.as_deref() {
                self.clear_reactions(target).await;
            }
        }

        match event {
            HookEvent::UserPromptSubmit { .. } | HookEvent::Stop { .. } => {
                self.cancel_sent_locked(session_id, |_| true).await?;
            }
            HookEvent::SessionEnd { .. } => {
                self.cancel_sent_locked(session_id, |_| true).await?;
                self.sessions.remove(session_id);
                tracing::info!(session_id, "session ended");
            }
            HookEvent::PostToolUse(tool) => {
                // The tool ran, so its prompt was answered in the terminal.
                let cancelled = self
                    .cancel_sent_locked(session_id, |r| {
                        r.payload.tool_name() == tool.tool_name
                            && r.payload.tool_input() == &tool.tool_input
                    })
                    .await?;
                if cancelled > 0 {
                    tracing::info!(session_id, tool = %tool.tool_name, cancelled, "prompt answered in terminal");
                }
            }
            _ => {}
        }

        match event {
            HookEvent::Stop { context } => {
                let text = format!("✅ Agent finished in {}", project_name(context));
                self.send_notice(session_id, target.as_deref(), &text).await;
            }
            HookEvent::Notification {
                message,
                notification_type,
                ..
            } if notification_type.as_deref() != Some(PERMISSION_PROMPT_NOTIFICATION) => {
                let text = format!("🔔 {} ({})", message, project_name(context));
                self.send_notice(session_id, target.as_deref(), &text).await;
            }
            _ => {}
        }
        Ok(())
    }

    /// Remove every acknowledgement mark recorded for a target.
    pub(crate) async fn clear_reactions(&self, target: &str) {
        for message in self.reactions.take(target) {
            if let Err(e) = self.channel.react(&message, None).await {
                tracing::debug!(target, error = %e, "failed to clear reaction");
            }
        }
    }

    /// Send an operator notice. Replies to it are relayed to `target`.
    async fn send_notice(&self, session_id: &str, target: Option<&str>, text: &str) {
        let chat_id = match self.route(session_id, target) {
            Ok(chat_id) => chat_id,
            Err(e) => {
                tracing::debug!(session_id, error = %e, "no route for notice");
                return;
            }
        };
        let text: String = text.chars().take(self.max_message_len()).collect();
        match self.channel.send(chat_id, &text, None).await {
            Ok(message) => {
                if let Some(target) = target {
                    self.mirrors.link_notice(message, target);
                }
            }
            Err(e) => tracing::warn!(session_id, error = %e, "failed to send notice"),
        }
    }
}

/// Last path component of the session's working directory.
fn project_name(context: &EventContext) -> &str {
    std::path::Path::new(&context.cwd)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(context.cwd.as_str())
}
