//! Hook-side protocol client.
//!
//! Runs once per agent event. Decision events write a pending request,
//! signal the daemon and poll the store until the request settles or the
//! hard timeout passes. Every failure degrades to "no special decision".

pub mod output;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::config::RelayConfig;
use crate::decision::Decision;
use crate::error::{RelayError, Result};
use crate::event::{HookEvent, ASK_USER_QUESTION};
use crate::ipc::{DaemonClient, LifecycleEvent};
use crate::request::{PendingRequest, RequestPayload, RequestStatus};
use crate::storage::file::FileRequestStore;
use crate::storage::RequestStore;

/// Writes a request and waits for its decision.
pub struct HookClient {
    store: Arc<dyn RequestStore>,
    daemon: DaemonClient,
    poll_interval: Duration,
    timeout: Duration,
}

impl HookClient {
    pub fn new(
        store: Arc<dyn RequestStore>,
        daemon: DaemonClient,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            daemon,
            poll_interval,
            timeout,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let store = Arc::new(FileRequestStore::new(config.pending_dir()));
        let daemon = DaemonClient::new(&config.daemon_url(), config.notify_timeout())?;
        Ok(Self::new(
            store,
            daemon,
            config.poll_interval(),
            config.hook_timeout(),
        ))
    }

    /// Create `request`, signal the daemon and wait for a decision.
    ///
    /// `Ok(None)` means the request was cancelled or removed.
    /// `Err(HookTimeout)` means nobody answered in time; the file is left for
    /// the daemon's stale sweep.
    pub async fn request_decision(&self, request: PendingRequest) -> Result<Option<Decision>> {
        let id = request.id.clone();
        self.store.create(&request)?;
        tracing::debug!(request_id = %id, kind = %request.kind(), "pending request written");

        if let Err(e) = self.daemon.process(&id).await {
            // The daemon also finds Pending files on its startup scan.
            tracing::warn!(request_id = %id, error = %e, "daemon not notified");
        }

        self.poll(&id).await
    }

    async fn poll(&self, id: &str) -> Result<Option<Decision>> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match self.store.read(id) {
                Ok(request) => match request.status {
                    RequestStatus::Answered => {
                        if let Err(e) = self.store.delete(id) {
                            tracing::debug!(request_id = %id, error = %e, "failed to remove answered request");
                        }
                        return Ok(request.decision);
                    }
                    RequestStatus::Cancelled => return Ok(None),
                    RequestStatus::Pending | RequestStatus::Sent => {}
                },
                Err(e) if e.is_not_found() => return Ok(None),
                // A torn read can't happen with rename, but a foreign writer
                // could leave junk; keep waiting for a good record.
                Err(RelayError::CorruptRequest { reason, .. }) => {
                    tracing::warn!(request_id = %id, %reason, "unreadable request file");
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(RelayError::HookTimeout {
                    timeout_secs: self.timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn forward(&self, event: HookEvent, terminal_target: Option<String>) {
        let event = LifecycleEvent {
            event,
            terminal_target,
        };
        if let Err(e) = self.daemon.post_event(&event).await {
            tracing::debug!(event = event.event.name(), error = %e, "lifecycle event not delivered");
        }
    }
}

/// Terminal target of the current process, from the configured env var.
pub fn terminal_target(config: &RelayConfig) -> Option<String> {
    std::env::var(&config.terminal_env)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Handle one hook invocation. Returns the JSON to print on stdout, if any.
pub async fn run_hook(
    client: &HookClient,
    input: &str,
    terminal_target: Option<String>,
) -> Result<Option<Value>> {
    let event = HookEvent::parse(input)?;

    let (request, tool_input) = match event {
        HookEvent::PermissionRequest(tool) if tool.tool_name != ASK_USER_QUESTION => {
            let payload = RequestPayload::Permission {
                tool_name: tool.tool_name,
                tool_input: tool.tool_input.clone(),
                suggestions: tool.permission_suggestions,
            };
            let request = PendingRequest::new(
                payload,
                &tool.context.session_id,
                terminal_target,
                &tool.context.cwd,
                std::process::id(),
            );
            (request, tool.tool_input)
        }
        HookEvent::PreToolUse(tool) if tool.tool_name == ASK_USER_QUESTION => {
            let payload = RequestPayload::question_from_input(tool.tool_input.clone())?;
            let request = PendingRequest::new(
                payload,
                &tool.context.session_id,
                terminal_target,
                &tool.context.cwd,
                std::process::id(),
            );
            (request, tool.tool_input)
        }
        HookEvent::Other => return Ok(None),
        HookEvent::PermissionRequest(_) => {
            // Questions get their prompt from the PreToolUse hook.
            return Ok(None);
        }
        event => {
            client.forward(event, terminal_target).await;
            return Ok(None);
        }
    };

    let kind = request.kind();
    match client.request_decision(request).await {
        Ok(Some(decision)) => Ok(output::encode(kind, &tool_input, &decision)),
        Ok(None) => Ok(None),
        Err(RelayError::HookTimeout { timeout_secs }) => {
            tracing::warn!(timeout_secs, "no decision before timeout");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
