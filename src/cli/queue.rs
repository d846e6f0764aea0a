use crate::config::RelayConfig;
use crate::decision::{Interaction, Outcome};
use crate::error::Result;
use crate::ipc::{BindRequest, DaemonClient};
use crate::request::RequestPayload;
use crate::storage::file::FileRequestStore;
use crate::storage::{RequestStore, StoredEntry};

/// List pending requests straight from the store.
pub async fn run_pending(config: &RelayConfig) -> Result<()> {
    let store = FileRequestStore::new(config.pending_dir());
    let entries = store.scan()?;

    if entries.is_empty() {
        println!("No pending requests.");
        return Ok(());
    }

    for entry in &entries {
        match entry {
            StoredEntry::Request(request) => {
                let summary = match &request.payload {
                    RequestPayload::Permission { tool_input, .. } => tool_input.to_string(),
                    RequestPayload::Question { questions, .. } => questions
                        .iter()
                        .map(|q| q.question.as_str())
                        .collect::<Vec<_>>()
                        .join(" | "),
                };
                println!(
                    "ID: {}\n  Status: {}\n  Kind: {}\n  Tool: {}\n  Input: {}\n  Session: {}\n  Target: {}\n  Created: {}\n",
                    request.id,
                    request.status,
                    request.kind(),
                    request.payload.tool_name(),
                    truncate(&summary, 80),
                    request.session_id,
                    request.terminal_target.as_deref().unwrap_or("-"),
                    request.created_at,
                );
            }
            StoredEntry::Corrupt { id, reason } => {
                println!("ID: {}\n  Unreadable: {}\n", id, reason);
            }
        }
    }

    println!("{} request(s)", entries.len());
    Ok(())
}

/// Approve a request through the daemon.
pub async fn run_approve(config: &RelayConfig, id: &str, always: Option<usize>) -> Result<()> {
    let interaction = match always {
        Some(index) => Interaction::AlwaysAllow { index },
        None => Interaction::Allow,
    };
    let outcome = resolve(config, id, &interaction).await?;
    report(id, "approved", &outcome);
    Ok(())
}

/// Deny a request through the daemon.
pub async fn run_deny(config: &RelayConfig, id: &str, message: Option<String>) -> Result<()> {
    let outcome = resolve(config, id, &Interaction::Deny { message }).await?;
    report(id, "denied", &outcome);
    Ok(())
}

pub async fn run_bind(config: &RelayConfig, request: BindRequest) -> Result<()> {
    let client = DaemonClient::new(&config.daemon_url(), config.notify_timeout())?;
    let bound = client.bind(&request).await?;
    eprintln!("hook-relay: {} bound to chat {}", bound.target, bound.chat_id);
    Ok(())
}

pub async fn run_unbind(config: &RelayConfig, target: &str) -> Result<()> {
    let client = DaemonClient::new(&config.daemon_url(), config.notify_timeout())?;
    client.unbind(target).await?;
    eprintln!("hook-relay: {} unbound", target);
    Ok(())
}

async fn resolve(config: &RelayConfig, id: &str, interaction: &Interaction) -> Result<Outcome> {
    let client = DaemonClient::new(&config.daemon_url(), config.notify_timeout())?;
    client.resolve(id, interaction).await
}

fn report(id: &str, verb: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Resolved => eprintln!("hook-relay: {} {}", verb, id),
        other => eprintln!(
            "hook-relay: {} not {}: {}",
            id,
            verb,
            other.operator_text().unwrap_or_default()
        ),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}
