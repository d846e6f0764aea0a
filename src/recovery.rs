//! Startup reconstruction of in-memory state from the request store.

use std::sync::Arc;

use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::request::RequestStatus;
use crate::storage::StoredEntry;

/// What the scan found and did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecoveryReport {
    /// Pending requests that still need rendering.
    pub pending: Vec<String>,
    /// Sent requests whose mirror was rebuilt.
    pub rebuilt: usize,
    /// Answered or Cancelled orphans removed.
    pub deleted: usize,
    /// Records left untouched.
    pub skipped: usize,
}

/// Classify every stored request and rebuild mirrors for Sent ones.
///
/// Must run before the daemon accepts operator interactions. Pending ids are
/// returned rather than rendered here; see [`resume_pending`].
pub fn recover(coordinator: &Coordinator) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();
    let max_len = coordinator
        .config()
        .max_message_len
        .min(coordinator.channel().max_message_len());

    for entry in coordinator.store().scan()? {
        let request = match entry {
            StoredEntry::Request(request) => request,
            StoredEntry::Corrupt { id, reason } => {
                tracing::warn!(request_id = %id, %reason, "unreadable request file left in place");
                report.skipped += 1;
                continue;
            }
        };

        match request.status {
            RequestStatus::Pending => report.pending.push(request.id.clone()),
            RequestStatus::Sent => {
                if coordinator.mirrors().rebuild(&request, max_len) {
                    coordinator.sessions().add(
                        &request.session_id,
                        request.terminal_target.as_deref(),
                        &request.cwd,
                    );
                    report.rebuilt += 1;
                } else {
                    tracing::warn!(request_id = %request.id, "sent request has no channel message; left in place");
                    report.skipped += 1;
                }
            }
            RequestStatus::Answered | RequestStatus::Cancelled => {
                match coordinator.store().delete(&request.id) {
                    Ok(()) => report.deleted += 1,
                    Err(e) => {
                        tracing::warn!(request_id = %request.id, error = %e, "failed to delete orphan");
                        report.skipped += 1;
                    }
                }
            }
        }
    }

    tracing::info!(
        pending = report.pending.len(),
        rebuilt = report.rebuilt,
        deleted = report.deleted,
        skipped = report.skipped,
        "recovery scan complete"
    );
    Ok(report)
}

/// Render the Pending requests found by [`recover`] in the background.
pub fn resume_pending(coordinator: &Arc<Coordinator>, ids: Vec<String>) {
    for id in ids {
        let coordinator = Arc::clone(coordinator);
        tokio::spawn(async move {
            if let Err(e) = coordinator.process_pending(&id).await {
                tracing::warn!(request_id = %id, error = %e, "failed to resume pending request");
            }
        });
    }
}
