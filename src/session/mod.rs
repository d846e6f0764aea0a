pub mod binding;
pub mod reactions;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

pub use binding::ChannelBindings;
pub use reactions::ReactionBook;

/// An agent session seen through its hook events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub terminal_target: Option<String>,
    pub cwd: String,
    pub last_seen: DateTime<Utc>,
}

/// In-memory registry of live sessions plus the per-session locks that
/// serialize state transitions for events naming the same session.
///
/// Rebuilt from later hook events if lost; nothing here is durable.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, SessionRecord>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a session and refresh `last_seen`. A known target is never
    /// replaced by `None`.
    pub fn add(&self, session_id: &str, terminal_target: Option<&str>, cwd: &str) {
        let now = Utc::now();
        self.sessions
            .entry(session_id.to_string())
            .and_modify(|record| {
                if let Some(target) = terminal_target {
                    record.terminal_target = Some(target.to_string());
                }
                if !cwd.is_empty() {
                    record.cwd = cwd.to_string();
                }
                record.last_seen = now;
            })
            .or_insert_with(|| SessionRecord {
                session_id: session_id.to_string(),
                terminal_target: terminal_target.map(String::from),
                cwd: cwd.to_string(),
                last_seen: now,
            });
    }

    pub fn get(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.get(session_id).map(|r| r.clone())
    }

    /// Most recently seen session running in `target`.
    pub fn find_by_target(&self, target: &str) -> Option<SessionRecord> {
        self.most_recent(|r| r.terminal_target.as_deref() == Some(target))
    }

    /// Most recently seen session whose working directory is `cwd`.
    pub fn find_by_cwd(&self, cwd: &str) -> Option<SessionRecord> {
        self.most_recent(|r| r.cwd == cwd)
    }

    fn most_recent(&self, pred: impl Fn(&SessionRecord) -> bool) -> Option<SessionRecord> {
        self.sessions
            .iter()
            .filter(|r| pred(r.value()))
            .max_by_key(|r| r.last_seen)
            .map(|r| r.clone())
    }

    /// Drop a session, and its lock unless someone holds or awaits it.
    pub fn remove(&self, session_id: &str) -> Option<SessionRecord> {
        // A holder or waiter keeps its own clone of the Arc; evicting the
        // entry then would let the next caller mint a second mutex.
        self.locks
            .remove_if(session_id, |_, lock| Arc::strong_count(lock) == 1);
        self.sessions.remove(session_id).map(|(_, r)| r)
    }

    /// Drop every session running in `target`. Returns the removed ids.
    pub fn remove_by_target(&self, target: &str) -> Vec<String> {
        let ids: Vec<String> = self
            .sessions
            .iter()
            .filter(|r| r.terminal_target.as_deref() == Some(target))
            .map(|r| r.session_id.clone())
            .collect();
        for id in &ids {
            self.remove(id);
        }
        ids
    }

    /// All sessions, most recently seen first.
    pub fn list(&self) -> Vec<SessionRecord> {
        let mut all: Vec<SessionRecord> = self.sessions.iter().map(|r| r.clone()).collect();
        all.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        all
    }

    /// Acquire the lock for one session. Different sessions never contend.
    pub async fn lock(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}
