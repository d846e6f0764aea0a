use dashmap::DashMap;

use crate::request::ChannelMessageRef;

/// Acknowledgement marks placed on operator messages that were relayed to a
/// terminal target. Cleared in bulk once that target produces new output.
#[derive(Default)]
pub struct ReactionBook {
    by_target: DashMap<String, Vec<ChannelMessageRef>>,
}

impl ReactionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, target: &str, message: ChannelMessageRef) {
        self.by_target
            .entry(target.to_string())
            .or_default()
            .push(message);
    }

    /// Remove and return every mark for `target`.
    pub fn take(&self, target: &str) -> Vec<ChannelMessageRef> {
        self.by_target
            .remove(target)
            .map(|(_, marks)| marks)
            .unwrap_or_default()
    }

    pub fn count(&self, target: &str) -> usize {
        self.by_target.get(target).map(|m| m.len()).unwrap_or(0)
    }
}
