use dashmap::DashMap;

/// Which chat a terminal target talks to.
#[derive(Default)]
pub struct ChannelBindings {
    by_target: DashMap<String, i64>,
}

impl ChannelBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, target: &str, chat_id: i64) {
        self.by_target.insert(target.to_string(), chat_id);
    }

    pub fn unbind(&self, target: &str) -> Option<i64> {
        self.by_target.remove(target).map(|(_, chat)| chat)
    }

    pub fn chat_for(&self, target: &str) -> Option<i64> {
        self.by_target.get(target).map(|c| *c)
    }

    /// The target bound to `chat_id`, only if exactly one is.
    pub fn sole_target_for(&self, chat_id: i64) -> Option<String> {
        let mut targets = self
            .by_target
            .iter()
            .filter(|e| *e.value() == chat_id)
            .map(|e| e.key().clone());
        let first = targets.next()?;
        match targets.next() {
            Some(_) => None,
            None => Some(first),
        }
    }
}
