use crate::ConversationKey;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Remote events this process deleted itself, remembered for a short window
/// so the network's delete confirmation is not bridged back as a new delete.
pub struct RecentlyDeletedSet {
    window: Duration,
    entries: Mutex<HashMap<(ConversationKey, String), Instant>>,
}

impl RecentlyDeletedSet {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, key: &ConversationKey, remote_event_id: &str) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, added| now.saturating_duration_since(*added) < self.window);
        entries.insert((key.clone(), remote_event_id.to_string()), now);
    }

    pub fn contains(&self, key: &ConversationKey, remote_event_id: &str) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(key.clone(), remote_event_id.to_string()))
            .map(|added| now.saturating_duration_since(*added) < self.window)
            .unwrap_or(false)
    }

    /// Removes the entry, returning whether it was present and unexpired.
    pub fn take(&self, key: &ConversationKey, remote_event_id: &str) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(key.clone(), remote_event_id.to_string()))
            .map(|added| now.saturating_duration_since(added) < self.window)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|added| now.saturating_duration_since(**added) < self.window)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
