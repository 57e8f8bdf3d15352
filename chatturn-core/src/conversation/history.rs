//! Message History Management

use std::time::Duration;
use tokio::time::Instant;

use crate::llm::Message;

/// Conversational memory with an idle-expiry clock.
///
/// Records are kept oldest first. After every completed turn the store holds
/// one user and one assistant record per turn, so its length is even.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    messages: Vec<Message>,
    last_activity: Instant,
}

impl HistoryStore {
    /// Create an empty store whose idle clock starts now
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Create an empty store whose idle clock starts at `now`
    pub fn starting_at(now: Instant) -> Self {
        Self {
            messages: Vec::new(),
            last_activity: now,
        }
    }

    /// Append a record. Does not refresh the idle clock.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Discard every record
    pub fn reset(&mut self) {
        self.messages.clear();
    }

    /// Whether more than `timeout` has passed between the last activity and `now`
    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) > timeout
    }

    /// Record activity at `now`
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// When the last turn completed (or the store was created)
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Get all records, oldest first
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get record count
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if history is empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}
