//! # Message History
//!
//! Passive recorder of everything seen on the fabric, grouped by pattern, for
//! test assertions. Entries are append-only; only the explicit clear
//! operations remove them.

use crate::channel::Subscription;
use crate::fabric::RoutingFabric;
use crate::message::Message;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Insertion-ordered message log keyed by pattern.
#[derive(Default)]
pub struct MessageHistory {
    entries: RwLock<HashMap<String, Vec<Message>>>,
}

impl MessageHistory {
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `history` to both channels of `fabric`.
    ///
    /// Recording stops when the returned subscriptions are dropped.
    #[must_use]
    pub fn attach(history: &Arc<Self>, fabric: &RoutingFabric) -> [Subscription; 2] {
        let on_request = Arc::clone(history);
        let on_reply = Arc::clone(history);
        [
            fabric
                .requests()
                .subscribe(move |m: &Message| on_request.record(m.clone())),
            fabric
                .replies()
                .subscribe(move |m: &Message| on_reply.record(m.clone())),
        ]
    }

    /// Append a message under its pattern.
    pub fn record(&self, message: Message) {
        self.entries
            .write()
            .entry(message.pattern.clone())
            .or_default()
            .push(message);
    }

    /// Up to `n` most recent messages for `pattern`, oldest first.
    #[must_use]
    pub fn recent_for_pattern(&self, pattern: &str, n: usize) -> Vec<Message> {
        let entries = self.entries.read();
        let Some(messages) = entries.get(pattern) else {
            return Vec::new();
        };
        let start = messages.len().saturating_sub(n);
        messages[start..].to_vec()
    }

    /// Most recent message for `pattern`, or [`Message::sentinel`] if none.
    #[must_use]
    pub fn last_for_pattern(&self, pattern: &str) -> Message {
        self.entries
            .read()
            .get(pattern)
            .and_then(|messages| messages.last().cloned())
            .unwrap_or_else(Message::sentinel)
    }

    /// Number of messages recorded for `pattern`.
    #[must_use]
    pub fn count_for_pattern(&self, pattern: &str) -> usize {
        self.entries.read().get(pattern).map_or(0, Vec::len)
    }

    /// Forget everything.
    pub fn clear_all(&self) {
        self.entries.write().clear();
        debug!("Message history cleared");
    }

    /// Forget the messages of one pattern.
    pub fn clear_for_pattern(&self, pattern: &str) {
        self.entries.write().remove(pattern);
        debug!(pattern = pattern, "Message history cleared for pattern");
    }
}
