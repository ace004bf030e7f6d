//! Named fan-out groups shared by every connection of a session.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

/// Fan-out groups keyed by name (`chat_<id>`, `avatar_<id>`).
///
/// Each subscriber owns an unbounded queue, so a slow socket never loses
/// events. A group exists while it has at least one subscriber. Messages are
/// delivered to subscribers in publish order.
pub struct BroadcastHub<T: Clone> {
    groups: DashMap<String, Vec<mpsc::UnboundedSender<T>>>,
}

impl<T: Clone> Default for BroadcastHub<T> {
    fn default() -> Self {
        Self {
            groups: DashMap::new(),
        }
    }
}

impl<T: Clone> BroadcastHub<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins `group`, creating it if needed.
    pub fn subscribe(&self, group: &str) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.groups.entry(group.to_string()).or_default().push(tx);
        rx
    }

    /// Sends `message` to every current subscriber of `group`. Returns how many
    /// subscribers it reached; a missing group reaches nobody.
    pub fn publish(&self, group: &str, message: T) -> usize {
        let Some(mut senders) = self.groups.get_mut(group) else {
            return 0;
        };
        senders.retain(|tx| tx.send(message.clone()).is_ok());
        senders.len()
    }

    /// Drops `group` once its last subscriber is gone. Call after dropping the
    /// receiver returned by [`subscribe`](Self::subscribe).
    pub fn release(&self, group: &str) {
        if let Some(mut senders) = self.groups.get_mut(group) {
            senders.retain(|tx| !tx.is_closed());
        }
        if self
            .groups
            .remove_if(group, |_, senders| senders.is_empty())
            .is_some()
        {
            debug!(group, "Removed empty broadcast group");
        }
    }

    pub fn subscriber_count(&self, group: &str) -> usize {
        self.groups
            .get(group)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}
