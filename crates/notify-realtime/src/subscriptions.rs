//! Topic subscriptions, replayed on every (re)connect.

use std::collections::BTreeSet;

use crate::codec::ClientFrame;

/// The set of notification topics the caller wants. Set semantics; not persisted.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionRegistry {
    topics: BTreeSet<String>,
}

impl SubscriptionRegistry {
    /// Add topics. Returns the ones that were not already subscribed, in input order.
    pub(crate) fn subscribe(&mut self, topics: Vec<String>) -> Vec<String> {
        topics
            .into_iter()
            .filter(|t| self.topics.insert(t.clone()))
            .collect()
    }

    /// Remove topics. Returns the ones that were actually subscribed.
    pub(crate) fn unsubscribe(&mut self, topics: Vec<String>) -> Vec<String> {
        topics
            .into_iter()
            .filter(|t| self.topics.remove(t))
            .collect()
    }

    pub(crate) fn topics(&self) -> Vec<String> {
        self.topics.iter().cloned().collect()
    }

    /// The `subscribe` frame that restores the full set on a fresh connection.
    pub(crate) fn replay_frame(&self) -> Option<ClientFrame> {
        if self.topics.is_empty() {
            return None;
        }
        Some(ClientFrame::Subscribe {
            notification_types: self.topics(),
        })
    }
}
