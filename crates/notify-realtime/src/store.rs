//! Deduplicated notification store with read/unread tracking.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::types::{Notification, NotificationId, NotificationKind, NotificationStatus, Priority};

/// Predicate over stored notifications. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationFilter {
    pub kind: Option<NotificationKind>,
    pub status: Option<NotificationStatus>,
    pub priority: Option<Priority>,
    pub unread_only: bool,
    /// Case-insensitive substring match over title and message.
    pub search: Option<String>,
}

impl NotificationFilter {
    pub fn matches(&self, n: &Notification) -> bool {
        if self.kind.as_ref().is_some_and(|k| *k != n.kind) {
            return false;
        }
        if self.status.is_some_and(|s| s != n.status) {
            return false;
        }
        if self.priority.is_some_and(|p| p != n.priority) {
            return false;
        }
        if self.unread_only && !n.is_unread() {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                n.title.to_lowercase().contains(&needle)
                    || n.message.to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }
}

/// Offset-based view over the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub filter: NotificationFilter,
    pub offset: usize,
    /// `None` returns every match after `offset`.
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Notification>,
    /// Number of matches before pagination.
    pub total: usize,
    pub has_more: bool,
}

/// Notifications in arrival order, unique by id.
///
/// The unread count always equals the number of stored `Pending`
/// notifications; it is only changed by the mutating methods below.
#[derive(Debug, Default)]
pub struct NotificationStore {
    items: Vec<Notification>,
    ids: HashSet<NotificationId>,
    unread: usize,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a notification unless its id is already known. Returns `true` if inserted.
    pub fn ingest(&mut self, notification: Notification) -> bool {
        if !self.ids.insert(notification.id) {
            return false;
        }
        if notification.is_unread() {
            self.unread += 1;
        }
        self.items.push(notification);
        true
    }

    /// Flip a notification to `Delivered`. Returns `true` if it was unread.
    pub fn mark_read(&mut self, id: NotificationId) -> bool {
        let Some(n) = self.items.iter_mut().find(|n| n.id == id) else {
            return false;
        };
        if n.status == NotificationStatus::Delivered {
            return false;
        }
        let was_unread = n.is_unread();
        n.status = NotificationStatus::Delivered;
        if was_unread {
            self.unread = self.unread.saturating_sub(1);
        }
        was_unread
    }

    /// Mark every unread notification as delivered. Returns how many changed.
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for n in self.items.iter_mut().filter(|n| n.is_unread()) {
            n.status = NotificationStatus::Delivered;
            changed += 1;
        }
        self.unread = 0;
        changed
    }

    /// Remove every notification matching `filter` (an empty filter removes all).
    /// Returns how many were removed.
    pub fn clear(&mut self, filter: &NotificationFilter) -> usize {
        let before = self.items.len();
        self.items.retain(|n| !filter.matches(n));
        self.ids = self.items.iter().map(|n| n.id).collect();
        self.unread = self.recount_unread();
        before - self.items.len()
    }

    pub fn query(&self, query: &Query) -> Page {
        let matches: Vec<&Notification> = self
            .items
            .iter()
            .filter(|n| query.filter.matches(n))
            .collect();
        let total = matches.len();
        let limit = query.limit.unwrap_or(usize::MAX);
        let items: Vec<Notification> = matches
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .cloned()
            .collect();
        let has_more = query.offset.saturating_add(items.len()) < total;
        Page {
            items,
            total,
            has_more,
        }
    }

    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.items.iter().find(|n| n.id == id)
    }

    pub fn contains(&self, id: NotificationId) -> bool {
        self.ids.contains(&id)
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn recount_unread(&self) -> usize {
        self.items.iter().filter(|n| n.is_unread()).count()
    }
}

/// Store handle shared between the session task and the caller.
#[derive(Debug, Clone, Default)]
pub struct SharedStore(Arc<Mutex<NotificationStore>>);

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the store. A poisoned lock is recovered: every mutation leaves
    /// the store consistent before it can panic.
    pub fn lock(&self) -> MutexGuard<'_, NotificationStore> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notif(id: NotificationId, status: NotificationStatus) -> Notification {
        Notification {
            id,
            kind: NotificationKind::InApp,
            title: format!("title {id}"),
            message: format!("message {id}"),
            priority: Priority::Medium,
            status,
            created_at: None,
        }
    }

    fn pending(id: NotificationId) -> Notification {
        notif(id, NotificationStatus::Pending)
    }

    fn assert_unread_consistent(store: &NotificationStore) {
        assert_eq!(store.unread_count(), store.recount_unread());
    }

    #[test]
    fn ingest_dedups_by_id() {
        let mut store = NotificationStore::new();
        assert!(store.ingest(pending(1)));
        assert!(!store.ingest(pending(1)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.unread_count(), 1);

        // A duplicate with a different status is still ignored.
        assert!(!store.ingest(notif(1, NotificationStatus::Delivered)));
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn ingest_non_pending_does_not_count_as_unread() {
        let mut store = NotificationStore::new();
        store.ingest(notif(1, NotificationStatus::Delivered));
        store.ingest(notif(2, NotificationStatus::Failed));
        assert_eq!(store.unread_count(), 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn mark_read_is_idempotent() {
        let mut store = NotificationStore::new();
        store.ingest(pending(42));
        assert_eq!(store.unread_count(), 1);
        assert!(store.mark_read(42));
        assert_eq!(store.unread_count(), 0);
        assert!(!store.mark_read(42));
        assert_eq!(store.unread_count(), 0);
        assert_eq!(
            store.get(42).map(|n| n.status),
            Some(NotificationStatus::Delivered)
        );
    }

    #[test]
    fn mark_read_unknown_id_is_noop() {
        let mut store = NotificationStore::new();
        store.ingest(pending(1));
        assert!(!store.mark_read(99));
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn mark_read_failed_notification_keeps_unread_count() {
        let mut store = NotificationStore::new();
        store.ingest(notif(5, NotificationStatus::Failed));
        store.ingest(pending(6));
        assert!(!store.mark_read(5));
        assert_eq!(
            store.get(5).map(|n| n.status),
            Some(NotificationStatus::Delivered)
        );
        assert_eq!(store.unread_count(), 1);
        assert_unread_consistent(&store);
    }

    #[test]
    fn mark_all_read() {
        let mut store = NotificationStore::new();
        for id in 1..=4 {
            store.ingest(pending(id));
        }
        store.ingest(notif(5, NotificationStatus::Delivered));
        assert_eq!(store.mark_all_read(), 4);
        assert_eq!(store.unread_count(), 0);
        assert_eq!(store.mark_all_read(), 0);
    }

    #[test]
    fn clear_with_filter_recomputes_unread() {
        let mut store = NotificationStore::new();
        store.ingest(pending(1));
        store.ingest(pending(2));
        store.ingest(notif(3, NotificationStatus::Delivered));
        let removed = store.clear(&NotificationFilter {
            status: Some(NotificationStatus::Pending),
            ..Default::default()
        });
        assert_eq!(removed, 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.unread_count(), 0);

        // Cleared ids can be ingested again.
        assert!(store.ingest(pending(1)));
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn clear_all() {
        let mut store = NotificationStore::new();
        store.ingest(pending(1));
        store.ingest(pending(2));
        assert_eq!(store.clear(&NotificationFilter::default()), 2);
        assert!(store.is_empty());
        assert_eq!(store.unread_count(), 0);
        assert!(!store.contains(1));
    }

    #[test]
    fn unread_count_matches_pending_after_mixed_operations() {
        let mut store = NotificationStore::new();
        let ops: &[(&str, NotificationId)] = &[
            ("ingest", 1),
            ("ingest", 2),
            ("ingest", 3),
            ("ingest", 2),
            ("read", 2),
            ("read", 2),
            ("ingest", 4),
            ("clear_pending", 0),
            ("ingest", 5),
            ("ingest", 1),
            ("read_all", 0),
            ("ingest", 6),
        ];
        for (op, id) in ops {
            match *op {
                "ingest" => {
                    store.ingest(pending(*id));
                }
                "read" => {
                    store.mark_read(*id);
                }
                "read_all" => {
                    store.mark_all_read();
                }
                "clear_pending" => {
                    store.clear(&NotificationFilter {
                        unread_only: true,
                        ..Default::default()
                    });
                }
                other => panic!("unknown op {other}"),
            }
            assert_unread_consistent(&store);
        }
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn query_filters_and_paginates_in_arrival_order() {
        let mut store = NotificationStore::new();
        for id in 1..=5 {
            store.ingest(pending(id));
        }
        let mut urgent = pending(6);
        urgent.priority = Priority::High;
        urgent.kind = NotificationKind::Email;
        urgent.title = "Payment FAILED".to_string();
        store.ingest(urgent);

        let page = store.query(&Query {
            offset: 1,
            limit: Some(2),
            ..Default::default()
        });
        assert_eq!(page.items.iter().map(|n| n.id).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(page.total, 6);
        assert!(page.has_more);

        let last = store.query(&Query {
            offset: 4,
            limit: Some(10),
            ..Default::default()
        });
        assert_eq!(last.items.len(), 2);
        assert!(!last.has_more);

        let by_priority = store.query(&Query {
            filter: NotificationFilter {
                priority: Some(Priority::High),
                kind: Some(NotificationKind::Email),
                ..Default::default()
            },
            ..Default::default()
        });
        assert_eq!(by_priority.items.len(), 1);

        let by_text = store.query(&Query {
            filter: NotificationFilter {
                search: Some("payment failed".to_string()),
                ..Default::default()
            },
            ..Default::default()
        });
        assert_eq!(by_text.items.first().map(|n| n.id), Some(6));

        store.mark_read(6);
        let unread_only = store.query(&Query {
            filter: NotificationFilter {
                unread_only: true,
                ..Default::default()
            },
            ..Default::default()
        });
        assert_eq!(unread_only.total, 5);
    }

    #[test]
    fn query_offset_past_end() {
        let mut store = NotificationStore::new();
        store.ingest(pending(1));
        let page = store.query(&Query {
            offset: 10,
            limit: Some(5),
            ..Default::default()
        });
        assert!(page.items.is_empty());
        assert_eq!(page.total, 1);
        assert!(!page.has_more);
    }

    #[test]
    fn search_matches_message_body() {
        let filter = NotificationFilter {
            search: Some("  MESSAGE 3 ".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&pending(3)));
        assert!(!filter.matches(&pending(4)));
    }

    #[test]
    fn shared_store_clones_share_state() {
        let shared = SharedStore::new();
        let other = shared.clone();
        shared.lock().ingest(pending(1));
        assert_eq!(other.lock().len(), 1);
    }
}
