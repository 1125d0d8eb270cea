//! Bounded notification retention

use std::collections::VecDeque;

use super::{Notification, NotificationId};

/// Maximum notifications retained at once
pub const NOTIFICATION_CAPACITY: usize = 5;

/// Most-recent-first sequence of at most [`NOTIFICATION_CAPACITY`] entries.
///
/// Every operation is synchronous and total. Evicted entries are gone for good.
#[derive(Debug, Clone)]
pub struct NotificationStore {
    items: VecDeque<Notification>,
    capacity: usize,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::with_capacity(NOTIFICATION_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Prepend, evicting the oldest entries beyond capacity
    pub fn push(&mut self, notification: Notification) {
        self.items.push_front(notification);
        self.items.truncate(self.capacity);
    }

    /// Delete every entry matching `predicate`. Returns how many went.
    pub fn remove<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&Notification) -> bool,
    {
        let before = self.items.len();
        self.items.retain(|n| !predicate(n));
        before - self.items.len()
    }

    /// Remove entries whose order id or order number equals `key`
    pub fn remove_order(&mut self, key: &str) -> usize {
        self.remove(|n| n.matches_order_key(key))
    }

    pub fn dismiss(&mut self, id: NotificationId) -> bool {
        self.remove(|n| n.id == id) > 0
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn contains_equivalent(&self, notification: &Notification) -> bool {
        self.items.iter().any(|n| n.is_equivalent(notification))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.items.iter().cloned().collect()
    }
}
