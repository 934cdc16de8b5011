//! Dedup record of message ids already handled.
//!
//! Owned by the poll task alone, so it needs no locking. Unbounded by
//! default: an id, once inserted, is excluded for the life of the process.
//! The bounded variant evicts the oldest ids first once full; an evicted id
//! that resurfaces in the feed would be answered again.

use std::collections::{HashSet, VecDeque};

#[derive(Debug, Default)]
pub struct SeenSet {
    ids: HashSet<String>,
    /// Insertion order, tracked only when bounded.
    order: VecDeque<String>,
    capacity: Option<usize>,
}

impl SeenSet {
    /// Unbounded set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set holding at most `capacity` ids.
    pub fn bounded(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ids: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity: Some(capacity),
        }
    }

    pub fn from_capacity(capacity: Option<usize>) -> Self {
        match capacity {
            Some(n) => Self::bounded(n),
            None => Self::new(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Record `id`. Returns `false` if it was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.ids.contains(&id) {
            return false;
        }

        if let Some(capacity) = self.capacity {
            while self.order.len() >= capacity {
                match self.order.pop_front() {
                    Some(oldest) => {
                        self.ids.remove(&oldest);
                    }
                    None => break,
                }
            }
            self.order.push_back(id.clone());
        }

        self.ids.insert(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}
