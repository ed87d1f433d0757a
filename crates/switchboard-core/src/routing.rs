//! Bounded most-recently-used set of client ids.
//!
//! A sink remembers which foreign client ids flowed through it so that
//! addressed replies can find their way back. Memory is bounded: at capacity
//! the least recently seen id is evicted.

use std::collections::VecDeque;

pub const DEFAULT_ROUTING_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct RoutingTable {
    // Front is the most recently seen id
    ids: VecDeque<String>,
    capacity: usize,
}

impl RoutingTable {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ids: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record `id` as most recently seen. Returns the evicted id, if any.
    pub fn touch(&mut self, id: &str) -> Option<String> {
        if let Some(pos) = self.ids.iter().position(|known| known == id) {
            if pos != 0
                && let Some(known) = self.ids.remove(pos)
            {
                self.ids.push_front(known);
            }
            return None;
        }

        let evicted = if self.ids.len() >= self.capacity {
            self.ids.pop_back()
        } else {
            None
        };
        self.ids.push_front(id.to_string());
        evicted
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|known| known == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ids from most to least recently seen.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new(DEFAULT_ROUTING_CAPACITY)
    }
}
