//! Identifiers for watchers and dependency nodes.
//!
//! Both are drawn from process-wide monotonically increasing counters. For
//! watchers the id doubles as the scheduling key: a lower id means the
//! watcher was created earlier and therefore runs first within a flush.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatcherId(u64);

impl WatcherId {
    /// Generate a new unique watcher ID.
    ///
    /// IDs are strictly increasing in creation order.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for WatcherId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Unique identifier for a dependency node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepId(u64);

impl DepId {
    /// Generate a new unique dependency ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for DepId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watcher_ids_increase_in_creation_order() {
        let id1 = WatcherId::new();
        let id2 = WatcherId::new();
        let id3 = WatcherId::new();

        assert!(id1 < id2);
        assert!(id2 < id3);
    }

    #[test]
    fn dep_ids_are_unique() {
        let id1 = DepId::new();
        let id2 = DepId::new();
        assert_ne!(id1, id2);
        assert_eq!(format!("{}", id1), format!("d{}", id1.raw()));
    }
}
