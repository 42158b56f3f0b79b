//! Dependency Nodes
//!
//! A [`Dep`] is the subscription point for one piece of tracked state: a
//! single property, or the shape of a container. It keeps the watchers that
//! read that state during their last evaluation, in the order they first
//! subscribed.
//!
//! Edges are bidirectional. The node holds weak references to its watchers
//! and each watcher holds strong references to the nodes it depends on, so a
//! node never keeps a dropped watcher alive. Deciding whether an edge is new
//! is the watcher's job (see [`Watcher::add_dep`]); the node only stores it.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use super::context::ReactiveContext;
use super::watcher::{WeakWatcher, Watcher};
use super::{DepId, WatcherId};
use crate::config;

/// A subscription point for one piece of tracked state.
///
/// Cloning a `Dep` yields another handle to the same node.
#[derive(Clone)]
pub struct Dep {
    inner: Arc<DepInner>,
}

struct DepInner {
    id: DepId,

    /// Subscribers in insertion order.
    subs: Mutex<IndexMap<WatcherId, WeakWatcher>>,
}

impl Dep {
    /// Create a node with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DepInner {
                id: DepId::new(),
                subs: Mutex::new(IndexMap::new()),
            }),
        }
    }

    /// Get the node's unique ID.
    pub fn id(&self) -> DepId {
        self.inner.id
    }

    /// Append a subscriber.
    pub fn add_sub(&self, watcher: &Watcher) {
        self.inner
            .subs
            .lock()
            .insert(watcher.id(), watcher.downgrade());
    }

    /// Remove a subscriber, keeping the order of the rest.
    pub fn remove_sub(&self, id: WatcherId) {
        self.inner.subs.lock().shift_remove(&id);
    }

    /// Register the current watcher, if any, as a dependent.
    pub fn depend(&self) {
        if let Some(watcher) = ReactiveContext::current() {
            watcher.add_dep(self);
        }
    }

    /// Tell every subscriber that the state behind this node changed.
    ///
    /// The subscriber list is snapshotted first so that updates may freely
    /// subscribe or unsubscribe (e.g. a callback tearing down another
    /// watcher). When flushing is synchronous the scheduler never sees the
    /// batch, so the snapshot is sorted by creation order here instead.
    pub fn notify(&self) {
        let mut subs: Vec<Watcher> = self
            .inner
            .subs
            .lock()
            .values()
            .filter_map(WeakWatcher::upgrade)
            .collect();

        if !config::async_flush() {
            subs.sort_by_key(Watcher::id);
        }

        trace!(dep_id = %self.id(), subscribers = subs.len(), "notify");

        for watcher in subs {
            watcher.update();
        }
    }

    /// Check whether a watcher is subscribed.
    pub fn has_sub(&self, id: WatcherId) -> bool {
        self.inner.subs.lock().contains_key(&id)
    }

    /// IDs of the current subscribers, in subscription order.
    pub fn subscriber_ids(&self) -> Vec<WatcherId> {
        self.inner.subs.lock().keys().copied().collect()
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subs.lock().len()
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Dep {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Dep {}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.id())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
