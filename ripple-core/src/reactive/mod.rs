//! Reactive Primitives
//!
//! This module implements the dependency-tracking core: dependency nodes,
//! watchers, the tracking context, and computed values built on lazy
//! watchers.
//!
//! # Concepts
//!
//! ## Dependency Nodes
//!
//! A [`Dep`] stands for one piece of observable state. Reading that state
//! while a watcher evaluates subscribes the watcher to the node; changing it
//! notifies every subscriber.
//!
//! ## Watchers
//!
//! A [`Watcher`] is a computation (render function, computed expression or
//! user watch callback). It records the nodes it read during its last
//! evaluation and re-runs when any of them notifies.
//!
//! ## Computed Values
//!
//! A [`Computed`] is a memoized derived value. It recomputes only when read
//! after one of its dependencies changed.
//!
//! # Implementation Notes
//!
//! Dependency discovery is automatic: a thread-local tracking context knows
//! which watcher is evaluating, so reads wire themselves without any explicit
//! subscription call. Edges are rebuilt on every evaluation, and edges that
//! were not renewed are dropped, so conditional reads never leave stale
//! subscriptions behind.

mod computed;
mod context;
mod dep;
mod id;
mod watcher;

pub use computed::Computed;
pub use context::ReactiveContext;
pub use dep::Dep;
pub use id::{DepId, WatcherId};
pub use watcher::{Callback, Getter, Hook, Source, Watcher, WatcherOptions};
