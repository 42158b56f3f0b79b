//! Ripple Core
//!
//! This crate provides the dependency-tracking runtime of the Ripple reactive
//! framework. It implements:
//!
//! - Tracked containers (objects, arrays) and standalone tracked cells
//! - Watchers with automatic dependency discovery
//! - Lazily evaluated computed values
//! - A batching scheduler that runs each invalidated watcher once per tick
//!
//! Rendering, templates and component lifecycles live elsewhere; they build
//! on the primitives exported here.
//!
//! # Architecture
//!
//! - `observer`: converts plain containers into tracked ones
//! - `reactive`: dependency nodes, watchers, the tracking context
//! - `scheduler`: the watcher queue and the next-tick primitive
//! - `scope`: owner of root data and of the watchers created for it
//! - `config`: per-thread settings and the error reporting hook
//!
//! # Example
//!
//! ```rust
//! use ripple_core::observer::{ReactiveObject, Value};
//! use ripple_core::scheduler::drain_ticks;
//! use ripple_core::scope::{Scope, WatchOptions};
//!
//! let data = ReactiveObject::from_entries([("count", Value::from(1))]);
//! let scope = Scope::with_data("counter", data.clone());
//!
//! // Re-runs whenever `count` changes.
//! scope
//!     .watch(
//!         "count",
//!         |new, old| {
//!             println!("count: {:?} -> {:?}", old, new);
//!             Ok(())
//!         },
//!         WatchOptions::default(),
//!     )
//!     .unwrap();
//!
//! data.assign("count", Value::from(2));
//! data.assign("count", Value::from(3));
//!
//! // Both writes are batched into a single callback: 1 -> 3.
//! drain_ticks();
//! ```

pub mod config;
pub mod error;
pub mod observer;
pub mod reactive;
pub mod scheduler;
pub mod scope;

pub use config::ReactiveConfig;
pub use error::{BoxError, ReactiveError, Result};
pub use observer::{delete, observe, set, ReactiveArray, ReactiveObject, TrackedCell, Value};
pub use reactive::{Computed, Watcher, WatcherOptions};
pub use scope::{Scope, WatchOptions};
