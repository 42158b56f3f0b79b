//! Computed Implementation
//!
//! A Computed is a cached derived value backed by exactly one lazy watcher.
//!
//! # How Computed Values Work
//!
//! 1. Creating a computed value does not run it. Its watcher starts dirty.
//!
//! 2. On read, a dirty watcher re-evaluates and caches the result. A clean
//!    watcher returns the cache without touching the getter.
//!
//! 3. When any dependency notifies, the lazy watcher only flips its dirty
//!    flag. Nothing is recomputed until the next read.
//!
//! 4. If the read happens while another watcher is evaluating (e.g. a render
//!    watcher), that outer watcher is wired to every dependency of the
//!    computed value. The outer watcher then re-runs on any change that could
//!    alter the computed result, and re-reads it fresh.
//!
//! # Why This Matters
//!
//! Computed values that are never read stay dirty and cost nothing. Derived
//! state in a store is expected to be built from these, so that consumers
//! transparently depend on the underlying root state.

use std::fmt;

use super::context::ReactiveContext;
use super::watcher::{Source, Watcher, WatcherOptions};
use crate::error::{BoxError, Result};
use crate::observer::Value;
use crate::scope::Scope;

/// A cached derived value that recomputes only when read after a change.
#[derive(Clone)]
pub struct Computed {
    watcher: Watcher,
}

impl Computed {
    /// Create a computed value from a getter.
    ///
    /// The getter is not run until the first read.
    pub fn new<F>(scope: &Scope, getter: F) -> Self
    where
        F: Fn(&Scope) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self::from_source(scope, Source::getter(getter))
    }

    /// Create a named computed value; the name shows up in error reports.
    pub fn named<F>(scope: &Scope, name: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&Scope) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self::from_source(scope, Source::named(name, getter))
    }

    fn from_source(scope: &Scope, source: Source) -> Self {
        Self {
            watcher: Watcher::create(scope, source, None, WatcherOptions::default().lazy()),
        }
    }

    /// Get the current value, recomputing if a dependency changed.
    ///
    /// This is the main entry point for reading a computed value.
    pub fn get(&self) -> Result<Value> {
        if self.watcher.is_dirty() {
            self.watcher.evaluate()?;
        }

        // Propagate our dependencies to whoever is reading us.
        if ReactiveContext::is_active() {
            self.watcher.depend();
        }

        Ok(self.watcher.value())
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.watcher.is_dirty()
    }

    /// The backing lazy watcher.
    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }

    /// Stop tracking. The last cached value stays readable.
    pub fn dispose(&self) {
        self.watcher.teardown();
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.watcher.id())
            .field("dirty", &self.is_dirty())
            .field("dependency_count", &self.watcher.dependency_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::TrackedCell;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn computed_runs_on_first_access() {
        let scope = Scope::new("computed");
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let computed = Computed::new(&scope, move |_| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            Ok(Value::from(42))
        });

        // Not computed yet
        assert!(computed.is_dirty());
        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        assert_eq!(computed.get().unwrap(), Value::from(42));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(!computed.is_dirty());
    }

    #[test]
    fn computed_caches_until_a_dependency_changes() {
        let scope = Scope::new("computed");
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let base = TrackedCell::new(5);
        let base_clone = base.clone();
        let doubled = Computed::new(&scope, move |_| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            Ok(Value::from(base_clone.get() * 2))
        });

        assert_eq!(doubled.get().unwrap(), Value::from(10));
        assert_eq!(doubled.get().unwrap(), Value::from(10));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        // The change only marks it dirty.
        base.set(6);
        assert!(doubled.is_dirty());
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        assert_eq!(doubled.get().unwrap(), Value::from(12));
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn computed_depends_on_computed() {
        let scope = Scope::new("computed");
        let base = TrackedCell::new(5);

        let base_clone = base.clone();
        let doubled = Computed::new(&scope, move |_| Ok(Value::from(base_clone.get() * 2)));

        let doubled_clone = doubled.clone();
        let plus_ten = Computed::new(&scope, move |_| {
            let doubled = doubled_clone.get()?.as_f64().unwrap_or_default();
            Ok(Value::from(doubled + 10.0))
        });

        assert_eq!(plus_ten.get().unwrap(), Value::from(20));

        // The outer computed was wired to the base cell through the inner one.
        base.set(10);
        assert!(doubled.is_dirty());
        assert!(plus_ten.is_dirty());
        assert_eq!(plus_ten.get().unwrap(), Value::from(30));
    }

    #[test]
    fn disposed_computed_keeps_last_value() {
        let scope = Scope::new("computed");
        let base = TrackedCell::new(1);
        let base_clone = base.clone();
        let computed = Computed::new(&scope, move |_| Ok(Value::from(base_clone.get())));

        assert_eq!(computed.get().unwrap(), Value::from(1));
        computed.dispose();

        base.set(2);
        assert!(!computed.is_dirty());
        assert_eq!(computed.get().unwrap(), Value::from(1));
        assert_eq!(base.dep().subscriber_count(), 0);
    }
}
