//! Scopes
//!
//! A [`Scope`] owns a group of watchers and, optionally, the root data they
//! watch. Getters receive the scope they were created in, and dotted watch
//! paths resolve against its root data.
//!
//! The scope holds its watchers strongly; watchers hold their scope weakly.
//! Destroying a scope (or dropping its last handle) therefore releases every
//! watcher created in it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::config;
use crate::error::{BoxError, ReactiveError, Result};
use crate::observer::{observe, ReactiveObject, Value};
use crate::reactive::{Callback, Computed, Source, Watcher, WatcherId, WatcherOptions};

/// Options for [`Scope::watch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Fire on changes anywhere inside the watched value.
    pub deep: bool,
    /// Invoke the callback once right away with `(value, Null)`.
    pub immediate: bool,
    /// Run the callback inline on change instead of batching it.
    pub sync: bool,
}

impl WatchOptions {
    /// Set `deep`.
    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    /// Set `immediate`.
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    /// Set `sync`.
    pub fn sync(mut self) -> Self {
        self.sync = true;
        self
    }
}

/// Owner of watchers and root data.
///
/// Cloning yields another handle to the same scope.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    name: String,
    data: Option<ReactiveObject>,
    watchers: Mutex<Vec<Watcher>>,
    being_destroyed: AtomicBool,
    destroyed: AtomicBool,
}

/// Non-owning scope handle, as held by watchers.
#[derive(Clone)]
pub(crate) struct WeakScope(Weak<ScopeInner>);

impl WeakScope {
    pub(crate) fn upgrade(&self) -> Option<Scope> {
        self.0.upgrade().map(|inner| Scope { inner })
    }
}

impl Scope {
    /// Create a scope without root data.
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), None)
    }

    /// Create a scope owning `data`, which is observed as root data.
    pub fn with_data(name: impl Into<String>, data: ReactiveObject) -> Self {
        observe(&Value::Object(data.clone()), true);
        Self::build(name.into(), Some(data))
    }

    fn build(name: String, data: Option<ReactiveObject>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                name,
                data,
                watchers: Mutex::new(Vec::new()),
                being_destroyed: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    /// The scope's name, used in error reports.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The root data, if any.
    pub fn data(&self) -> Option<&ReactiveObject> {
        self.inner.data.as_ref()
    }

    /// Watch a path or getter and call `callback(new, old)` when it changes.
    ///
    /// The watcher is a user watcher: getter and callback failures are
    /// reported through the error hook, never returned.
    pub fn watch<F>(
        &self,
        source: impl Into<Source>,
        callback: F,
        options: WatchOptions,
    ) -> Result<Watcher>
    where
        F: Fn(&Value, &Value) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        let mut watcher_options = WatcherOptions::default().user();
        watcher_options.deep = options.deep;
        watcher_options.sync = options.sync;

        let callback: Callback = Arc::new(callback);
        let watcher = Watcher::build(self, source.into(), Some(callback.clone()), watcher_options)?;

        if options.immediate {
            if let Err(source) = callback(&watcher.value(), &Value::Null) {
                let err = ReactiveError::callback(watcher.expression(), source);
                let info = format!("callback for immediate watcher \"{}\"", watcher.expression());
                config::report(&err, Some(self), &info);
            }
        }

        Ok(watcher)
    }

    /// Create a computed value owned by this scope.
    pub fn computed<F>(&self, getter: F) -> Computed
    where
        F: Fn(&Scope) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        Computed::new(self, getter)
    }

    /// Tear down every watcher and release the root data.
    ///
    /// Idempotent.
    pub fn destroy(&self) {
        if self.inner.being_destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        let watchers = std::mem::take(&mut *self.inner.watchers.lock());
        for watcher in watchers.iter().rev() {
            watcher.teardown();
        }

        if let Some(observer) = self.inner.data.as_ref().and_then(ReactiveObject::observer) {
            observer.release_root();
        }

        self.inner.destroyed.store(true, Ordering::Release);
        debug!(scope = %self.name(), watchers = watchers.len(), "scope destroyed");
    }

    /// Whether [`destroy`](Self::destroy) has started.
    pub fn is_being_destroyed(&self) -> bool {
        self.inner.being_destroyed.load(Ordering::Acquire)
    }

    /// Whether [`destroy`](Self::destroy) has finished.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Number of live watchers registered in this scope.
    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.lock().len()
    }

    pub(crate) fn register(&self, watcher: Watcher) {
        self.inner.watchers.lock().push(watcher);
    }

    pub(crate) fn unregister(&self, id: WatcherId) {
        self.inner.watchers.lock().retain(|w| w.id() != id);
    }

    pub(crate) fn downgrade(&self) -> WeakScope {
        WeakScope(Arc::downgrade(&self.inner))
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.name())
            .field("has_data", &self.inner.data.is_some())
            .field("watcher_count", &self.watcher_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
