//! Watcher Implementation
//!
//! A Watcher is a computation that records which dependency nodes it read
//! during its last evaluation and re-runs when any of them notifies.
//!
//! # How Watchers Work
//!
//! 1. `get()` pushes the watcher onto the reactive context and evaluates its
//!    getter. Every tracked read calls back into [`Watcher::add_dep`], which
//!    collects the nodes of this round.
//!
//! 2. After evaluation, nodes that were read last round but not this round
//!    are unsubscribed. This is what lets a watcher forget a branch that is
//!    no longer taken.
//!
//! 3. When a node notifies, `update()` decides what to do: lazy watchers only
//!    become dirty, sync watchers re-run immediately, all others are handed
//!    to the scheduler.
//!
//! 4. `run()` re-evaluates and invokes the callback with `(new, old)` when the
//!    value changed, the value is a container, or the watcher is deep.
//!
//! # Kinds
//!
//! - Render-style watchers have a getter with side effects and no callback.
//! - User watchers (`user: true`) report getter and callback failures
//!   through the error hook instead of propagating them.
//! - Lazy watchers back [`Computed`](super::Computed) values.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::context::ReactiveContext;
use super::dep::Dep;
use super::{DepId, WatcherId};
use crate::config;
use crate::error::{BoxError, ReactiveError, Result};
use crate::observer::{path, traverse, Value};
use crate::scheduler;
use crate::scope::{Scope, WeakScope};

/// Evaluation function of a watcher.
pub type Getter = Arc<dyn Fn(&Scope) -> std::result::Result<Value, BoxError> + Send + Sync>;

/// Change callback of a watcher, invoked with `(new, old)`.
pub type Callback = Arc<dyn Fn(&Value, &Value) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Hook run by the scheduler right before a queued watcher runs.
pub type Hook = Arc<dyn Fn() + Send + Sync>;

/// What a watcher evaluates.
#[derive(Clone)]
pub enum Source {
    /// A closure evaluated against the owning scope.
    Getter {
        /// Label used in error reports.
        expression: String,
        /// The evaluation function.
        getter: Getter,
    },

    /// A dot-delimited path resolved against the scope's root data.
    Path(String),
}

impl Source {
    /// Wrap a getter closure.
    pub fn getter<F>(getter: F) -> Self
    where
        F: Fn(&Scope) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self::named("<getter>", getter)
    }

    /// Wrap a getter closure with a label for error reports.
    pub fn named<F>(expression: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&Scope) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self::Getter {
            expression: expression.into(),
            getter: Arc::new(getter),
        }
    }
}

impl From<&str> for Source {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

impl From<String> for Source {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

/// Watcher behaviour flags.
#[derive(Clone, Default)]
pub struct WatcherOptions {
    /// Subscribe to every nested value of the result.
    pub deep: bool,
    /// Report errors through the hook instead of propagating them.
    pub user: bool,
    /// Defer evaluation until read; notifications only mark it dirty.
    pub lazy: bool,
    /// Re-run inline on notification, bypassing the scheduler.
    pub sync: bool,
    /// Called by the scheduler before each queued run.
    pub before: Option<Hook>,
}

impl WatcherOptions {
    /// Set `deep`.
    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    /// Set `user`.
    pub fn user(mut self) -> Self {
        self.user = true;
        self
    }

    /// Set `lazy`.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Set `sync`.
    pub fn sync(mut self) -> Self {
        self.sync = true;
        self
    }

    /// Install a pre-run hook.
    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.before = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for WatcherOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherOptions")
            .field("deep", &self.deep)
            .field("user", &self.user)
            .field("lazy", &self.lazy)
            .field("sync", &self.sync)
            .field("before", &self.before.is_some())
            .finish()
    }
}

/// A computation that re-runs when the state it read changes.
///
/// Cloning a `Watcher` yields another handle to the same watcher.
#[derive(Clone)]
pub struct Watcher {
    inner: Arc<WatcherInner>,
}

struct WatcherInner {
    id: WatcherId,
    expression: String,
    getter: Getter,
    callback: Option<Callback>,
    options: WatcherOptions,
    scope: WeakScope,
    state: Mutex<WatcherState>,
}

struct WatcherState {
    value: Value,
    dirty: bool,
    active: bool,

    /// Nodes read during the last completed evaluation.
    deps: SmallVec<[Dep; 4]>,
    dep_ids: HashSet<DepId>,

    /// Nodes read during the evaluation in progress.
    new_deps: SmallVec<[Dep; 4]>,
    new_dep_ids: HashSet<DepId>,
}

/// Non-owning watcher handle, as stored by dependency nodes.
#[derive(Clone)]
pub(crate) struct WeakWatcher(Weak<WatcherInner>);

impl WeakWatcher {
    pub(crate) fn upgrade(&self) -> Option<Watcher> {
        self.0.upgrade().map(|inner| Watcher { inner })
    }
}

impl Watcher {
    /// Create a watcher with a change callback.
    ///
    /// Unless `lazy` is set the watcher evaluates immediately to collect its
    /// initial dependencies; a failing getter on a non-`user` watcher is
    /// returned as [`ReactiveError::Evaluation`].
    pub fn new<F>(
        scope: &Scope,
        source: impl Into<Source>,
        callback: F,
        options: WatcherOptions,
    ) -> Result<Self>
    where
        F: Fn(&Value, &Value) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::build(scope, source.into(), Some(Arc::new(callback)), options)
    }

    /// Create a watcher without a callback, e.g. a render function.
    pub fn without_callback(
        scope: &Scope,
        source: impl Into<Source>,
        options: WatcherOptions,
    ) -> Result<Self> {
        Self::build(scope, source.into(), None, options)
    }

    pub(crate) fn build(
        scope: &Scope,
        source: Source,
        callback: Option<Callback>,
        options: WatcherOptions,
    ) -> Result<Self> {
        let watcher = Self::create(scope, source, callback, options);
        if !watcher.inner.options.lazy {
            let value = match watcher.get() {
                Ok(value) => value,
                Err(err) => {
                    watcher.teardown();
                    return Err(err);
                }
            };
            watcher.inner.state.lock().value = value;
        }
        Ok(watcher)
    }

    /// Allocate and register a watcher without evaluating it.
    pub(crate) fn create(
        scope: &Scope,
        source: Source,
        callback: Option<Callback>,
        options: WatcherOptions,
    ) -> Self {
        let (expression, getter) = match source {
            Source::Getter { expression, getter } => (expression, getter),
            Source::Path(expression) => {
                let getter = match path::parse_path(&expression) {
                    Some(segments) => path::getter(segments),
                    None => {
                        config::report(
                            &ReactiveError::InvalidPath(expression.clone()),
                            Some(scope),
                            "watch",
                        );
                        path::noop()
                    }
                };
                (expression, getter)
            }
        };

        let watcher = Self {
            inner: Arc::new(WatcherInner {
                id: WatcherId::new(),
                expression,
                getter,
                callback,
                scope: scope.downgrade(),
                state: Mutex::new(WatcherState {
                    value: Value::Null,
                    dirty: options.lazy,
                    active: true,
                    deps: SmallVec::new(),
                    dep_ids: HashSet::new(),
                    new_deps: SmallVec::new(),
                    new_dep_ids: HashSet::new(),
                }),
                options,
            }),
        };

        scope.register(watcher.clone());
        trace!(watcher_id = %watcher.id(), expression = %watcher.expression(), "watcher created");
        watcher
    }

    /// Get the watcher's unique ID.
    pub fn id(&self) -> WatcherId {
        self.inner.id
    }

    /// The watched path, or the getter's label.
    pub fn expression(&self) -> &str {
        &self.inner.expression
    }

    /// The owning scope, if it is still alive.
    pub fn scope(&self) -> Option<Scope> {
        self.inner.scope.upgrade()
    }

    /// The value produced by the last evaluation.
    pub fn value(&self) -> Value {
        self.inner.state.lock().value.clone()
    }

    /// Whether a lazy watcher must recompute before its value is read.
    pub fn is_dirty(&self) -> bool {
        self.inner.state.lock().dirty
    }

    /// `false` once torn down.
    pub fn is_active(&self) -> bool {
        self.inner.state.lock().active
    }

    /// The options this watcher was created with.
    pub fn options(&self) -> &WatcherOptions {
        &self.inner.options
    }

    /// IDs of the nodes read during the last completed evaluation.
    pub fn dependency_ids(&self) -> Vec<DepId> {
        self.inner.state.lock().deps.iter().map(Dep::id).collect()
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner.state.lock().deps.len()
    }

    pub(crate) fn downgrade(&self) -> WeakWatcher {
        WeakWatcher(Arc::downgrade(&self.inner))
    }

    /// Evaluate the getter and re-collect dependencies.
    ///
    /// A failing getter propagates as [`ReactiveError::Evaluation`] unless the
    /// watcher is `user`, in which case the error is reported and the previous
    /// value is returned.
    pub fn get(&self) -> Result<Value> {
        Ok(match self.collect()? {
            Some(value) => value,
            None => self.value(),
        })
    }

    /// Evaluation shared by `get` and `run`. `Ok(None)` means the getter
    /// failed and the failure has already been reported.
    fn collect(&self) -> Result<Option<Value>> {
        let Some(scope) = self.scope() else {
            // The owner is gone; nothing left to evaluate against.
            self.teardown();
            return Ok(None);
        };

        let outcome = {
            let _ctx = ReactiveContext::enter(Some(self.clone()));

            let outcome = match (self.inner.getter)(&scope) {
                Ok(value) => Ok(Some(value)),
                Err(source) => {
                    let err = ReactiveError::evaluation(self.expression(), source);
                    if self.inner.options.user {
                        let info = format!("getter for watcher \"{}\"", self.expression());
                        config::report(&err, Some(&scope), &info);
                        Ok(None)
                    } else {
                        Err(err)
                    }
                }
            };

            // Touch every nested value so all of it is tracked.
            if self.inner.options.deep {
                if let Ok(Some(value)) = &outcome {
                    traverse::traverse(value);
                }
            }

            outcome
        };

        self.cleanup_deps();
        outcome
    }

    /// Record that the current evaluation read `dep`.
    ///
    /// Subscribes to the node only if it was not already a dependency in the
    /// previous round.
    pub fn add_dep(&self, dep: &Dep) {
        let id = dep.id();
        let subscribe = {
            let mut state = self.inner.state.lock();
            if !state.active || !state.new_dep_ids.insert(id) {
                return;
            }
            state.new_deps.push(dep.clone());
            !state.dep_ids.contains(&id)
        };

        if subscribe {
            trace!(watcher_id = %self.id(), dep_id = %id, "subscribed");
            dep.add_sub(self);
        }
    }

    /// Drop subscriptions that were not renewed by the last evaluation, then
    /// make this round's dependencies current.
    fn cleanup_deps(&self) {
        let stale: SmallVec<[Dep; 4]> = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;

            let stale = state
                .deps
                .iter()
                .filter(|dep| !state.new_dep_ids.contains(&dep.id()))
                .cloned()
                .collect();

            std::mem::swap(&mut state.dep_ids, &mut state.new_dep_ids);
            state.new_dep_ids.clear();
            std::mem::swap(&mut state.deps, &mut state.new_deps);
            state.new_deps.clear();

            stale
        };

        for dep in stale {
            trace!(watcher_id = %self.id(), dep_id = %dep.id(), "unsubscribed");
            dep.remove_sub(self.id());
        }
    }

    /// Called when a dependency changes.
    pub fn update(&self) {
        {
            let mut state = self.inner.state.lock();
            if !state.active {
                return;
            }
            if self.inner.options.lazy {
                state.dirty = true;
                return;
            }
        }

        if self.inner.options.sync {
            // An inline run has no caller to hand a failure back to.
            if let Err(err) = self.run() {
                config::report(&err, self.scope().as_ref(), "sync watcher run");
            }
        } else {
            scheduler::queue_watcher(self.clone());
        }
    }

    /// Re-evaluate and invoke the callback if the value changed.
    ///
    /// Containers and deep watchers always fire, since their contents may
    /// have been mutated in place. Callback failures are always reported,
    /// never propagated.
    pub fn run(&self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }

        let Some(value) = self.collect()? else {
            return Ok(());
        };

        let old = {
            let mut state = self.inner.state.lock();
            let changed = !value.is_identical(&state.value)
                || value.is_container()
                || self.inner.options.deep;
            if !changed {
                return Ok(());
            }
            std::mem::replace(&mut state.value, value.clone())
        };

        if let Some(callback) = &self.inner.callback {
            if let Err(source) = callback(&value, &old) {
                let err = ReactiveError::callback(self.expression(), source);
                let info = format!("callback for watcher \"{}\"", self.expression());
                config::report(&err, self.scope().as_ref(), &info);
            }
        }

        Ok(())
    }

    /// Recompute a lazy watcher's value and clear its dirty flag.
    pub fn evaluate(&self) -> Result<()> {
        let value = self.get()?;
        let mut state = self.inner.state.lock();
        state.value = value;
        state.dirty = false;
        Ok(())
    }

    /// Make the current watcher depend on everything this watcher depends on.
    pub fn depend(&self) {
        let deps = self.inner.state.lock().deps.clone();
        for dep in deps.iter().rev() {
            dep.depend();
        }
    }

    /// Unsubscribe from every dependency and deactivate.
    ///
    /// Idempotent. After teardown, `update` and `run` do nothing.
    pub fn teardown(&self) {
        let deps = {
            let mut state = self.inner.state.lock();
            if !state.active {
                return;
            }
            state.active = false;
            state.deps.clone()
        };

        if let Some(scope) = self.scope() {
            // Scope destruction drops its whole registry at once.
            if !scope.is_being_destroyed() {
                scope.unregister(self.id());
            }
        }

        for dep in deps.iter().rev() {
            dep.remove_sub(self.id());
        }

        debug!(watcher_id = %self.id(), expression = %self.expression(), "watcher torn down");
    }

    pub(crate) fn run_before_hook(&self) {
        if let Some(before) = &self.inner.options.before {
            before();
        }
    }
}

impl Drop for WatcherInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for dep in state.deps.drain(..) {
            dep.remove_sub(self.id);
        }
    }
}

impl PartialEq for Watcher {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Watcher {}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id())
            .field("expression", &self.expression())
            .field("options", self.options())
            .field("active", &self.is_active())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{ReactiveObject, TrackedCell};
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counter() -> (Arc<AtomicI32>, Arc<AtomicI32>) {
        let count = Arc::new(AtomicI32::new(0));
        (count.clone(), count)
    }

    #[test]
    fn watcher_evaluates_on_creation() {
        let scope = Scope::new("watcher");
        let (runs, runs_clone) = counter();

        let watcher = Watcher::without_callback(
            &scope,
            Source::getter(move |_| {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                Ok(Value::from(7))
            }),
            WatcherOptions::default(),
        )
        .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(watcher.value(), Value::from(7));
        assert_eq!(scope.watcher_count(), 1);
    }

    #[test]
    fn lazy_watcher_does_not_evaluate_on_creation() {
        let scope = Scope::new("watcher");
        let (runs, runs_clone) = counter();

        let watcher = Watcher::without_callback(
            &scope,
            Source::getter(move |_| {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            }),
            WatcherOptions::default().lazy(),
        )
        .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(watcher.is_dirty());

        watcher.evaluate().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!watcher.is_dirty());
    }

    #[test]
    fn dependencies_follow_the_branch_taken() {
        let scope = Scope::new("watcher");
        let flag = TrackedCell::new(true);
        let a = TrackedCell::new(1);
        let b = TrackedCell::new(2);

        let (flag_c, a_c, b_c) = (flag.clone(), a.clone(), b.clone());
        let watcher = Watcher::without_callback(
            &scope,
            Source::getter(move |_| {
                let v = if flag_c.get() { a_c.get() } else { b_c.get() };
                Ok(Value::from(v))
            }),
            WatcherOptions::default().sync(),
        )
        .unwrap();

        let mut expected = vec![flag.dep().id(), a.dep().id()];
        let mut actual = watcher.dependency_ids();
        expected.sort();
        actual.sort();
        assert_eq!(actual, expected);
        assert!(a.dep().has_sub(watcher.id()));
        assert!(!b.dep().has_sub(watcher.id()));

        flag.set(false);

        assert!(!a.dep().has_sub(watcher.id()));
        assert!(b.dep().has_sub(watcher.id()));
        assert_eq!(watcher.value(), Value::from(2));
    }

    #[test]
    fn non_user_getter_error_propagates() {
        let scope = Scope::new("watcher");
        let result = Watcher::without_callback(
            &scope,
            Source::named("explode", |_| Err("boom".into())),
            WatcherOptions::default(),
        );

        match result {
            Err(ReactiveError::Evaluation { expression, .. }) => assert_eq!(expression, "explode"),
            other => panic!("expected evaluation error, got {:?}", other.map(|w| w.id())),
        }
    }

    #[test]
    fn user_getter_error_is_reported_and_value_kept() {
        let scope = Scope::new("watcher");
        let (reports, reports_clone) = counter();
        config::set_error_handler(move |err, _, info| {
            assert!(matches!(err, ReactiveError::Evaluation { .. }));
            assert!(info.starts_with("getter for watcher"));
            reports_clone.fetch_add(1, Ordering::SeqCst);
        });

        let fail = TrackedCell::new(false);
        let fail_c = fail.clone();
        let (fired, fired_c) = counter();
        let watcher = Watcher::new(
            &scope,
            Source::getter(move |_| {
                if fail_c.get() {
                    Err("nope".into())
                } else {
                    Ok(Value::from(1))
                }
            }),
            move |_, _| {
                fired_c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            WatcherOptions::default().user().sync(),
        )
        .unwrap();

        fail.set(true);

        assert_eq!(reports.load(Ordering::SeqCst), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(watcher.value(), Value::from(1));
        config::clear_error_handler();
    }

    #[test]
    fn callback_errors_are_reported_not_propagated() {
        let scope = Scope::new("watcher");
        let (reports, reports_clone) = counter();
        config::set_error_handler(move |err, scope, _| {
            assert!(matches!(err, ReactiveError::Callback { .. }));
            assert_eq!(scope.map(|s| s.name().to_string()), Some("watcher".into()));
            reports_clone.fetch_add(1, Ordering::SeqCst);
        });

        let cell = TrackedCell::new(1);
        let cell_c = cell.clone();
        let watcher = Watcher::new(
            &scope,
            Source::getter(move |_| Ok(Value::from(cell_c.get()))),
            |_, _| Err("callback failed".into()),
            WatcherOptions::default(),
        )
        .unwrap();

        cell.set(2);
        assert!(watcher.run().is_ok());
        assert_eq!(reports.load(Ordering::SeqCst), 1);
        config::clear_error_handler();
    }

    #[test]
    fn containers_fire_even_when_identical() {
        let scope = Scope::new("watcher");
        let obj = ReactiveObject::new();
        let obj_value = Value::Object(obj);
        let (fired, fired_c) = counter();

        let value = obj_value.clone();
        let watcher = Watcher::new(
            &scope,
            Source::getter(move |_| Ok(value.clone())),
            move |new, old| {
                assert!(new.is_identical(old));
                fired_c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            WatcherOptions::default(),
        )
        .unwrap();

        watcher.run().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn teardown_is_final_and_idempotent() {
        let scope = Scope::new("watcher");
        let cell = TrackedCell::new(0);
        let cell_c = cell.clone();
        let (runs, runs_c) = counter();

        let watcher = Watcher::without_callback(
            &scope,
            Source::getter(move |_| {
                runs_c.fetch_add(1, Ordering::SeqCst);
                Ok(Value::from(cell_c.get()))
            }),
            WatcherOptions::default().sync(),
        )
        .unwrap();

        assert_eq!(cell.dep().subscriber_count(), 1);
        watcher.teardown();
        watcher.teardown();

        assert!(!watcher.is_active());
        assert_eq!(cell.dep().subscriber_count(), 0);
        assert_eq!(scope.watcher_count(), 0);

        cell.set(1);
        watcher.update();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_last_handle_unsubscribes() {
        let cell = TrackedCell::new(0);
        {
            let scope = Scope::new("watcher");
            let cell_c = cell.clone();
            let _watcher = Watcher::without_callback(
                &scope,
                Source::getter(move |_| Ok(Value::from(cell_c.get()))),
                WatcherOptions::default(),
            )
            .unwrap();
            assert_eq!(cell.dep().subscriber_count(), 1);
        }
        // Dropping the scope released the last strong reference.
        assert_eq!(cell.dep().subscriber_count(), 0);
    }
}
