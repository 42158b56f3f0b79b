//! Runtime Configuration
//!
//! Configuration is per-thread: the tracking context, the scheduler queue and
//! the next-tick queue are all thread-local, so the knobs that steer them live
//! next to them. This also keeps independent threads (and parallel tests)
//! from observing each other's settings.
//!
//! The error reporting hook lives here as well. The runtime never formats
//! user-facing errors itself; it hands them to the installed handler together
//! with the owning scope and a short description of where the error came
//! from. Without a handler, errors are emitted as `tracing` events.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Deserialize;

use crate::error::ReactiveError;
use crate::scope::Scope;

/// Default re-queue limit for a single watcher within one flush.
pub const MAX_UPDATE_COUNT: usize = 100;

/// Tunable runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReactiveConfig {
    /// Defer watcher runs to the next tick. When `false`, the scheduler flushes
    /// synchronously at the first enqueue and notifications are delivered in
    /// ascending watcher order.
    pub async_flush: bool,

    /// How many times a watcher may be re-queued during one flush before it
    /// is reported as an infinite update loop.
    pub max_update_count: usize,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            async_flush: true,
            max_update_count: MAX_UPDATE_COUNT,
        }
    }
}

impl ReactiveConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Signature of the error reporting hook.
pub type ErrorHandler = Rc<dyn Fn(&ReactiveError, Option<&Scope>, &str)>;

thread_local! {
    static CONFIG: RefCell<ReactiveConfig> = RefCell::new(ReactiveConfig::default());
    static ERROR_HANDLER: RefCell<Option<ErrorHandler>> = const { RefCell::new(None) };
}

/// Replace the current thread's configuration.
pub fn configure(config: ReactiveConfig) {
    CONFIG.with(|c| *c.borrow_mut() = config);
}

/// Snapshot of the current thread's configuration.
pub fn current() -> ReactiveConfig {
    CONFIG.with(|c| c.borrow().clone())
}

pub(crate) fn async_flush() -> bool {
    CONFIG.with(|c| c.borrow().async_flush)
}

pub(crate) fn max_update_count() -> usize {
    CONFIG.with(|c| c.borrow().max_update_count)
}

/// Run `f` with `config` installed, restoring the previous configuration
/// afterwards (also on panic).
pub fn with_config<R>(config: ReactiveConfig, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<ReactiveConfig>);

    impl Drop for Restore {
        fn drop(&mut self) {
            if let Some(previous) = self.0.take() {
                configure(previous);
            }
        }
    }

    let previous = CONFIG.with(|c| std::mem::replace(&mut *c.borrow_mut(), config));
    let _restore = Restore(Some(previous));
    f()
}

/// Install the error reporting hook for the current thread.
pub fn set_error_handler<F>(handler: F)
where
    F: Fn(&ReactiveError, Option<&Scope>, &str) + 'static,
{
    ERROR_HANDLER.with(|h| *h.borrow_mut() = Some(Rc::new(handler)));
}

/// Remove the error reporting hook, falling back to `tracing` output.
pub fn clear_error_handler() {
    ERROR_HANDLER.with(|h| h.borrow_mut().take());
}

/// Hand an error to the reporting hook.
///
/// `info` describes where the error surfaced, e.g.
/// `callback for watcher "a.b"`.
pub fn report(error: &ReactiveError, scope: Option<&Scope>, info: &str) {
    let handler = ERROR_HANDLER.with(|h| h.borrow().clone());
    match handler {
        Some(handler) => handler(error, scope, info),
        None => tracing::error!(
            error = %error,
            scope = scope.map(|s| s.name()),
            info,
            "unhandled reactive error"
        ),
    }
}
