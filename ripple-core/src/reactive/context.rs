//! Reactive Context
//!
//! The reactive context tracks which watcher is currently evaluating.
//! This enables automatic dependency tracking: when a tracked property is
//! read, its dependency node asks the context for the current watcher and
//! wires itself to it.
//!
//! # Implementation
//!
//! We use a thread-local stack. When a watcher starts evaluating we push it,
//! and the returned guard pops it again when dropped. Nesting happens
//! naturally, e.g. a computed value read while a render watcher evaluates:
//! the computed watcher sits on top while it recomputes, and the render
//! watcher becomes current again afterwards.
//!
//! An entry may also be empty. Pushing `None` suspends tracking for the
//! duration of the guard, which is how [`ReactiveContext::untracked`] works.

use std::cell::RefCell;

use super::{Watcher, WatcherId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<Watcher>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context when dropped.
///
/// This keeps the stack balanced even if the evaluation unwinds.
pub struct ReactiveContext {
    watcher_id: Option<WatcherId>,
}

impl ReactiveContext {
    /// Enter a new reactive context.
    ///
    /// While the guard is alive, reads of tracked state register `watcher`
    /// as a dependent. Passing `None` disables tracking instead.
    pub fn enter(watcher: Option<Watcher>) -> Self {
        let watcher_id = watcher.as_ref().map(Watcher::id);
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(watcher));
        Self { watcher_id }
    }

    /// Check whether a watcher is currently collecting dependencies.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    /// The watcher currently collecting dependencies, if any.
    pub fn current() -> Option<Watcher> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// ID of the current watcher, if any.
    pub fn current_id() -> Option<WatcherId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|w| w.as_ref().map(Watcher::id)))
    }

    /// Number of entries on the stack, including untracked ones.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }

    /// Run `f` without registering any dependencies.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        let _ctx = Self::enter(None);
        f()
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Contexts must be strictly nested.
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.as_ref().map(Watcher::id),
                    self.watcher_id,
                    "ReactiveContext mismatch"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::WatcherOptions;
    use crate::scope::Scope;

    fn lazy_watcher(scope: &Scope) -> Watcher {
        Watcher::without_callback(scope, "value", WatcherOptions::default().lazy()).unwrap()
    }

    #[test]
    fn context_tracks_watcher() {
        let scope = Scope::new("context");
        let watcher = lazy_watcher(&scope);

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current().is_none());

        {
            let _ctx = ReactiveContext::enter(Some(watcher.clone()));

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_id(), Some(watcher.id()));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_active());
        assert_eq!(ReactiveContext::depth(), 0);
    }

    #[test]
    fn nested_contexts() {
        let scope = Scope::new("context");
        let outer = lazy_watcher(&scope);
        let inner = lazy_watcher(&scope);

        {
            let _ctx1 = ReactiveContext::enter(Some(outer.clone()));
            assert_eq!(ReactiveContext::current_id(), Some(outer.id()));

            {
                let _ctx2 = ReactiveContext::enter(Some(inner.clone()));
                assert_eq!(ReactiveContext::current_id(), Some(inner.id()));
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_id(), Some(outer.id()));
        }

        assert!(ReactiveContext::current().is_none());
    }

    #[test]
    fn untracked_suspends_tracking() {
        let scope = Scope::new("context");
        let watcher = lazy_watcher(&scope);

        let _ctx = ReactiveContext::enter(Some(watcher));
        let inside = ReactiveContext::untracked(|| {
            assert_eq!(ReactiveContext::depth(), 2);
            ReactiveContext::is_active()
        });

        assert!(!inside);
        assert!(ReactiveContext::is_active());
    }
}
