//! Next-Tick Primitive
//!
//! Defers callbacks until the current synchronous work has finished.
//! Callbacks registered before the pending tick fires share that tick and
//! run in registration order.
//!
//! When the tick fires is decided by a [`TickDriver`]. The default
//! [`ManualDriver`] never fires on its own: the host pumps it with
//! [`drain_ticks`], which makes flushing fully deterministic. The
//! [`TokioDriver`] spawns the tick as a local task and must be used from
//! inside a `tokio::task::LocalSet`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::trace;

type TickCallback = Box<dyn FnOnce()>;

/// Decides when a requested tick runs.
pub trait TickDriver {
    /// Arrange for `run` to be called once the current synchronous work is
    /// done.
    fn request(&self, run: fn());
}

/// Runs ticks only when [`drain_ticks`] is called.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualDriver;

impl TickDriver for ManualDriver {
    fn request(&self, _run: fn()) {}
}

/// Runs ticks as tasks on the current `LocalSet`.
///
/// # Panics
///
/// Requesting a tick outside a `LocalSet` panics, as `spawn_local` does.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDriver;

impl TickDriver for TokioDriver {
    fn request(&self, run: fn()) {
        tokio::task::spawn_local(async move { run() });
    }
}

thread_local! {
    static CALLBACKS: RefCell<Vec<TickCallback>> = const { RefCell::new(Vec::new()) };
    static PENDING: Cell<bool> = const { Cell::new(false) };
    static DRIVER: RefCell<Rc<dyn TickDriver>> = RefCell::new(Rc::new(ManualDriver) as Rc<dyn TickDriver>);
}

/// Install the tick driver for the current thread.
pub fn set_driver(driver: impl TickDriver + 'static) {
    DRIVER.with(|d| *d.borrow_mut() = Rc::new(driver));
}

/// Run `callback` on the next tick.
pub fn next_tick(callback: impl FnOnce() + 'static) {
    CALLBACKS.with(|c| c.borrow_mut().push(Box::new(callback)));

    if !PENDING.with(|p| p.replace(true)) {
        let driver = DRIVER.with(|d| d.borrow().clone());
        trace!("tick requested");
        driver.request(run_tick);
    }
}

fn run_tick() {
    run_callbacks();
}

/// Run one batch of callbacks. Callbacks registered while it runs belong to
/// the next tick.
fn run_callbacks() -> usize {
    PENDING.with(|p| p.set(false));
    let callbacks = CALLBACKS.with(|c| std::mem::take(&mut *c.borrow_mut()));
    let count = callbacks.len();
    for callback in callbacks {
        callback();
    }
    count
}

/// Run pending ticks until none are left. Returns how many callbacks ran.
pub fn drain_ticks() -> usize {
    let mut total = 0;
    while CALLBACKS.with(|c| !c.borrow().is_empty()) {
        total += run_callbacks();
    }
    total
}

/// Wait for the next tick.
///
/// Resolves once every callback registered before this call has run. With
/// the [`ManualDriver`] this only happens when someone calls
/// [`drain_ticks`].
pub async fn tick() {
    let (tx, rx) = tokio::sync::oneshot::channel();
    next_tick(move || {
        let _ = tx.send(());
    });
    let _ = rx.await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callbacks_share_one_tick() {
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            next_tick(move || log.borrow_mut().push(i));
        }
        assert!(log.borrow().is_empty());

        assert_eq!(drain_ticks(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert_eq!(drain_ticks(), 0);
    }

    #[test]
    fn callbacks_registered_during_a_tick_run_later() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let outer = log.clone();
        next_tick(move || {
            outer.borrow_mut().push("outer");
            let inner = outer.clone();
            next_tick(move || inner.borrow_mut().push("inner"));
        });

        assert_eq!(run_callbacks(), 1);
        assert_eq!(*log.borrow(), vec!["outer"]);
        assert_eq!(drain_ticks(), 1);
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn tokio_driver_fires_on_its_own() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                set_driver(TokioDriver);
                let hit = Rc::new(Cell::new(false));
                let hit_c = hit.clone();
                next_tick(move || hit_c.set(true));

                tick().await;
                assert!(hit.get());
                set_driver(ManualDriver);
            })
            .await;
    }
}
