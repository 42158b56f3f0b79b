//! Watcher Queue
//!
//! Collects watchers invalidated during one tick of synchronous mutation and
//! runs them in a single pass.
//!
//! # Algorithm
//!
//! 1. `queue_watcher` ignores a watcher that is already pending, so any
//!    number of notifications in the same tick produce one run.
//! 2. The queue is kept sorted by watcher ID. IDs are allocated at creation,
//!    so parents run before children and user watchers before the render
//!    watchers created after them.
//! 3. The first enqueue of a batch requests a flush through the next-tick
//!    primitive (or flushes immediately when `async_flush` is off).
//! 4. Watchers queued while flushing are inserted after the current scan
//!    position, in ID order, and run in the same pass.
//! 5. A watcher that is re-queued after it already ran in this flush, by
//!    itself or through a cycle with other watchers, is aborted once it
//!    exceeds `max_update_count` such re-queues.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use super::tick::next_tick;
use crate::config;
use crate::error::ReactiveError;
use crate::reactive::{Watcher, WatcherId};

/// Outcome of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Number of watcher runs performed.
    pub ran: usize,
    /// Watchers aborted as infinite update loops.
    pub aborted: Vec<WatcherId>,
}

#[derive(Default)]
struct SchedulerState {
    queue: Vec<Watcher>,

    /// Watchers queued but not yet started.
    has: HashSet<WatcherId>,

    /// Watchers that have started at least once in the flush in progress.
    started: HashSet<WatcherId>,

    /// Re-queue counts for the flush in progress.
    circular: HashMap<WatcherId, usize>,

    /// Watchers aborted during the flush in progress.
    blocked: HashSet<WatcherId>,
    aborted: Vec<WatcherId>,

    /// A flush has been requested and not yet finished.
    waiting: bool,
    flushing: bool,
    index: usize,
    limit: usize,
}

impl SchedulerState {
    fn reset(&mut self) {
        self.queue.clear();
        self.has.clear();
        self.started.clear();
        self.circular.clear();
        self.blocked.clear();
        self.aborted.clear();
        self.waiting = false;
        self.flushing = false;
        self.index = 0;
    }
}

thread_local! {
    static STATE: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
}

enum Enqueue {
    Skipped,
    Queued,
    RequestFlush,
    Aborted(usize),
}

/// Queue a watcher for the next flush.
///
/// Duplicates are dropped, as are watchers aborted earlier in the current
/// flush. Re-queueing a watcher that already ran in the current flush counts
/// towards `max_update_count`, whichever watcher caused it, so both a
/// self-triggering watcher and a cycle between watchers are cut off.
pub fn queue_watcher(watcher: Watcher) {
    let id = watcher.id();
    let outcome = STATE.with(|state| {
        let mut guard = state.borrow_mut();
        let state = &mut *guard;
        if state.blocked.contains(&id) || state.has.contains(&id) {
            return Enqueue::Skipped;
        }

        if state.flushing && state.started.contains(&id) {
            let count = state.circular.entry(id).or_insert(0);
            *count += 1;
            if *count > state.limit {
                state.blocked.insert(id);
                state.aborted.push(id);
                return Enqueue::Aborted(state.limit);
            }
        }

        state.has.insert(id);

        // Never insert at or before the watcher currently running.
        let floor = if state.flushing { state.index + 1 } else { 0 };
        let mut pos = state.queue.len();
        while pos > floor && state.queue[pos - 1].id() > id {
            pos -= 1;
        }
        state.queue.insert(pos, watcher.clone());
        trace!(watcher_id = %id, position = pos, "watcher queued");

        if std::mem::replace(&mut state.waiting, true) {
            Enqueue::Queued
        } else {
            Enqueue::RequestFlush
        }
    });

    match outcome {
        Enqueue::Skipped | Enqueue::Queued => {}
        Enqueue::Aborted(limit) => {
            let err = ReactiveError::InfiniteUpdateLoop {
                watcher: id,
                expression: watcher.expression().to_string(),
                limit,
            };
            config::report(&err, watcher.scope().as_ref(), "scheduler flush");
        }
        Enqueue::RequestFlush if config::async_flush() => next_tick(|| {
            flush();
        }),
        Enqueue::RequestFlush => {
            flush();
        }
    }
}

/// Clears the scheduler state when a flush ends, including by unwinding.
struct FlushReset;

impl Drop for FlushReset {
    fn drop(&mut self) {
        STATE.with(|state| state.borrow_mut().reset());
    }
}

/// Run every queued watcher in ascending ID order.
///
/// Re-entrant calls (from inside a watcher run) return immediately with
/// empty stats; the flush in progress picks up anything they would have run.
pub fn flush() -> FlushStats {
    let limit = config::max_update_count();
    let started = STATE.with(|state| {
        let mut state = state.borrow_mut();
        if state.flushing {
            return false;
        }
        state.flushing = true;
        state.index = 0;
        state.limit = limit;
        true
    });
    if !started {
        return FlushStats::default();
    }

    let _reset = FlushReset;
    let mut stats = FlushStats::default();

    loop {
        let next = STATE.with(|state| {
            let state = state.borrow();
            state.queue.get(state.index).cloned()
        });
        let Some(watcher) = next else {
            break;
        };
        let id = watcher.id();

        if watcher.is_active() {
            watcher.run_before_hook();
            STATE.with(|state| {
                let mut state = state.borrow_mut();
                state.has.remove(&id);
                state.started.insert(id);
            });

            if let Err(err) = watcher.run() {
                config::report(&err, watcher.scope().as_ref(), "scheduler flush");
            }
            stats.ran += 1;
        } else {
            STATE.with(|state| state.borrow_mut().has.remove(&id));
        }

        STATE.with(|state| state.borrow_mut().index += 1);
    }

    stats.aborted = STATE.with(|state| std::mem::take(&mut state.borrow_mut().aborted));
    debug!(ran = stats.ran, aborted = stats.aborted.len(), "flush complete");
    stats
}

/// Number of watchers queued and not yet started.
pub fn pending() -> usize {
    STATE.with(|state| state.borrow().has.len())
}

/// Whether a flush is running on this thread.
pub fn is_flushing() -> bool {
    STATE.with(|state| state.borrow().flushing)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
