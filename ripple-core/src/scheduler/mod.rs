//! Update Scheduler
//!
//! Watchers invalidated by a mutation are not re-run on the spot. They are
//! queued, deduplicated and run together once the synchronous work that
//! caused them has finished. Writing ten properties a watcher depends on
//! therefore costs one run, not ten.
//!
//! The scheduler has two parts:
//!
//! - the watcher queue ([`queue_watcher`], [`flush`]), which orders and runs
//!   invalidated watchers, and
//! - the next-tick primitive ([`next_tick`]), which decides when a flush
//!   happens, through a pluggable [`TickDriver`].
//!
//! With `async_flush` disabled in [`ReactiveConfig`](crate::config::ReactiveConfig)
//! the first enqueue flushes synchronously instead.

mod queue;
mod tick;

pub use queue::{flush, is_flushing, pending, queue_watcher, FlushStats};
pub use tick::{drain_ticks, next_tick, set_driver, tick, ManualDriver, TickDriver, TokioDriver};
