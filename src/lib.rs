//! Owned task groups and channel fan-in, built on structured concurrency.
//!
//! (this crate runs every task on its own OS thread; if you need thousands of concurrent tasks
//! rather than a handful, an `async` runtime is the better fit)
//!
//! # Overview
//!
//! This library features two coordination primitives, [`TaskGroup`] and [`fan_in`], and a small
//! counting task that exercises both.
//!
//! ## Task groups
//!
//! A [`TaskGroup`] owns a set of threads and a [`CompletionSignal`] they arrive on. The owner
//! blocks in [`TaskGroup::wait`] until every task has arrived. Arrivals are tied to a guard
//! ([`Arrival`]) that is registered before a thread starts and dropped when it ends, so each task
//! arrives exactly once, even when it panics.
//!
//! Like every thread handle in this crate, a [`TaskGroup`] joins its threads when dropped and
//! forwards their panics to the owner. No thread outlives the value that started it.
//!
//! ## Fan-in
//!
//! [`fan_in`] merges any number of [`Receiver`]s into one [`Merged`] stream. A relay thread waits
//! on all sources that are still open at once and forwards whichever value arrives first. Sources
//! that disconnect leave the set for good, and the merged stream ends exactly when the last source
//! disconnects. Values from one source keep their order; values from different sources interleave
//! in no particular order.
//!
//! # Usage
//!
//! Wait for a group of counters, each printing ten values, one per second:
//!
//! ```no_run
//! use confluence::{count, run_group, Schedule};
//!
//! run_group(2, |id| count(id, &Schedule::default(), |line| println!("{line}")))?;
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! Merge the output of two counters that send their values over channels instead:
//!
//! ```
//! use std::time::Duration;
//! use confluence::{fan_in, spawn_counter, Schedule};
//!
//! let schedule = Schedule::new(3, Duration::from_millis(1));
//! let (first, _counter1) = spawn_counter(1, schedule)?;
//! let (second, _counter2) = spawn_counter(2, schedule)?;
//!
//! let mut total = 0;
//! for line in fan_in([first, second])? {
//!     println!("{line}");
//!     total += 1;
//! }
//! assert_eq!(total, 6);
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! [`Receiver`]: crossbeam_channel::Receiver

mod background;
mod cancel;
mod demo;
mod drop;
mod emitter;
mod group;
mod merge;
mod signal;
#[cfg(test)]
mod test;

pub use background::{background, Background};
pub use cancel::{cancellation, CancelToken, Canceller};
pub use demo::{run_demo, DemoConfig, FAN_IN_HEADER, GROUP_HEADER};
pub use emitter::{
    count, count_until, label, spawn_counter, spawn_counter_with, Outcome, Progress, Schedule,
};
pub use group::{run_group, TaskGroup, TaskGroupBuilder};
pub use merge::{fan_in, FanInBuilder, Merged};
pub use signal::{Arrival, CompletionSignal, Stalled};
