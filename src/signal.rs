//! Completion signalling.
//!
//! A [`CompletionSignal`] is a counter of outstanding tasks paired with a condition variable. The
//! owner of a batch of tasks waits until the counter drops to zero; every task arrives exactly once
//! when it finishes. Handles are cheap to clone and all share the same counter.
//!
//! There are two ways to get the count wrong, and neither is recoverable:
//!
//! - Arriving more often than tasks were registered. This panics in [`CompletionSignal::arrive`].
//! - Arriving less often than tasks were registered. [`CompletionSignal::wait`] then blocks
//!   forever. [`CompletionSignal::wait_timeout`] exists so that tests can detect this.
//!
//! [`CompletionSignal::register`] hands out [`Arrival`] guards that make both mistakes impossible
//! for well-behaved owners: registering and arriving are tied to the creation and destruction of
//! one value.

use std::{
    error::Error,
    fmt,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

struct Shared {
    remaining: Mutex<usize>,
    condvar: Condvar,
}

impl Shared {
    /// Locks the counter, ignoring poisoning.
    ///
    /// The counter is a plain integer that is never left half-updated, and a task that panics
    /// still has to be able to arrive on its way out.
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.remaining.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A counter of outstanding tasks that the owner can block on.
#[derive(Clone)]
pub struct CompletionSignal {
    shared: Arc<Shared>,
}

impl CompletionSignal {
    /// Creates a signal that expects `count` arrivals.
    pub fn new(count: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                remaining: Mutex::new(count),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Raises the number of expected arrivals by `n`.
    pub fn add(&self, n: usize) {
        let mut remaining = self.shared.lock();
        *remaining = remaining
            .checked_add(n)
            .unwrap_or_else(|| panic!("completion counter overflowed"));
    }

    /// Expects one more arrival, and returns a guard that performs it when dropped.
    pub fn register(&self) -> Arrival {
        self.add(1);
        Arrival {
            signal: self.clone(),
        }
    }

    /// Records one arrival, waking the waiters if it was the last one.
    ///
    /// # Panics
    ///
    /// Panics if no arrival is outstanding. This means some task arrived twice (or arrived without
    /// being counted), which is a bug in the owner of the signal.
    pub fn arrive(&self) {
        let mut remaining = self.shared.lock();
        match remaining.checked_sub(1) {
            Some(n) => *remaining = n,
            None => {
                drop(remaining);
                panic!("completion signal arrived more often than tasks were registered");
            }
        }
        if *remaining == 0 {
            self.shared.condvar.notify_all();
        }
    }

    /// Returns the number of arrivals still outstanding.
    pub fn remaining(&self) -> usize {
        *self.shared.lock()
    }

    /// Blocks until every expected arrival has happened.
    ///
    /// Returns immediately if nothing is outstanding. If an arrival is never made, this never
    /// returns.
    pub fn wait(&self) {
        let guard = self.shared.lock();
        drop(
            self.shared
                .condvar
                .wait_while(guard, |remaining| *remaining != 0)
                .unwrap_or_else(PoisonError::into_inner),
        );
    }

    /// Like [`CompletionSignal::wait`], but gives up after `timeout`.
    ///
    /// A [`Stalled`] error reports how many arrivals were still missing when the timeout expired.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<(), Stalled> {
        let guard = self.shared.lock();
        let (guard, _) = self
            .shared
            .condvar
            .wait_timeout_while(guard, timeout, |remaining| *remaining != 0)
            .unwrap_or_else(PoisonError::into_inner);
        match *guard {
            0 => Ok(()),
            remaining => Err(Stalled { remaining }),
        }
    }
}

impl fmt::Debug for CompletionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("remaining", &self.remaining())
            .finish()
    }
}

/// A registered arrival on a [`CompletionSignal`].
///
/// Dropping this arrives exactly once, whether the owning task returned normally or unwound.
#[must_use = "dropping an `Arrival` immediately marks the task as finished"]
pub struct Arrival {
    signal: CompletionSignal,
}

impl Arrival {
    /// Arrives now. Equivalent to dropping the guard.
    pub fn arrive(self) {}
}

impl Drop for Arrival {
    fn drop(&mut self) {
        self.signal.arrive();
    }
}

/// Returned by [`CompletionSignal::wait_timeout`] when not every task arrived in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stalled {
    /// Number of arrivals that were still missing.
    pub remaining: usize,
}

impl Error for Stalled {}

impl fmt::Display for Stalled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timed out with {} task(s) still outstanding",
            self.remaining
        )
    }
}
