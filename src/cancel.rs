//! Cooperative cancellation.
//!
//! A [`Canceller`] and its [`CancelToken`]s are the two ends of a channel that never carries a
//! message. Cancelling drops the sending end, which every token observes as a disconnect. This
//! makes [`CancelToken::sleep`] wake up the moment cancellation happens, without polling.
//!
//! Cancellation is only ever *requested*: a task that observes it still runs its own cleanup (its
//! completion arrival, closing its channel) exactly once, on its way out.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

/// Creates a connected [`Canceller`] and [`CancelToken`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// let (canceller, token) = confluence::cancellation();
/// assert!(!token.is_cancelled());
/// canceller.cancel();
/// assert!(token.is_cancelled());
/// assert!(!token.sleep(Duration::from_secs(60)));
/// ```
pub fn cancellation() -> (Canceller, CancelToken) {
    let (sender, recv) = crossbeam_channel::bounded(0);
    (
        Canceller { _sender: sender },
        CancelToken { recv },
    )
}

/// The requesting side of a cancellation.
///
/// Dropping the [`Canceller`] cancels every connected [`CancelToken`], just like calling
/// [`Canceller::cancel`].
pub struct Canceller {
    _sender: Sender<()>,
}

impl Canceller {
    /// Cancels every connected [`CancelToken`].
    pub fn cancel(self) {
        log::debug!("cancellation requested");
    }
}

/// The observing side of a cancellation. Cheap to clone.
#[derive(Clone)]
pub struct CancelToken {
    recv: Receiver<()>,
}

impl CancelToken {
    /// Returns a token that is never cancelled.
    pub fn never() -> Self {
        Self {
            recv: crossbeam_channel::never(),
        }
    }

    /// Returns whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.recv.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleeps for `duration`, or until cancellation is requested, whichever comes first.
    ///
    /// Returns `true` if the full duration elapsed, and `false` if the sleep was cut short (or
    /// never started) because of cancellation.
    pub fn sleep(&self, duration: Duration) -> bool {
        match self.recv.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => true,
            Err(RecvTimeoutError::Disconnected) => false,
            Ok(()) => unreachable!("nothing is ever sent on a cancellation channel"),
        }
    }

    /// The underlying receiver, which becomes ready (disconnected) once cancelled. For `select!`.
    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.recv
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::never()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use crate::background;

    use super::*;

    #[test]
    fn never_sleeps_full_duration() {
        let token = CancelToken::never();
        assert!(!token.is_cancelled());
        let start = Instant::now();
        assert!(token.sleep(Duration::from_millis(10)));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn drop_cancels() {
        let (canceller, token) = cancellation();
        let clone = token.clone();
        drop(canceller);
        assert!(token.is_cancelled());
        assert!(clone.is_cancelled());
    }

    #[test]
    fn cancel_interrupts_sleep() {
        let (canceller, token) = cancellation();
        let sleeper = background(move || {
            let start = Instant::now();
            let completed = token.sleep(Duration::from_secs(60));
            (completed, start.elapsed())
        });
        canceller.cancel();
        let (completed, elapsed) = sleeper.join();
        assert!(!completed);
        assert!(elapsed < Duration::from_secs(60));
    }
}
