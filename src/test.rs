//! Internal unit test utilities.

use std::{panic, thread, time::Duration};

use crossbeam_channel::RecvTimeoutError;

/// Runs `f` on a separate thread and waits at most `timeout` for it to return.
///
/// Returns `None` if `f` did not finish in time, which is how tests detect a deadlock instead of
/// hanging. The thread is detached in that case and keeps running until `f` returns (if ever).
///
/// A panic in `f` is re-raised on the calling thread.
pub fn within<R, F>(timeout: Duration, f: F) -> Option<R>
where
    R: Send + 'static,
    F: FnOnce() -> R + Send + 'static,
{
    let (sender, recv) = crossbeam_channel::bounded(1);
    let handle = thread::spawn(move || {
        // The receiver is gone if we already timed out.
        sender.send(f()).ok();
    });
    match recv.recv_timeout(timeout) {
        Ok(value) => {
            handle.join().ok();
            Some(value)
        }
        // The sender was dropped without sending, so `f` unwound.
        Err(RecvTimeoutError::Disconnected) => match handle.join() {
            Err(payload) => panic::resume_unwind(payload),
            Ok(()) => unreachable!("thread exited without sending a result"),
        },
        Err(RecvTimeoutError::Timeout) => None,
    }
}
