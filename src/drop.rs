//! Drop guards.
//!
//! Most of the exactly-once guarantees in this crate (a completion arriving, a channel closing, a
//! thread logging its exit) are tied to a destructor, so that they also run while unwinding.

/// Drop guard returned by [`defer`].
#[must_use = "`Defer` runs its callback when dropped, so it must be bound to a variable"]
pub struct Defer<F: FnOnce()> {
    cb: Option<F>,
}

impl<F: FnOnce()> Drop for Defer<F> {
    fn drop(&mut self) {
        if let Some(cb) = self.cb.take() {
            cb();
        }
    }
}

/// Returns a guard that runs `cb` when dropped.
pub fn defer<F: FnOnce()>(cb: F) -> Defer<F> {
    Defer { cb: Some(cb) }
}

/// Logs `'{name}' starting` now and `'{name}' exiting` when the returned guard is dropped.
pub(crate) fn trace_lifetime(kind: &'static str, name: String) -> Defer<impl FnOnce()> {
    log::trace!("{kind} '{name}' starting");
    defer(move || log::trace!("{kind} '{name}' exiting"))
}
