use std::{
    io,
    panic::resume_unwind,
    thread::{self, JoinHandle},
};

use crate::drop::trace_lifetime;

/// An owned run-to-completion thread.
///
/// Every thread this crate starts is owned by a [`Background`]: the task threads of a
/// [`TaskGroup`], the counters returned by [`spawn_counter`], and the relay thread behind a
/// [`Merged`] stream. Nothing is fire-and-forget.
///
/// Calling [`Background::join`] or dropping a [`Background`] object will join the thread. If the
/// thread panicked, the panic will be propagated to the owner (unless the owner is already
/// panicking).
///
/// [`TaskGroup`]: crate::TaskGroup
/// [`spawn_counter`]: crate::spawn_counter
/// [`Merged`]: crate::Merged
pub struct Background<R> {
    handle: Option<JoinHandle<R>>,
}

impl<R> Drop for Background<R> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(payload) = handle.join() {
                if !thread::panicking() {
                    resume_unwind(payload);
                }
            }
        }
    }
}

impl<R: Send + 'static> Background<R> {
    /// Spawns a named thread running `f` to completion.
    ///
    /// Named threads log their start and exit at `trace` level.
    pub fn spawn_named<N, F>(name: N, f: F) -> io::Result<Self>
    where
        N: Into<String>,
        F: FnOnce() -> R + Send + 'static,
    {
        let name = name.into();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            let _guard = trace_lifetime("thread", name);
            f()
        })?;
        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Blocks on the background thread and returns its result.
    ///
    /// If the thread panics, the panic will be propagated to the owner.
    pub fn join(mut self) -> R {
        // Only `join` and `drop` take the handle, and both consume `self`.
        let handle = self.handle.take().unwrap();
        match handle.join() {
            Ok(r) => r,
            Err(payload) => resume_unwind(payload),
        }
    }

    /// Joins the thread and hands back its panic payload instead of propagating it.
    pub(crate) fn try_join(mut self) -> thread::Result<R> {
        self.handle.take().unwrap().join()
    }

    /// Returns whether the thread has finished running (by returning or by panicking).
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

/// Spawns an unnamed run-to-completion [`Background`] thread.
///
/// # Panics
///
/// Panics if the operating system refuses to create a thread. Use [`Background::spawn_named`] to
/// handle that case.
///
/// # Examples
///
/// ```
/// use confluence::background;
///
/// let sum = background(|| (1..=10).sum::<u32>());
/// assert_eq!(sum.join(), 55);
/// ```
pub fn background<R, F>(f: F) -> Background<R>
where
    R: Send + 'static,
    F: FnOnce() -> R + Send + 'static,
{
    Background {
        handle: Some(thread::spawn(f)),
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{catch_unwind, AssertUnwindSafe};

    use super::*;

    fn silent_panic(payload: String) {
        resume_unwind(Box::new(payload));
    }

    #[test]
    fn join_returns_result() {
        let bg = Background::spawn_named("adder", || 1 + 1).unwrap();
        assert_eq!(bg.join(), 2);
    }

    #[test]
    fn thread_gets_its_name() {
        let bg = Background::spawn_named("named-thread", || {
            thread::current().name().map(str::to_owned)
        })
        .unwrap();
        assert_eq!(bg.join().as_deref(), Some("named-thread"));
    }

    #[test]
    fn join_propagates_panic() {
        let bg = background(|| silent_panic("background panic".into()));
        catch_unwind(AssertUnwindSafe(|| bg.join())).unwrap_err();
    }

    #[test]
    fn drop_propagates_panic() {
        let bg = background(|| silent_panic("background panic".into()));
        catch_unwind(AssertUnwindSafe(|| drop(bg))).unwrap_err();
    }

    #[test]
    fn is_finished_eventually() {
        let bg = background(|| ());
        while !bg.is_finished() {
            thread::yield_now();
        }
        bg.join();
    }
}
