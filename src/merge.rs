//! Merging several channels into one.
//!
//! [`fan_in`] moves a set of source [`Receiver`]s onto a relay thread, which forwards whatever
//! arrives on any of them into a single [`Merged`] stream. The merged stream ends once every source
//! has disconnected, and not a moment earlier.
//!
//! # Ordering
//!
//! Values from the *same* source come out in the order that source sent them. Values from
//! *different* sources come out in whatever order the relay happened to receive them, which
//! depends on the timing of the producers; no interleaving between sources is guaranteed, and
//! callers should not rely on one.

use std::{io, iter, panic::resume_unwind, thread, time::Duration};

use crossbeam_channel::{Receiver, RecvTimeoutError, Select, Sender};

use crate::Background;

/// Merges `sources` into a single stream.
///
/// This is shorthand for `FanInBuilder::new().spawn(sources)`: the relay thread is named
/// `fan-in`, and the merged stream is a rendezvous channel, so a value is only taken from a source
/// once the previous one has been handed to the consumer.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use confluence::{fan_in, spawn_counter, Schedule};
///
/// let schedule = Schedule::new(3, Duration::ZERO);
/// let (a, counter_a) = spawn_counter(1, schedule)?;
/// let (b, counter_b) = spawn_counter(2, schedule)?;
///
/// let merged: Vec<String> = fan_in([a, b])?.collect();
/// assert_eq!(merged.len(), 6);
/// # drop((counter_a, counter_b));
/// # Ok::<(), std::io::Error>(())
/// ```
pub fn fan_in<T, I>(sources: I) -> io::Result<Merged<T>>
where
    T: Send + 'static,
    I: IntoIterator<Item = Receiver<T>>,
{
    FanInBuilder::new().spawn(sources)
}

/// A builder object that can be used to configure and spawn a [`Merged`] stream.
#[derive(Clone)]
pub struct FanInBuilder {
    name: String,
    capacity: usize,
}

impl Default for FanInBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FanInBuilder {
    pub fn new() -> Self {
        Self {
            name: "fan-in".to_string(),
            capacity: 0,
        }
    }

    /// Sets the name of the relay thread.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }

    /// Sets the capacity of the merged channel.
    ///
    /// By default, a capacity of 0 is used, which means that the relay blocks on every value
    /// until the consumer takes it, and in turn leaves the sources blocked in their sends.
    #[inline]
    pub fn capacity(self, capacity: usize) -> Self {
        Self { capacity, ..self }
    }

    /// Spawns the relay thread, taking ownership of `sources`.
    pub fn spawn<T, I>(self, sources: I) -> io::Result<Merged<T>>
    where
        T: Send + 'static,
        I: IntoIterator<Item = Receiver<T>>,
    {
        let sources: Vec<_> = sources.into_iter().collect();
        let (sender, recv) = crossbeam_channel::bounded(self.capacity);
        let (stop, stopped) = crossbeam_channel::bounded(0);
        let relay =
            Background::spawn_named(self.name, move || run_relay(sources, sender, stopped))?;
        Ok(Merged::new(recv, stop, relay))
    }
}

/// Forwards values from `sources` to `out` until every source has disconnected, or until the
/// consumer goes away.
fn run_relay<T>(sources: Vec<Receiver<T>>, out: Sender<T>, stopped: Receiver<()>) {
    let mut open: Vec<(usize, Receiver<T>)> = sources.into_iter().enumerate().collect();
    let mut closed = vec![false; open.len()];
    let mut forwarded = 0usize;

    while !open.is_empty() {
        let (index, res) = {
            let mut select = Select::new();
            for (_, source) in &open {
                select.recv(source);
            }
            let stop_index = select.recv(&stopped);

            let op = select.select();
            let index = op.index();
            if index == stop_index {
                op.recv(&stopped).ok();
                log::debug!("merged stream dropped by its consumer after {forwarded} value(s)");
                return;
            }
            (index, op.recv(&open[index].1))
        };

        match res {
            Ok(value) => {
                if out.send(value).is_err() {
                    log::debug!("merged stream dropped by its consumer after {forwarded} value(s)");
                    return;
                }
                forwarded += 1;
            }
            Err(_) => {
                // A disconnected source is always ready, so it has to leave the selection for good.
                let (source, _) = open.swap_remove(index);
                debug_assert!(!closed[source], "source {source} disconnected twice");
                closed[source] = true;
                log::trace!("source {source} disconnected, {} still open", open.len());
            }
        }
    }

    debug_assert!(closed.iter().all(|&c| c));
    log::debug!("all sources disconnected after {forwarded} value(s), closing merged stream");
    drop(out);
}

/// A merged stream of values, fed by a relay thread.
///
/// Created by [`fan_in`] or [`FanInBuilder::spawn`]. Values can be taken with [`Merged::recv`],
/// [`Merged::recv_timeout`], or by iterating; iteration ends once every source has disconnected.
///
/// This type enforces structured concurrency: when it's dropped, the relay thread is signaled to
/// exit (releasing all sources) and is then joined. If the relay has panicked, the panic is
/// forwarded to the thread that drops the [`Merged`] stream or drains it to the end.
pub struct Merged<T: Send + 'static> {
    recv: Option<Receiver<T>>,
    /// Dropping this tells the relay to stop even while it is waiting on the sources.
    stop: Option<Sender<()>>,
    relay: Option<Background<()>>,
}

impl<T: Send + 'static> Drop for Merged<T> {
    fn drop(&mut self) {
        drop(self.recv.take());
        drop(self.stop.take());

        self.wait_for_exit();
    }
}

impl<T: Send + 'static> Merged<T> {
    fn new(recv: Receiver<T>, stop: Sender<()>, relay: Background<()>) -> Self {
        Self {
            recv: Some(recv),
            stop: Some(stop),
            relay: Some(relay),
        }
    }

    fn wait_for_exit(&mut self) {
        if let Some(relay) = self.relay.take() {
            if let Err(payload) = relay.try_join() {
                if !thread::panicking() {
                    resume_unwind(payload);
                }
            }
        }
    }

    fn receiver(&self) -> &Receiver<T> {
        // Only taken in `drop`.
        self.recv.as_ref().unwrap()
    }

    /// Blocks until the next value arrives and returns it.
    ///
    /// Returns [`None`] once every source has disconnected and all of their values have been
    /// returned. From then on, every call returns [`None`] immediately.
    pub fn recv(&mut self) -> Option<T> {
        match self.receiver().recv() {
            Ok(value) => Some(value),
            Err(_) => {
                // Also propagates a relay panic, so that it is not mistaken for the end.
                self.wait_for_exit();
                None
            }
        }
    }

    /// Like [`Merged::recv`], but gives up after `timeout`.
    ///
    /// Returns [`RecvTimeoutError::Disconnected`] at the end of the stream.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        let res = self.receiver().recv_timeout(timeout);
        if let Err(RecvTimeoutError::Disconnected) = res {
            self.wait_for_exit();
        }
        res
    }

    /// Returns a blocking iterator over the merged values that leaves `self` usable afterwards.
    ///
    /// The iterator ends at the end of the stream, after which [`Merged::recv`] keeps returning
    /// [`None`].
    pub fn iter(&mut self) -> impl Iterator<Item = T> + '_ {
        iter::from_fn(move || self.recv())
    }
}

impl<T: Send + 'static> Iterator for Merged<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.recv()
    }
}
