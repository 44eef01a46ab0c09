//! Timed emission tasks.
//!
//! A counter task sleeps for a fixed interval, emits `"process {id} counting {i}"`, and repeats
//! for a fixed number of iterations. It comes in two flavors:
//!
//! - [`count`] hands each value to a closure (the task group demo prints them).
//! - [`spawn_counter`] runs the loop on its own thread and sends each value over a private
//!   rendezvous channel, closing it after the last one.

use std::{io, ops::ControlFlow, time::Duration};

use crossbeam_channel::{select, Receiver};

use crate::{Background, CancelToken};

/// How many values a counter emits, and how far apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Number of values emitted, counting from 1.
    pub iterations: usize,
    /// Delay before each emission.
    pub interval: Duration,
}

impl Schedule {
    pub fn new(iterations: usize, interval: Duration) -> Self {
        Self {
            iterations,
            interval,
        }
    }
}

impl Default for Schedule {
    /// Ten values, one per second.
    fn default() -> Self {
        Self::new(10, Duration::from_secs(1))
    }
}

/// Formats the `i`th value emitted by process `process_id`.
pub fn label(process_id: usize, i: usize) -> String {
    format!("process {process_id} counting {i}")
}

/// How a counter run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every iteration of the [`Schedule`] was emitted.
    Finished,
    /// Cancellation was requested before the last emission.
    Cancelled,
    /// Nobody was left to receive the values.
    Disconnected,
}

/// The result of a counter run: how many values were delivered, and why it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub emitted: usize,
    pub outcome: Outcome,
}

/// Runs a counter to completion on the calling thread, passing every value to `emit`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use confluence::{count, Schedule};
///
/// let mut lines = Vec::new();
/// count(7, &Schedule::new(2, Duration::ZERO), |line| lines.push(line));
/// assert_eq!(lines, ["process 7 counting 1", "process 7 counting 2"]);
/// ```
pub fn count<F: FnMut(String)>(process_id: usize, schedule: &Schedule, mut emit: F) {
    count_until(process_id, schedule, &CancelToken::never(), |line| {
        emit(line);
        ControlFlow::Continue(())
    });
}

/// Runs a counter on the calling thread until it finishes, `cancel` fires, or `emit` breaks.
///
/// Cancellation is checked while sleeping between emissions. `emit` can stop the run early by
/// returning [`ControlFlow::Break`] with the [`Outcome`] to report; the value it was given then
/// does not count as emitted.
pub fn count_until<F>(
    process_id: usize,
    schedule: &Schedule,
    cancel: &CancelToken,
    mut emit: F,
) -> Progress
where
    F: FnMut(String) -> ControlFlow<Outcome>,
{
    for i in 1..=schedule.iterations {
        let stopped = |outcome| Progress {
            emitted: i - 1,
            outcome,
        };
        if !cancel.sleep(schedule.interval) {
            return stopped(Outcome::Cancelled);
        }
        if let ControlFlow::Break(outcome) = emit(label(process_id, i)) {
            return stopped(outcome);
        }
    }
    Progress {
        emitted: schedule.iterations,
        outcome: Outcome::Finished,
    }
}

/// Spawns a counter thread named `counter-{process_id}` that sends its values over a rendezvous
/// channel.
///
/// Each send blocks until the returned [`Receiver`] takes the value. After the last value the
/// thread drops its sender, so the channel disconnects exactly once, and only from this side. If
/// the receiver is dropped first, the counter stops with [`Outcome::Disconnected`].
///
/// The [`Background`] handle yields the counter's [`Progress`] when joined.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use confluence::{spawn_counter, Schedule};
///
/// let (values, counter) = spawn_counter(1, Schedule::new(3, Duration::ZERO))?;
/// let values: Vec<String> = values.iter().collect();
/// assert_eq!(values.len(), 3);
/// assert_eq!(counter.join().emitted, 3);
/// # Ok::<(), std::io::Error>(())
/// ```
pub fn spawn_counter(
    process_id: usize,
    schedule: Schedule,
) -> io::Result<(Receiver<String>, Background<Progress>)> {
    spawn_counter_with(process_id, schedule, CancelToken::never())
}

/// Like [`spawn_counter`], but stops early when `cancel` fires.
///
/// Cancellation also interrupts a send that is waiting for the receiver. The channel is closed
/// exactly once either way.
pub fn spawn_counter_with(
    process_id: usize,
    schedule: Schedule,
    cancel: CancelToken,
) -> io::Result<(Receiver<String>, Background<Progress>)> {
    let (sender, recv) = crossbeam_channel::bounded(0);
    let thread = Background::spawn_named(format!("counter-{process_id}"), move || {
        let progress = count_until(process_id, &schedule, &cancel, |line| {
            select! {
                send(sender, line) -> res => match res {
                    Ok(()) => ControlFlow::Continue(()),
                    Err(_) => ControlFlow::Break(Outcome::Disconnected),
                },
                recv(cancel.receiver()) -> _ => ControlFlow::Break(Outcome::Cancelled),
            }
        });
        drop(sender);
        log::debug!("counter {process_id} closed its channel: {progress:?}");
        progress
    })?;
    Ok((recv, thread))
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use crate::cancellation;

    use super::*;

    fn quick(iterations: usize) -> Schedule {
        Schedule::new(iterations, Duration::from_millis(1))
    }

    #[test]
    fn labels() {
        assert_eq!(label(1, 10), "process 1 counting 10");
    }

    #[test]
    fn count_emits_in_order() {
        let mut lines = Vec::new();
        count(3, &quick(4), |line| lines.push(line));
        assert_eq!(
            lines,
            [
                "process 3 counting 1",
                "process 3 counting 2",
                "process 3 counting 3",
                "process 3 counting 4",
            ]
        );
    }

    #[test]
    fn count_waits_before_each_value() {
        let schedule = Schedule::new(3, Duration::from_millis(10));
        let start = Instant::now();
        count(1, &schedule, drop);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn zero_iterations_emit_nothing() {
        let progress = count_until(1, &quick(0), &CancelToken::never(), |_| {
            panic!("nothing should be emitted")
        });
        assert_eq!(
            progress,
            Progress {
                emitted: 0,
                outcome: Outcome::Finished
            }
        );
    }

    #[test]
    fn emit_can_stop_the_run() {
        let progress = count_until(1, &quick(10), &CancelToken::never(), |line| {
            if line.ends_with('3') {
                ControlFlow::Break(Outcome::Disconnected)
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(progress.emitted, 2);
        assert_eq!(progress.outcome, Outcome::Disconnected);
    }

    #[test]
    fn channel_counter_closes_after_last_value() {
        let (values, counter) = spawn_counter(2, quick(3)).unwrap();
        let received: Vec<_> = values.iter().collect();
        assert_eq!(
            received,
            [
                "process 2 counting 1",
                "process 2 counting 2",
                "process 2 counting 3",
            ]
        );
        // Closed for good: every further receive returns immediately.
        assert!(values.recv().is_err());
        assert!(values.recv().is_err());
        assert_eq!(counter.join().outcome, Outcome::Finished);
    }

    #[test]
    fn channel_counter_stops_when_receiver_is_dropped() {
        let (values, counter) = spawn_counter(1, quick(10)).unwrap();
        assert_eq!(values.recv().unwrap(), "process 1 counting 1");
        drop(values);
        let progress = counter.join();
        assert_eq!(progress.emitted, 1);
        assert_eq!(progress.outcome, Outcome::Disconnected);
    }

    #[test]
    fn cancelled_counter_closes_its_channel() {
        let (canceller, token) = cancellation();
        let schedule = Schedule::new(10, Duration::from_secs(60));
        let (values, counter) = spawn_counter_with(1, schedule, token).unwrap();
        canceller.cancel();
        assert!(values.recv().is_err());
        let progress = counter.join();
        assert_eq!(progress.emitted, 0);
        assert_eq!(progress.outcome, Outcome::Cancelled);
    }

    #[test]
    fn cancel_interrupts_blocked_send() {
        let (canceller, token) = cancellation();
        let (values, counter) = spawn_counter_with(1, quick(10), token).unwrap();
        assert_eq!(values.recv().unwrap(), "process 1 counting 1");
        // Nobody receives the second value; the counter sits in its send until cancelled.
        canceller.cancel();
        let progress = counter.join();
        assert_eq!(progress.outcome, Outcome::Cancelled);
        assert_eq!(progress.emitted, 1);
        assert!(values.recv().is_err());
    }
}
