use std::{io, panic::resume_unwind, sync::Arc, thread, time::Duration};

use crate::{
    signal::{CompletionSignal, Stalled},
    Background,
};

/// Runs `count` tasks concurrently and blocks until all of them have finished.
///
/// Task `i` (for `i` in `1..=count`) runs `task(i)` on its own thread. With a `count` of 0 this
/// returns immediately without spawning anything. The relative order in which tasks run, and in
/// which their side effects become visible, is unspecified.
///
/// If a task panics, the remaining tasks still run to completion, and then the panic is propagated
/// to the caller.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let done = Arc::new(AtomicUsize::new(0));
/// let d = done.clone();
/// confluence::run_group(4, move |_id| {
///     d.fetch_add(1, Ordering::Relaxed);
/// })?;
/// assert_eq!(done.load(Ordering::Relaxed), 4);
/// # Ok::<(), std::io::Error>(())
/// ```
pub fn run_group<F>(count: usize, task: F) -> io::Result<()>
where
    F: Fn(usize) + Send + Sync + 'static,
{
    TaskGroup::builder().spawn(count, task)?.wait();
    Ok(())
}

/// A builder object that can be used to configure and spawn a [`TaskGroup`].
#[derive(Clone, Default)]
pub struct TaskGroupBuilder {
    name: Option<String>,
}

impl TaskGroupBuilder {
    /// Sets the base name of the [`TaskGroup`] threads.
    ///
    /// Each task thread will be named according to this base name and its process ID. Without a
    /// base name, threads are called `task-{id}`.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    /// Creates an empty [`TaskGroup`].
    pub fn build(self) -> TaskGroup {
        TaskGroup {
            name: self.name,
            signal: CompletionSignal::new(0),
            tasks: Vec::new(),
        }
    }

    /// Creates a [`TaskGroup`] running `task(id)` for every `id` in `1..=count`.
    ///
    /// `task` has to implement [`Fn`] (not just [`FnOnce`]), because it is shared across all
    /// threads in the group, and may execute several times at once.
    ///
    /// If spawning a thread fails, the tasks spawned so far are joined before the error is
    /// returned.
    pub fn spawn<F>(self, count: usize, task: F) -> io::Result<TaskGroup>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        let task = Arc::new(task);
        let mut group = self.build();
        for id in 1..=count {
            let task = task.clone();
            group.spawn(id, move || task(id))?;
        }
        log::debug!("{} spawned {count} task(s)", group.describe());
        Ok(group)
    }
}

/// An owned set of concurrently running tasks, plus the [`CompletionSignal`] they arrive on.
///
/// Every task spawned through [`TaskGroup::spawn`] registers one expected arrival before its thread
/// starts, and arrives exactly once when it ends (also when it panics, and also when the thread
/// could not be spawned at all). [`TaskGroup::wait`] blocks until the count reaches zero and then
/// joins every thread.
///
/// Dropping a [`TaskGroup`] joins all of its threads, so no task outlives its group. Panics from
/// tasks are forwarded to the owner when it waits for or drops the group. If more than one task
/// has panicked, the payload of one of them is propagated.
pub struct TaskGroup {
    name: Option<String>,
    signal: CompletionSignal,
    tasks: Vec<Background<()>>,
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        self.join_all();
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGroup {
    /// Returns a builder that can be used to configure and spawn a [`TaskGroup`].
    #[inline]
    pub fn builder() -> TaskGroupBuilder {
        TaskGroupBuilder::default()
    }

    /// Creates an empty, unnamed [`TaskGroup`].
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Spawns `task` on a new thread tagged with `process_id`.
    pub fn spawn<F>(&mut self, process_id: usize, task: F) -> io::Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let arrival = self.signal.register();
        let name = match &self.name {
            Some(base) => format!("{base}-{process_id}"),
            None => format!("task-{process_id}"),
        };
        // On error the closure is dropped unrun, which performs its arrival.
        let handle = Background::spawn_named(name, move || {
            let _arrival = arrival;
            task();
        })?;
        self.tasks.push(handle);
        Ok(())
    }

    /// Returns the number of tasks that have been spawned and not yet joined.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Returns the number of tasks that have not arrived yet.
    pub fn remaining(&self) -> usize {
        self.signal.remaining()
    }

    /// The signal the tasks of this group arrive on.
    ///
    /// Arrivals registered through this handle are waited for just like the group's own tasks.
    /// Raising the count with [`CompletionSignal::add`] without a matching arrival makes
    /// [`TaskGroup::wait`] block forever.
    pub fn signal(&self) -> &CompletionSignal {
        &self.signal
    }

    /// Blocks until every task has arrived, then joins all task threads.
    ///
    /// If any task panicked, the panic is propagated once every thread has been joined.
    pub fn wait(mut self) {
        self.signal.wait();
        log::debug!("{} finished", self.describe());
        self.join_all();
    }

    /// Like [`TaskGroup::wait`], but gives up after `timeout`.
    ///
    /// On success, all task threads have been joined. On [`Stalled`], the group keeps ownership of
    /// its tasks and can be waited on again.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<(), Stalled> {
        self.signal.wait_timeout(timeout)?;
        self.join_all();
        Ok(())
    }

    fn join_all(&mut self) {
        let mut payload = None;
        for task in self.tasks.drain(..) {
            if let Err(pl) = task.try_join() {
                payload = Some(pl);
            }
        }
        if let Some(payload) = payload {
            if !thread::panicking() {
                resume_unwind(payload);
            }
        }
    }

    fn describe(&self) -> String {
        match &self.name {
            Some(name) => format!("task group '{name}'"),
            None => "task group".to_string(),
        }
    }
}
