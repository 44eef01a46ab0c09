//! The two-phase counting demo run by the `confluence` binary.

use std::{io, sync::Arc, time::Duration};

use crate::{count, fan_in, run_group, spawn_counter, Schedule};

/// Settings for [`run_demo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoConfig {
    /// Number of counters running in parallel in each phase.
    pub task_count: usize,
    /// Values emitted by each counter.
    pub iterations: usize,
    /// Delay before each value.
    pub interval: Duration,
}

impl Default for DemoConfig {
    fn default() -> Self {
        let schedule = Schedule::default();
        Self {
            task_count: 2,
            iterations: schedule.iterations,
            interval: schedule.interval,
        }
    }
}

impl DemoConfig {
    pub fn schedule(&self) -> Schedule {
        Schedule::new(self.iterations, self.interval)
    }
}

/// Header emitted before the task group phase.
pub const GROUP_HEADER: &str = "== task group ==";
/// Header emitted before the fan-in phase.
pub const FAN_IN_HEADER: &str = "== fan-in ==";

/// Runs the task group phase to completion, then the fan-in phase, routing every line to `emit`.
///
/// In the first phase, `emit` is called concurrently from the counter threads. In the second, the
/// counters send their values over channels that are merged, and `emit` is only ever called from
/// the calling thread, in the order the merged stream delivers them.
pub fn run_demo<F>(config: &DemoConfig, emit: F) -> io::Result<()>
where
    F: Fn(String) + Send + Sync + 'static,
{
    let emit = Arc::new(emit);
    let schedule = config.schedule();

    emit(GROUP_HEADER.to_string());
    let group_emit = emit.clone();
    run_group(config.task_count, move |id| {
        count(id, &schedule, |line| group_emit(line))
    })?;

    emit(FAN_IN_HEADER.to_string());
    // Declared before `sources`, so that on an early return the channels are dropped first and
    // the counters can exit instead of blocking in a send.
    let mut counters = Vec::with_capacity(config.task_count);
    let mut sources = Vec::with_capacity(config.task_count);
    for id in 1..=config.task_count {
        let (source, counter) = spawn_counter(id, schedule)?;
        sources.push(source);
        counters.push(counter);
    }
    for line in fan_in(sources)? {
        emit(line);
    }
    for counter in counters {
        let progress = counter.join();
        log::trace!("counter finished: {progress:?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use crate::test::within;

    use super::*;

    fn quick(task_count: usize, iterations: usize) -> DemoConfig {
        DemoConfig {
            task_count,
            iterations,
            interval: Duration::from_millis(1),
        }
    }

    fn run_collect(config: DemoConfig) -> Vec<String> {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        within(Duration::from_secs(10), move || {
            run_demo(&config, move |line| sink.lock().unwrap().push(line)).unwrap()
        })
        .expect("demo did not finish");
        let lines = lines.lock().unwrap().clone();
        lines
    }

    #[test]
    fn default_config() {
        let config = DemoConfig::default();
        assert_eq!(config.task_count, 2);
        assert_eq!(config.iterations, 10);
        assert_eq!(config.interval, Duration::from_secs(1));
    }

    #[test]
    fn phases_run_back_to_back() {
        let lines = run_collect(quick(2, 3));
        assert_eq!(lines.len(), 2 + 2 * 2 * 3);

        let split = lines.iter().position(|l| l == FAN_IN_HEADER).unwrap();
        assert_eq!(lines[0], GROUP_HEADER);
        let (group, merged) = (&lines[1..split], &lines[split + 1..]);

        // Every group line is printed before the fan-in phase starts.
        for phase in [group, merged] {
            assert_eq!(phase.len(), 6);
            for id in 1..=2 {
                let own: Vec<&str> = phase
                    .iter()
                    .map(String::as_str)
                    .filter(|l| l.starts_with(&format!("process {id} ")))
                    .collect();
                let expected: Vec<String> =
                    (1..=3).map(|i| format!("process {id} counting {i}")).collect();
                assert_eq!(own, expected);
            }
        }
    }

    #[test]
    fn no_tasks() {
        assert_eq!(run_collect(quick(0, 3)), [GROUP_HEADER, FAN_IN_HEADER]);
    }
}
