use std::{process::ExitCode, time::Duration};

use clap::Parser;
use confluence::{run_demo, DemoConfig};
use tracing_subscriber::EnvFilter;

/// Counts in parallel twice: once waiting on a task group, once merging channels.
#[derive(Debug, Parser)]
#[command(name = "confluence", version)]
struct Args {
    /// Number of parallel counters.
    #[arg(short = 'n', long = "tasks", default_value_t = DemoConfig::default().task_count)]
    task_count: usize,

    /// Values emitted by each counter.
    #[arg(long, default_value_t = DemoConfig::default().iterations)]
    iterations: usize,

    /// Delay before each value, in milliseconds.
    #[arg(long = "interval-ms", default_value_t = default_interval_ms())]
    interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    DemoConfig::default().interval.as_millis() as u64
}

impl From<Args> for DemoConfig {
    fn from(args: Args) -> Self {
        Self {
            task_count: args.task_count,
            iterations: args.iterations,
            interval: Duration::from_millis(args.interval_ms),
        }
    }
}

fn main() -> ExitCode {
    // Diagnostics go to stderr, so that stdout only carries the demo output.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = DemoConfig::from(Args::parse());
    log::debug!("running demo with {config:?}");

    match run_demo(&config, |line| println!("{line}")) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("confluence: failed to start a thread: {e}");
            ExitCode::FAILURE
        }
    }
}
