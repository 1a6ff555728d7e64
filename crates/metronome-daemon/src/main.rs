//! Scheduler daemon entry point.
//!
//! Runs a pair of periodic tasks under the real-time scheduler: a
//! fast measurement task feeding interval samples into shared state,
//! and a slow reporting task publishing them. Handles Unix signals
//! for clean shutdown and prints per-task interval statistics on exit.

mod signals;

use anyhow::{Context, Result};
use clap::Parser;
use metronome_common::config::SchedulerConfig;
use metronome_sched::{Scheduler, StopToken};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::signals::SignalHandler;

/// Scheduler daemon command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "metronome-daemon",
    about = "Metronome daemon - real-time periodic task scheduler",
    version,
    long_about = None
)]
struct Args {
    /// Path to a scheduler configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// How long to run before shutting down (e.g. "10s", "2min").
    #[arg(long, short = 'd', default_value = "10s", value_parser = humantime::parse_duration)]
    duration: Duration,

    /// Period of the fast measurement task.
    #[arg(long, default_value = "1ms", value_parser = humantime::parse_duration)]
    fast_period: Duration,

    /// Period of the slow reporting task.
    #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
    slow_period: Duration,

    /// Inject a single ~1ms stall into the fast task after this many
    /// invocations (0 = never), to exercise timeliness monitoring.
    #[arg(long, default_value = "0")]
    inject_delay_after: u64,

    /// Stop the scheduler halfway through and start it again.
    #[arg(long)]
    restart: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

/// Interval samples shared between the fast and slow tasks.
#[derive(Debug, Default)]
struct IntervalReport {
    last_tick: Option<Instant>,
    interval: Duration,
    ticks: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting metronome daemon");

    let config = load_config(&args)?;
    info!(
        realtime = config.realtime.enabled,
        timeliness = config.timeliness.enabled,
        "Configuration loaded"
    );

    let signal_handler = SignalHandler::new().context("Failed to set up signal handlers")?;

    run_daemon(config, &signal_handler, &args)
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!(
        "metronome_daemon={},metronome_sched={},metronome_common={}",
        level, level, level
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `METRONOME_CONFIG_PATH` environment variable
/// 3. `/etc/metronome/config.toml` (system path)
/// 4. `config/default.toml` (local development)
/// 5. Built-in defaults
fn load_config(args: &Args) -> Result<SchedulerConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return SchedulerConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path));
    }

    if let Ok(env_path) = std::env::var("METRONOME_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from METRONOME_CONFIG_PATH");
            return SchedulerConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from METRONOME_CONFIG_PATH={:?}", env_path)
            });
        }
        warn!(
            path = %env_path,
            "METRONOME_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    let system_path = PathBuf::from("/etc/metronome/config.toml");
    if system_path.exists() {
        info!(?system_path, "Loading config from system path");
        return SchedulerConfig::from_file(&system_path)
            .with_context(|| format!("Failed to load config from {:?}", system_path));
    }

    let local_path = PathBuf::from("config/default.toml");
    if local_path.exists() {
        info!(?local_path, "Loading config from local path");
        return SchedulerConfig::from_file(&local_path)
            .with_context(|| format!("Failed to load config from {:?}", local_path));
    }

    info!("No config file found, using built-in defaults");
    Ok(SchedulerConfig::default())
}

/// Register the demo task pair and run the scheduler for the requested
/// duration, optionally stopping halfway and starting again.
fn run_daemon(config: SchedulerConfig, signal_handler: &SignalHandler, args: &Args) -> Result<()> {
    let mut scheduler = Scheduler::with_config(config);
    info!(max_priority = scheduler.max_priority(), "Scheduler created");

    let report = Arc::new(Mutex::new(IntervalReport::default()));
    register_tasks(&mut scheduler, &report, args)?;

    let (first_span, second_span) = if args.restart {
        let half = args.duration / 2;
        (half, Some(args.duration - half))
    } else {
        (args.duration, None)
    };

    scheduler.start().context("Failed to start scheduler")?;
    info!(
        state = %scheduler.state(),
        span_secs = first_span.as_secs_f64(),
        "Scheduler started, entering main loop"
    );

    let mut interrupted = run_span(&scheduler, signal_handler, first_span);
    scheduler.stop();

    if let Some(span) = second_span {
        if interrupted {
            info!("Skipping restart: shutdown already requested");
        } else if let Some(fault) = scheduler.last_fault() {
            error!(%fault, "Skipping restart: scheduler faulted");
        } else {
            info!("Restarting scheduler");
            scheduler.start().context("Failed to restart scheduler")?;
            interrupted = run_span(&scheduler, signal_handler, span);
            scheduler.stop();
        }
    }

    report_statistics(&scheduler, &report);
    info!(
        signals = signal_handler.state().signal_count(),
        interrupted,
        final_state = %scheduler.state(),
        "Daemon shutdown complete"
    );

    if let Some(fault) = scheduler.last_fault() {
        return Err(anyhow::Error::new(fault).context("Scheduler stopped on fault"));
    }
    Ok(())
}

/// Register the fast measurement task and the slow reporting task.
///
/// The two tasks share interval samples through a mutex, mirroring a
/// producer/consumer split between a high-rate control loop and a
/// low-rate telemetry loop.
fn register_tasks(
    scheduler: &mut Scheduler,
    report: &Arc<Mutex<IntervalReport>>,
    args: &Args,
) -> Result<()> {
    let fast_priority = scheduler.max_priority();
    let inject_after = args.inject_delay_after;

    let producer = Arc::clone(report);
    scheduler
        .add_task(
            move || {
                let now = Instant::now();
                let mut shared = producer
                    .lock()
                    .map_err(|_| "interval report mutex poisoned")?;
                if let Some(last) = shared.last_tick {
                    shared.interval = now - last;
                }
                shared.last_tick = Some(now);
                shared.ticks += 1;

                if inject_after > 0 && shared.ticks == inject_after {
                    warn!("Injecting artificial stall into fast task");
                    std::thread::sleep(Duration::from_micros(995));
                }
                Ok(())
            },
            "measure",
            args.fast_period,
            fast_priority,
        )
        .context("Failed to register measurement task")?;

    let consumer = Arc::clone(report);
    scheduler
        .add_task(
            move || {
                let shared = consumer
                    .lock()
                    .map_err(|_| "interval report mutex poisoned")?;
                info!(
                    ticks = shared.ticks,
                    interval_us = shared.interval.as_micros() as u64,
                    "Measurement interval"
                );
                Ok(())
            },
            "report",
            args.slow_period,
            0,
        )
        .context("Failed to register reporting task")?;

    Ok(())
}

/// Poll for shutdown conditions until the span elapses.
///
/// Returns `true` if a shutdown signal cut the span short. A stop
/// requested internally (scheduler fault) also ends the span early.
fn run_span(scheduler: &Scheduler, signal_handler: &SignalHandler, span: Duration) -> bool {
    let token: StopToken = scheduler.stop_token();
    let deadline = Instant::now() + span;

    while Instant::now() < deadline {
        if signal_handler.shutdown_requested() {
            info!("Shutdown signal received, stopping scheduler");
            return true;
        }
        if token.is_set() {
            warn!("Scheduler requested stop from within, ending span early");
            signal_handler.request_shutdown();
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}

/// Log final per-task interval statistics.
fn report_statistics(scheduler: &Scheduler, report: &Arc<Mutex<IntervalReport>>) {
    if let Ok(shared) = report.lock() {
        info!(ticks = shared.ticks, "Fast task tick total");
    }

    for name in scheduler.task_names() {
        match scheduler.metrics(&name) {
            Some(snap) => info!(
                task = %name,
                intervals = snap.intervals_recorded,
                min_us = snap.min_ns.map(|ns| ns / 1_000).unwrap_or(0),
                mean_us = snap.mean_ns.map(|ns| ns / 1_000).unwrap_or(0),
                max_us = snap.max_ns.map(|ns| ns / 1_000).unwrap_or(0),
                jitter_us = snap.jitter_ns().map(|ns| ns / 1_000).unwrap_or(0),
                misses = snap.miss_count,
                "Final interval statistics"
            ),
            None => info!(task = %name, "Metrics disabled"),
        }
    }
}
