//! pgmond - PostgreSQL custom metrics daemon.
//!
//! Runs the configured SQL queries against every configured server and
//! database on a fixed interval and writes the resulting metrics to stdout.
//! Logs go to stderr.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use pgmon_core::collector::PgConnector;
use pgmon_core::metrics::MetricWriter;
use pgmon_core::{Monitor, MonitorConfig};

/// PostgreSQL custom metrics daemon.
#[derive(Parser, Debug)]
#[command(name = "pgmond", about = "PostgreSQL custom metrics daemon", version)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "config.yml")]
    config: PathBuf,

    /// Polling interval in seconds. Overrides `pollInterval` from the config.
    #[arg(short, long)]
    interval: Option<u64>,

    /// Run a single polling cycle and exit.
    #[arg(long)]
    once: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

fn log_level(verbose: u8, quiet: bool) -> Level {
    if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

/// Initializes the tracing subscriber. Stdout is reserved for metrics.
fn init_logging(verbose: u8, quiet: bool) {
    let level = log_level(verbose, quiet);

    let mut filter = EnvFilter::from_default_env();
    for target in ["pgmond", "pgmon_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Sleeps for `duration`, waking early once `running` is cleared.
fn sleep_while_running(duration: Duration, running: &AtomicBool) {
    let step = Duration::from_millis(100);
    let mut remaining = duration;
    while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
        let slice = remaining.min(step);
        std::thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    info!("pgmond {} starting", env!("CARGO_PKG_VERSION"));

    let config = match MonitorConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let interval = args
        .interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.poll_interval());
    info!(
        "Config: file={}, servers={}, threads={}, interval={}s",
        args.config.display(),
        config.servers.len(),
        config.number_of_threads,
        interval.as_secs()
    );

    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(config.number_of_threads.max(1))
        .thread_name(|i| format!("pgmon-worker-{}", i))
        .build()
    {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to build worker pool: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let monitor = Monitor::new(
        Arc::new(PgConnector::new()),
        Arc::new(MetricWriter::stdout()),
        Arc::new(pool),
    )
    .with_metric_prefix(&config.metric_prefix)
    .with_poll_timeout(config.poll_timeout());

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let mut cycles: u64 = 0;
    while running.load(Ordering::SeqCst) {
        cycles += 1;
        let summary = monitor.run_cycle(config.server_specs());
        debug!(
            "Cycle #{}: {} servers polled, {} alive, {} failed in {:?}",
            cycles,
            summary.servers.len(),
            summary.alive(),
            summary.failed,
            summary.duration
        );

        if args.once {
            break;
        }
        sleep_while_running(interval.saturating_sub(summary.duration), &running);
    }

    info!("Shutting down after {} cycles", cycles);
    ExitCode::SUCCESS
}
