use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ratekeeper::config::{LogFormat, LoggingConfig, RatekeeperConfig};
use ratekeeper::ratelimit::{LimiterFactory, LimiterSpec, RateLimiter};
use ratekeeper::simulate::{simulate, SimulationPlan};

#[derive(Debug, Parser)]
#[command(name = "ratekeeper", version, about = "Per-client rate limiting engine")]
struct Cli {
    /// Configuration file (YAML); RATEKEEPER_* variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log output format, overriding the configuration
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Drive a limiter with concurrent simulated clients
    Simulate {
        /// Strategy tag: fixed, sliding_log, sliding_counter, leaky or token
        #[arg(long, requires_all = ["limit", "window_or_rate"])]
        kind: Option<String>,

        /// Request quota, or bucket capacity
        #[arg(long, requires = "kind")]
        limit: Option<f64>,

        /// Window in seconds, or leak/refill rate per second
        #[arg(long, requires = "kind")]
        window_or_rate: Option<f64>,

        /// Number of concurrent clients
        #[arg(long, default_value_t = 3)]
        clients: usize,

        /// Requests issued by each client
        #[arg(long, default_value_t = 10)]
        requests: usize,

        /// Pause between a client's requests, in milliseconds
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = RatekeeperConfig::load(cli.config.as_deref())?;
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    init_tracing(&config.logging);

    info!("Starting ratekeeper");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Simulate {
            kind,
            limit,
            window_or_rate,
            clients,
            requests,
            interval_ms,
        } => {
            let spec = match (kind, limit, window_or_rate) {
                (Some(kind), Some(limit), Some(window_or_rate)) => {
                    LimiterSpec::from_params(&kind, limit, window_or_rate)?
                }
                _ => config.limiter.clone(),
            };

            let factory = LimiterFactory::new();
            let limiter: Arc<dyn RateLimiter<String>> = Arc::from(factory.build::<String>(&spec)?);

            if let Some(idle) = config.idle_ttl() {
                let every = Duration::try_from_secs_f64(config.store.sweep_interval_secs)
                    .ok()
                    .filter(|d| !d.is_zero())
                    .unwrap_or(Duration::from_secs(30));
                tokio::spawn(sweep_idle_clients(limiter.clone(), idle, every));
            }

            let plan = SimulationPlan::numbered(
                &format!("client_{}", spec.kind()),
                clients,
                requests,
                Duration::from_millis(interval_ms),
            );

            tokio::select! {
                report = simulate(limiter, plan) => {
                    print!("{}", serde_yaml::to_string(&report)?);
                }
                _ = shutdown_signal() => {
                    warn!("Simulation interrupted");
                }
            }
        }
    }

    info!("ratekeeper stopped");
    Ok(())
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match logging.format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Periodically drop state for clients that have gone quiet.
async fn sweep_idle_clients(limiter: Arc<dyn RateLimiter<String>>, idle: Duration, every: Duration) {
    info!(idle_secs = idle.as_secs_f64(), every_secs = every.as_secs_f64(), "Idle client sweeper started");

    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let evicted = limiter.evict_idle(idle);
        if evicted > 0 {
            info!(evicted, remaining = limiter.tracked_clients(), "Swept idle clients");
        }
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping");
        }
    }
}
