use clap::Parser;
use futures::FutureExt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::admission::{AdmissionPipeline, HeaderIdentityResolver};
use turnstile::clock::{Clock, SystemClock};
use turnstile::config::{LogFormat, TurnstileConfig};
use turnstile::http::HttpServer;
use turnstile::ratelimit::{
    spawn_sweeper, BucketStore, InMemoryBucketStore, PolicyTable, RateLimiter,
};

/// In-memory HTTP admission gate.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the configuration
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Log output format, overrides the configuration
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = TurnstileConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }

    init_tracing(&config);

    info!("Starting Turnstile admission gate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(bind_addr = %config.server.bind_addr, "Configuration loaded");

    // Policies are validated here so a bad constant never reaches a request.
    let policies = PolicyTable::compiled()?;

    let store: Arc<dyn BucketStore> = Arc::new(InMemoryBucketStore::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let limiter =
        RateLimiter::with_store(store.clone()).with_overflow(config.rate_limiting.overflow);
    let resolver = HeaderIdentityResolver::new(&config.identity.principal_header)?;

    let pipeline = AdmissionPipeline::new(limiter, policies, Arc::new(resolver), clock.clone())
        .with_resolver_timeout(config.identity.timeout());
    info!(
        principal_header = %config.identity.principal_header,
        overflow = ?config.rate_limiting.overflow,
        "Admission pipeline initialized"
    );

    let shutdown = shutdown_signal().shared();

    let sweeper = config
        .rate_limiting
        .sweep_interval()
        .map(|interval| spawn_sweeper(store.clone(), clock.clone(), interval, shutdown.clone()));

    let server = HttpServer::new(config.server.bind_addr, Arc::new(pipeline));
    server.serve_with_shutdown(shutdown).await?;

    if let Some(sweeper) = sweeper {
        sweeper.await?;
    }

    info!("Turnstile admission gate stopped");
    Ok(())
}

fn init_tracing(config: &TurnstileConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match config.logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
