//! Upstream guard daemon.
//!
//! Runs the resilience layer's background machinery (window rotation,
//! health probe cycle, maintenance sweep) and serves the read-only
//! operational endpoints. Chat traffic itself flows through the library
//! API from the embedding application.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;

use upstream_guard::config::loader::load_config;
use upstream_guard::health::aggregator::http_probe;
use upstream_guard::lifecycle::signals::spawn_signal_handler;
use upstream_guard::observability::{logging, metrics};
use upstream_guard::{
    BreakerRegistry, GuardConfig, HealthAggregator, OpsServer, RetryBudget, Shutdown,
    TieredRateLimiter,
};

#[derive(Parser)]
#[command(name = "upstream-guard", about = "Resilience layer for upstream AI services")]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration before logging so a bad file fails fast with a
    // plain error on stderr.
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!("upstream-guard v0.1.0 starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        dependencies = config.dependencies.len(),
        rate_limit_enabled = config.rate_limit.enabled,
        "Configuration loaded"
    );

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_handler(shutdown.clone());

    // Breakers and their rotation tasks.
    let registry = Arc::new(BreakerRegistry::from_config(&config, None));
    let rotation_tasks = registry.spawn_rotation_tasks(&shutdown);
    tracing::info!(breakers = rotation_tasks.len(), "Breaker registry ready");

    // Admission layer. The limiter is served to the embedding application
    // through the library API; the daemon only runs its maintenance.
    let limiter = Arc::new(TieredRateLimiter::new(&config.rate_limit));
    let budget = Arc::new(RetryBudget::new(
        config.retries.budget_ratio,
        config.retries.budget_min_retries,
    ));
    spawn_maintenance(limiter.clone(), budget.clone(), shutdown.clone());

    // Health probe cycle.
    let probe_client: Client<HttpConnector, axum::body::Body> =
        Client::builder(TokioExecutor::new()).build(HttpConnector::new());
    let mut aggregator = HealthAggregator::new(registry.clone(), &config.health);
    for dependency in &config.dependencies {
        let url = format!(
            "{}{}",
            dependency.base_url.trim_end_matches('/'),
            dependency.health_path
        );
        aggregator.register_probe(&dependency.name, http_probe(probe_client.clone(), url));
    }
    let aggregator = Arc::new(aggregator);
    if config.health.enabled {
        tokio::spawn(aggregator.clone().run(shutdown.subscribe()));
    }

    // Ops endpoint, serving until shutdown.
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = OpsServer::new(&config.listener, registry, aggregator);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Periodic housekeeping: drop dead rate-limit windows and decay the
/// retry budget toward recent traffic.
fn spawn_maintenance(
    limiter: Arc<TieredRateLimiter>,
    budget: Arc<RetryBudget>,
    shutdown: Arc<Shutdown>,
) -> tokio::task::JoinHandle<()> {
    let mut receiver = shutdown.subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    limiter.purge_expired();
                    budget.decay();
                }
                _ = receiver.recv() => break,
            }
        }
    })
}
