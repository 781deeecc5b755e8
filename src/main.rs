use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use tiercache::cache::freshness::FreshnessPolicy;
use tiercache::cache::hot::HotStore;
use tiercache::cache::orchestrator::Orchestrator;
use tiercache::cache::warm::WarmStore;
use tiercache::config::{Cli, Config};
use tiercache::server::api::{build_router, AppState};
use tiercache::store::blob::FsBlobStore;
use tiercache::store::warehouse::HttpColdStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "tiercache=debug,tower_http=debug"
    } else {
        "tiercache=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("tiercache v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let config = Config::load(&cli.config)?;
    let config = Arc::new(config);

    info!(
        warehouse = config.warehouse.endpoint,
        warm_bucket = %config.warm.bucket_path.display(),
        hot_entries = config.hot.max_entries,
        hot_bytes = config.hot.max_bytes,
        default_staleness_secs = config.freshness.default_max_staleness_secs,
        "Configuration loaded"
    );

    // Wire the tiers.
    let blob = Arc::new(FsBlobStore::new(config.warm.bucket_path.clone()).await?);
    let warm = WarmStore::new(blob, config.warm.zstd_level);
    let hot = HotStore::new(&config.hot);
    let cold = Arc::new(HttpColdStore::new(
        config.warehouse.endpoint.clone(),
        Duration::from_secs(config.warehouse.request_timeout_secs),
    )?);
    let policy = FreshnessPolicy::new(config.freshness.clone());

    let orchestrator = Orchestrator::new(hot, warm, cold, policy);

    // Build application state and router.
    let state = Arc::new(AppState {
        orchestrator,
        config: config.clone(),
        start_time: Instant::now(),
    });
    let app = build_router(state);

    // Start the server.
    let listen_addr = cli.listen;
    info!(addr = listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
