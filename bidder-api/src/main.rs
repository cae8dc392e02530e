use anyhow::Context;
use bidder_api::{app, AppState};
use bidder_core::{CampaignSource, SnapshotCache};
use bidder_search::{BidService, Executor, Matcher};
use bidder_store::RedisCampaignStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "bidder_api=debug,bidder_search=info,bidder_core=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = bidder_store::app_config::Config::load().context("Failed to load config")?;
    tracing::info!("Starting bidder on port {}", config.server.port);

    // Redis Connection
    let store = RedisCampaignStore::connect(
        &config.redis.url,
        &config.redis.hash,
        config.redis.connect_timeout(),
    )
    .await
    .context("Failed to connect to Redis")?;
    let source: Arc<dyn CampaignSource> = Arc::new(store);

    // Snapshot cache, warmed up before accepting traffic
    let shutdown = CancellationToken::new();
    let (cache, refresher) =
        SnapshotCache::spawn(source.clone(), config.cache.cache_config(), shutdown.child_token());
    let snapshot = cache.ready().await.context("Initial campaign load failed")?;
    tracing::info!(
        campaigns = snapshot.len(),
        version = snapshot.version(),
        "Campaign snapshot ready"
    );

    let executor = match config.search.workers {
        Some(workers) => Executor::new(workers),
        None => Executor::with_available_parallelism(),
    };
    tracing::info!("Membership search uses {} workers", executor.workers());

    let bids = BidService::new(
        cache,
        source,
        Matcher::new(executor),
        config.search.stream_prefetch,
        shutdown.clone(),
    );
    let app = app(AppState::new(bids));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Err(e) = refresher.await {
        tracing::warn!(error = %e, "Snapshot refresher did not stop cleanly");
    }
    tracing::info!("Bidder stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
