use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trackmix_api::{
    config::Config,
    db::{create_pool, create_redis_client, Cache, CacheWriterHandle},
    routes::{create_router, AppState},
    services::{
        providers::{HttpHistoryProvider, HttpSimilarityProvider, OfflineRecommender},
        OfflineStore, OnlineAssembler, Recommender, ServiceStats,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("failed to load configuration")?;
    let stats = Arc::new(ServiceStats::new());

    let offline = load_offline_store(&config, stats.clone()).await?;

    let (cache, cache_writer) = match &config.redis_url {
        Some(url) => {
            let client = create_redis_client(url).context("failed to create redis client")?;
            let (cache, handle) = Cache::new(client, config.cache_timeout());
            info!("Similar-items cache enabled");
            (Some(cache), Some(handle))
        }
        None => (None, None),
    };

    let history = HttpHistoryProvider::new(
        &config.history_url,
        config.connect_timeout(),
        config.upstream_timeout(),
    )
    .context("failed to build history client")?;

    let mut similarity = HttpSimilarityProvider::new(
        &config.features_url,
        config.connect_timeout(),
        config.upstream_timeout(),
    )
    .context("failed to build features client")?;
    if let Some(cache) = cache {
        similarity = similarity.with_cache(cache, config.similar_cache_ttl());
    }

    let online = OnlineAssembler::new(
        Arc::new(history),
        Arc::new(similarity),
        config.history_k,
        config.upstream_timeout(),
        stats.clone(),
    );
    let recommender = Recommender::new(offline, online, config.upstream_timeout(), stats.clone());

    let state = Arc::new(AppState::new(recommender, config.default_k));
    let app = create_router(state);

    let bind_addr = config.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {bind_addr}"))?;

    info!(%bind_addr, "listening");

    if let Err(error) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        warn!(error = %error, "server exited with error");
    }

    shutdown_cache(cache_writer).await;
    stats.log_summary();

    info!("Server shutdown complete");
    Ok(())
}

/// Loads offline recommendations from PostgreSQL when configured, files otherwise
async fn load_offline_store(
    config: &Config,
    stats: Arc<ServiceStats>,
) -> anyhow::Result<Arc<dyn OfflineRecommender>> {
    let store = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url)
                .await
                .context("failed to connect to database")?;
            OfflineStore::load_from_postgres(&pool, stats)
                .await
                .context("failed to load offline recommendations from database")?
        }
        None => OfflineStore::load_from_files(
            Path::new(&config.personal_recs_path),
            Path::new(&config.default_recs_path),
            stats,
        )?,
    };

    Ok(Arc::new(store))
}

async fn shutdown_cache(handle: Option<CacheWriterHandle>) {
    if let Some(handle) = handle {
        handle.shutdown().await;
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C) for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
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
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
