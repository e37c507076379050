//! Order service entry point.

use std::sync::Arc;

use api::{AppState, Config, LogFormat};
use cache::{CacheGateway, DisabledCache, RedisCache};
use order_store::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let json = config.log_format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

async fn open_store(config: &Config) -> Result<Arc<dyn OrderStore>, BoxError> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresOrderStore::connect(url, config.database_max_connections).await?;
            store.run_migrations().await?;
            tracing::info!("connected to postgres order store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orders are kept in memory");
            Ok(Arc::new(InMemoryOrderStore::new()))
        }
    }
}

async fn open_cache(config: &Config) -> Arc<dyn CacheGateway> {
    let Some(url) = &config.redis_url else {
        tracing::warn!("REDIS_URL not set, caching disabled");
        return Arc::new(DisabledCache);
    };

    match RedisCache::connect(url, None).await {
        Ok(cache) => {
            tracing::info!("connected to redis cache");
            Arc::new(cache)
        }
        Err(err) => {
            tracing::warn!(error = %err, "redis unavailable, caching disabled");
            Arc::new(DisabledCache)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // 1. Configuration and tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Store, cache and remote clients
    let store = open_store(&config).await?;
    let cache = open_cache(&config).await;
    let state = AppState::from_config(&config, store, cache)?;

    // 4. Build the application
    let app = api::create_app(state, Some(metrics_handle));

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting order service");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}
