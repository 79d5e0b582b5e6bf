use anyhow::Context;
use common_observability::StockMetrics;
use std::sync::Arc;
use stock_service::app::{build_router, cors_layer};
use stock_service::config::{ServiceConfig, StoreBackend};
use stock_service::store::{MemoryStockStore, PgStockStore, StockStore};
use stock_service::{AppState, StockController};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServiceConfig::from_env()?;

    let store: Arc<dyn StockStore> = match &config.backend {
        StoreBackend::Postgres { database_url, max_connections, run_migrations } => {
            let store = PgStockStore::connect(database_url, *max_connections, config.lock_timeout)
                .await
                .context("failed to connect to inventory database")?;
            if *run_migrations {
                store.migrate().await.context("failed to run inventory migrations")?;
            }
            Arc::new(store)
        }
        StoreBackend::Memory { seed } => {
            warn!(products = seed.len(), "using in-memory inventory store; stock is lost on restart");
            Arc::new(MemoryStockStore::with_stock(config.lock_timeout, seed.iter().copied()).await)
        }
    };

    let metrics = Arc::new(StockMetrics::new());
    let controller = StockController::new(store, metrics).with_max_attempts(config.max_attempts);
    let state = AppState::new(controller);

    let app = build_router(state).layer(cors_layer(&config.allowed_origins));

    info!(
        addr = %config.addr,
        lock_timeout_ms = config.lock_timeout.as_millis() as u64,
        max_attempts = config.max_attempts,
        "starting stock-service"
    );
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
