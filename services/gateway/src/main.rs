mod backend;
mod config;
mod error;
mod handlers;
mod router;
mod state;

use backend::HttpTimeSeries;
use config::GatewayConfig;
use market_data::bus::{LocalBus, MessageBus};
use market_data::history::HistoryStore;
use market_data::query::HistoryService;
use market_data::registry::ClientRegistry;
use market_data::relay::LiveRelay;
use market_data::timeseries::{InMemoryTimeSeries, TimeSeriesBackend};
use router::create_router;
use state::AppState;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::from_env();
    tracing::info!(
        version = market_data::SERVICE_VERSION,
        upstream_topic = %config.upstream_topic,
        "Starting market data gateway"
    );

    let backend: Arc<dyn TimeSeriesBackend> = match &config.timeseries_url {
        Some(url) => {
            tracing::info!(url = %url, "Using HTTP time-series backend");
            Arc::new(HttpTimeSeries::new(url.clone(), config.backend_retries))
        }
        None => {
            tracing::warn!("TIMESERIES_URL not set, history is served from an empty in-memory store");
            Arc::new(InMemoryTimeSeries::new())
        }
    };

    let bus: Arc<dyn MessageBus> = Arc::new(LocalBus::new(config.bus_capacity));
    let store = Arc::new(HistoryStore::new(config.history_capacity));
    let registry = Arc::new(ClientRegistry::new(config.ws_config()));
    let history = Arc::new(HistoryService::new(backend, config.history_config()));

    // Live relay: upstream topic -> history store -> every client
    let upstream = bus.subscribe(&config.upstream_topic).await?;
    let relay = LiveRelay::new(store, registry.clone());
    let relay_task = tokio::spawn(relay.run(upstream));

    let app = create_router(AppState::new(history, registry.clone(), bus.clone()));

    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("Listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    bus.unsubscribe(&config.upstream_topic).await?;
    let relay = relay_task.await?;
    tracing::info!(
        messages_relayed = relay.messages_relayed(),
        keys = relay.store().key_count(),
        clients = registry.client_count(),
        "Gateway stopped"
    );

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
