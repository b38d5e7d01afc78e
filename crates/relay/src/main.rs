//! Herald realtime relay binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use herald_common::config::AppConfig;
use herald_queue::EventSubscriber;
use herald_relay::registry::ConnectionRegistry;
use herald_relay::{run_subscriber, ws};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("herald_relay=debug,tower_http=debug")),
        )
        .init();

    tracing::info!("Starting Herald realtime relay...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // The registry lives for the whole process; the subscriber loop and
    // every connection handler share it.
    let registry = Arc::new(ConnectionRegistry::new());

    // One bus subscription per relay instance.
    let subscriber = EventSubscriber::connect(&config.redis_url).await?;
    let subscriber_task = tokio::spawn(run_subscriber(registry.clone(), subscriber));

    // Build router
    let app = ws::router()
        .with_state(registry)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.relay_port));
    tracing::info!("Relay listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    subscriber_task.abort();
    tracing::info!("Herald realtime relay stopped.");
    Ok(())
}
