use herald_common::config::AppConfig;
use herald_common::db;
use herald_common::redis_pool::create_redis_pool;
use herald_queue::{RealtimeBus, TaskQueue};
use herald_worker::consumer::DeliveryWorker;
use herald_worker::gateway::GatewayClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald_worker=info,herald_queue=info".into()),
        )
        .json()
        .init();

    tracing::info!("Herald delivery worker starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database
    let pool = db::create_pool(&config).await?;

    // Connect to Redis
    let redis = create_redis_pool(&config.redis_url).await?;

    let queue = TaskQueue::new(redis.clone(), &config);
    let bus = RealtimeBus::new(redis);
    let gateway = GatewayClient::new(&config);

    let worker = DeliveryWorker::new(pool, queue, bus, gateway);

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        result = worker.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Delivery worker exited with error");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("Herald delivery worker stopped.");
    Ok(())
}
