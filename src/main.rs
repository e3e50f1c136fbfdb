use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use txgate::config::loader::{build_policy_cache, load_config};
use txgate::config::watcher::watch_policy_file;
use txgate::redis::{create_redis_pool, get_pool_stats, RedisStore};
use txgate::{
    metrics, metrics_server, ScriptedGatekeeper, ServerConfig, SimulatedProcessor, StateStore,
    TransactionService, start_server,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "txgate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Transaction gateway starting...");

    let config = load_config().await?;
    let server_config = ServerConfig::from_env();
    tracing::info!("Server will listen on: {}", server_config.addr());

    // One store handle for the whole process, shared by reference
    let pool = create_redis_pool(&config.redis).await?;
    let stats = get_pool_stats(&pool);
    tracing::info!(
        "Redis pool ready (size: {}, available: {}, max: {})",
        stats.size,
        stats.available,
        stats.max_size
    );
    let store: Arc<dyn StateStore> = Arc::new(RedisStore::new(pool).await?);

    let policy_cache = build_policy_cache(&config);
    metrics::update_policy_metrics(policy_cache.stats().override_count);
    let policies = Arc::new(ArcSwap::from_pointee(policy_cache));

    if let Some(path) = config.gateway.policy_file.clone() {
        let shared = Arc::clone(&policies);
        tokio::spawn(async move {
            if let Err(e) = watch_policy_file(path, shared).await {
                tracing::error!("Policy watcher failed: {}", e);
            }
        });
    }

    if config.gateway.metrics_port != 0 {
        let port = config.gateway.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = metrics_server::start_metrics_server(port).await {
                tracing::error!("Metrics server failed: {}", e);
            }
        });
    }

    let gatekeeper = Arc::new(ScriptedGatekeeper::new(Arc::clone(&store)));
    let service = TransactionService::new(
        gatekeeper,
        store,
        Arc::new(SimulatedProcessor::new()),
        policies,
    )
    .with_timeouts(config.redis.command_timeout(), config.gateway.processor_timeout());

    start_server(server_config, Arc::new(service)).await?;

    Ok(())
}
