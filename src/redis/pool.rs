use crate::config::RedisConfig;
use crate::errors::{GatewayError, Result};
use deadpool::managed::{PoolConfig as DeadpoolPoolConfig, Timeouts};
use deadpool_redis::{Config as DeadpoolRedisConfig, Pool, Runtime};
use std::time::Duration;
use tracing::{debug, info};

/// Create a Redis connection pool from configuration
pub async fn create_redis_pool(config: &RedisConfig) -> Result<Pool> {
    info!("Creating Redis connection pool...");

    // Build deadpool-redis config from URL
    let mut cfg = DeadpoolRedisConfig::from_url(config.url.clone());

    // One connection per in-flight gatekeeper call: size for peak fan-in.
    let connect_timeout = Duration::from_secs(config.connection_timeout_secs);
    let mut timeouts = Timeouts::default();
    timeouts.wait = Some(connect_timeout);
    timeouts.create = Some(connect_timeout);
    timeouts.recycle = Some(connect_timeout);

    let mut pool_cfg = DeadpoolPoolConfig::new(config.max_connections);
    pool_cfg.timeouts = timeouts;
    cfg.pool = Some(pool_cfg);

    let pool = cfg
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| GatewayError::StoreUnavailable(format!("Pool creation failed: {}", e)))?;

    info!(
        "Redis connection pool created (max_connections: {})",
        config.max_connections
    );

    debug!("Testing Redis connection...");
    let mut conn = pool
        .get()
        .await
        .map_err(|e| GatewayError::StoreUnavailable(format!("Failed to get connection: {}", e)))?;

    let _pong: String = redis::cmd("PING")
        .query_async(&mut *conn)
        .await
        .map_err(GatewayError::RedisError)?;

    info!("Redis connection test successful");

    Ok(pool)
}

/// Get pool statistics
pub fn get_pool_stats(pool: &Pool) -> PoolStats {
    let status = pool.status();
    PoolStats {
        size: status.size,
        available: status.available,
        max_size: status.max_size,
    }
}

#[derive(Debug, Clone)]
pub struct PoolStats {
    pub size: usize,
    pub available: usize,
    pub max_size: usize,
}
