pub mod client;
pub mod pool;
pub mod script;

pub use client::{decode_gate_reply, RedisStore};
pub use pool::{create_redis_pool, get_pool_stats, PoolStats};
