pub mod memory;

use crate::errors::Result;
use async_trait::async_trait;
use std::time::Duration;

pub use memory::MemoryStore;

/// Prefix of rate counter keys
pub const RATE_LIMIT_PREFIX: &str = "lim:";

/// Prefix of idempotency record keys
pub const IDEMPOTENCY_PREFIX: &str = "idem:";

/// Store key of the rate counter for an identity
pub fn rate_limit_key(identity: &str) -> String {
    format!("{}{}", RATE_LIMIT_PREFIX, identity)
}

/// Store key of the idempotency record for a token
pub fn idempotency_key(token: &str) -> String {
    format!("{}{}", IDEMPOTENCY_PREFIX, token)
}

/// Reply of the atomic check-cache-then-rate-limit unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Record absent, counter incremented and still within the limit
    Allowed { count: i64 },

    /// Record present; the counter was not touched
    Duplicate { payload: String },

    /// Record absent, counter incremented past the limit
    Limited { count: i64 },
}

// Shared state store, seen by every gateway instance
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a string value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a string value that expires after `ttl`
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Write a value that expires after `ttl` only if no live value exists.
    /// Returns the value already present when the write was skipped.
    async fn set_if_absent_with_ttl(&self, key: &str, value: &str, ttl: Duration)
        -> Result<Option<String>>;

    /// Increment a counter, setting `ttl` only when the increment creates it
    async fn increment_with_ttl_on_first_write(&self, key: &str, ttl: Duration) -> Result<i64>;

    /// Run the gatekeeper sequence as one indivisible unit:
    /// read `idempotency_key`, and only if absent increment `limit_key`
    /// (expiring it after `window` on creation) and compare against `limit`.
    async fn run_gatekeeper(
        &self,
        limit_key: &str,
        idempotency_key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<GateOutcome>;

    /// Check if the store is reachable
    async fn health_check(&self) -> Result<()>;
}

/// Convert a TTL to whole milliseconds, never below one.
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}
