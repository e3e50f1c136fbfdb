pub mod loader;
pub mod validator;
pub mod watcher;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_RATE_LIMIT: u64 = 100;
pub const DEFAULT_WINDOW_SECS: u64 = 60;
pub const DEFAULT_IDEMPOTENCY_TTL_SECS: u64 = 24 * 60 * 60;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Redis configuration (environment only)
    pub redis: RedisConfig,

    /// Timeouts and auxiliary listeners (environment only)
    pub gateway: GatewayConfig,

    /// Admission policy (environment or policy file, file supports hot reload)
    pub policy: PolicyConfig,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Redis connection configuration (loaded from environment variables)
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., "redis://localhost:6379"); credentials go in the URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: usize,

    /// Pool wait/connect timeout in seconds
    pub connection_timeout_secs: u64,

    /// Upper bound for a single store operation in seconds
    pub command_timeout_secs: u64,
}

impl RedisConfig {
    /// Load Redis configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("REDIS_URL").unwrap_or(defaults.url),
            max_connections: env_or("REDIS_MAX_CONN", defaults.max_connections),
            connection_timeout_secs: env_or(
                "REDIS_CONNECT_TIMEOUT_SECS",
                defaults.connection_timeout_secs,
            ),
            command_timeout_secs: env_or("REDIS_COMMAND_TIMEOUT_SECS", defaults.command_timeout_secs),
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            max_connections: 100,
            connection_timeout_secs: 5,
            command_timeout_secs: 2,
        }
    }
}

/// Gateway runtime settings (loaded from environment variables)
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Upper bound for one downstream processor call in milliseconds
    pub processor_timeout_ms: u64,

    /// Port of the Prometheus listener; 0 disables it
    pub metrics_port: u16,

    /// Optional JSON policy file, watched for changes
    pub policy_file: Option<PathBuf>,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            processor_timeout_ms: env_or("PROCESSOR_TIMEOUT_MS", defaults.processor_timeout_ms),
            metrics_port: env_or("METRICS_PORT", defaults.metrics_port),
            policy_file: std::env::var("GATE_POLICY_FILE")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn processor_timeout(&self) -> Duration {
        Duration::from_millis(self.processor_timeout_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            processor_timeout_ms: 5000,
            metrics_port: 9090,
            policy_file: None,
        }
    }
}

/// Admission policy: rate budget per identity plus idempotency record lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Budget for identities without an override
    #[serde(default)]
    pub default: GatePolicy,

    /// Lifetime of stored transaction results
    #[serde(default = "default_idempotency_ttl_secs")]
    pub idempotency_ttl_secs: u64,

    /// Per-identity budgets
    #[serde(default)]
    pub overrides: Vec<IdentityOverride>,
}

impl PolicyConfig {
    /// Load the policy from environment variables (no overrides)
    pub fn from_env() -> Self {
        Self {
            default: GatePolicy {
                limit: env_or("RATE_LIMIT", DEFAULT_RATE_LIMIT),
                window_secs: env_or("RATE_WINDOW_SECS", DEFAULT_WINDOW_SECS),
            },
            idempotency_ttl_secs: env_or("IDEMPOTENCY_TTL_SECS", DEFAULT_IDEMPOTENCY_TTL_SECS),
            overrides: vec![],
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default: GatePolicy::default(),
            idempotency_ttl_secs: DEFAULT_IDEMPOTENCY_TTL_SECS,
            overrides: vec![],
        }
    }
}

fn default_idempotency_ttl_secs() -> u64 {
    DEFAULT_IDEMPOTENCY_TTL_SECS
}

/// Fixed-window rate budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatePolicy {
    /// Requests admitted per window
    pub limit: u64,

    /// Window length in seconds
    pub window_secs: u64,
}

impl GatePolicy {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            limit: DEFAULT_RATE_LIMIT,
            window_secs: DEFAULT_WINDOW_SECS,
        }
    }
}

/// Budget for one specific identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityOverride {
    pub identity: String,
    pub limit: u64,
    pub window_secs: u64,
}

/// Runtime policy cache with fast concurrent access
pub struct PolicyCache {
    /// Map from identity -> GatePolicy
    overrides: Arc<DashMap<String, GatePolicy>>,

    /// Policy for identities without an override
    default_policy: GatePolicy,

    idempotency_ttl: Duration,
}

impl PolicyCache {
    /// Create a new cache from policy configuration
    pub fn new(config: PolicyConfig) -> Self {
        let overrides = DashMap::new();

        for entry in &config.overrides {
            overrides.insert(
                entry.identity.clone(),
                GatePolicy {
                    limit: entry.limit,
                    window_secs: entry.window_secs,
                },
            );
        }

        Self {
            overrides: Arc::new(overrides),
            default_policy: config.default,
            idempotency_ttl: Duration::from_secs(config.idempotency_ttl_secs),
        }
    }

    /// Get the rate budget for an identity
    pub fn policy_for(&self, identity: &str) -> GatePolicy {
        self.overrides
            .get(identity)
            .map(|entry| *entry.value())
            .unwrap_or(self.default_policy)
    }

    /// Lifetime of stored transaction results
    pub fn idempotency_ttl(&self) -> Duration {
        self.idempotency_ttl
    }

    pub fn stats(&self) -> PolicyStats {
        PolicyStats {
            override_count: self.overrides.len(),
        }
    }
}

/// Statistics about the policy cache
#[derive(Debug, Clone)]
pub struct PolicyStats {
    pub override_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let policy = PolicyConfig::default();
        assert_eq!(policy.default.limit, 100);
        assert_eq!(policy.default.window(), Duration::from_secs(60));
        assert_eq!(policy.idempotency_ttl_secs, 86_400);
        assert_eq!(RedisConfig::default().max_connections, 100);
    }

    #[test]
    fn test_policy_cache_prefers_override() {
        let cache = PolicyCache::new(PolicyConfig {
            overrides: vec![IdentityOverride {
                identity: "vip".to_string(),
                limit: 1000,
                window_secs: 10,
            }],
            ..PolicyConfig::default()
        });

        assert_eq!(cache.policy_for("vip"), GatePolicy { limit: 1000, window_secs: 10 });
        assert_eq!(cache.policy_for("anyone"), GatePolicy::default());
        assert_eq!(cache.stats().override_count, 1);
        assert_eq!(cache.idempotency_ttl(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_policy_file_fields_are_optional() {
        let config: PolicyConfig = serde_json::from_str(r#"{"default": {"limit": 5, "window_secs": 1}}"#).unwrap();
        assert_eq!(config.default.limit, 5);
        assert_eq!(config.idempotency_ttl_secs, DEFAULT_IDEMPOTENCY_TTL_SECS);
        assert!(config.overrides.is_empty());
    }
}
