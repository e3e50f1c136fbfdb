use crate::config::{AppConfig, GatePolicy, GatewayConfig, PolicyConfig, RedisConfig};
use crate::errors::{GatewayError, Result};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Longest accepted rate window or record lifetime (one year)
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Validate the entire application configuration
pub fn validate_config(config: &AppConfig) -> Result<()> {
    debug!("Validating configuration...");

    validate_redis_config(&config.redis)?;
    validate_gateway_config(&config.gateway)?;
    validate_policy_config(&config.policy)?;

    debug!("Configuration validation successful");
    Ok(())
}

/// Validate Redis configuration
fn validate_redis_config(config: &RedisConfig) -> Result<()> {
    if config.url.is_empty() {
        return Err(GatewayError::ConfigurationError(
            "Redis URL cannot be empty".to_string(),
        ));
    }

    if !config.url.starts_with("redis://") && !config.url.starts_with("rediss://") {
        return Err(GatewayError::ConfigurationError(format!(
            "Invalid Redis URL format: {}. Must start with redis:// or rediss://",
            crate::config::loader::mask_password(&config.url)
        )));
    }

    if config.max_connections == 0 {
        return Err(GatewayError::ConfigurationError(
            "max_connections must be greater than 0".to_string(),
        ));
    }

    if config.max_connections > 1000 {
        warn!(
            "max_connections is very high ({}). This may consume excessive resources.",
            config.max_connections
        );
    }

    if config.connection_timeout_secs == 0 {
        return Err(GatewayError::ConfigurationError(
            "connection_timeout_secs must be greater than 0".to_string(),
        ));
    }

    if config.command_timeout_secs == 0 {
        return Err(GatewayError::ConfigurationError(
            "command_timeout_secs must be greater than 0".to_string(),
        ));
    }

    debug!("Redis configuration valid");
    Ok(())
}

fn validate_gateway_config(config: &GatewayConfig) -> Result<()> {
    if config.processor_timeout_ms == 0 {
        return Err(GatewayError::ConfigurationError(
            "processor_timeout_ms must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// Validate admission policy
pub fn validate_policy_config(config: &PolicyConfig) -> Result<()> {
    validate_gate_policy(&config.default, "default")?;

    if config.idempotency_ttl_secs == 0 {
        return Err(GatewayError::ConfigurationError(
            "idempotency_ttl_secs must be greater than 0".to_string(),
        ));
    }

    if config.idempotency_ttl_secs > MAX_TTL_SECS {
        return Err(GatewayError::ConfigurationError(format!(
            "idempotency_ttl_secs ({}) exceeds the maximum of {}s",
            config.idempotency_ttl_secs, MAX_TTL_SECS
        )));
    }

    let mut seen = HashSet::new();
    for (idx, entry) in config.overrides.iter().enumerate() {
        if entry.identity.is_empty() {
            return Err(GatewayError::ConfigurationError(format!(
                "Override {} has an empty identity",
                idx
            )));
        }
        if !seen.insert(entry.identity.as_str()) {
            return Err(GatewayError::ConfigurationError(format!(
                "Identity '{}' is overridden more than once",
                entry.identity
            )));
        }

        let policy = GatePolicy {
            limit: entry.limit,
            window_secs: entry.window_secs,
        };
        validate_gate_policy(&policy, &entry.identity)?;

        if entry.window_secs > config.idempotency_ttl_secs {
            warn!(
                "Rate window for '{}' ({}s) outlives idempotency records ({}s)",
                entry.identity, entry.window_secs, config.idempotency_ttl_secs
            );
        }
    }

    if config.default.window_secs > config.idempotency_ttl_secs {
        warn!(
            "Default rate window ({}s) outlives idempotency records ({}s)",
            config.default.window_secs, config.idempotency_ttl_secs
        );
    }

    debug!("Policy configuration valid ({} overrides)", config.overrides.len());
    Ok(())
}

/// Validate an individual rate budget
fn validate_gate_policy(policy: &GatePolicy, owner: &str) -> Result<()> {
    if policy.limit == 0 {
        return Err(GatewayError::ConfigurationError(format!(
            "limit must be positive for '{}'",
            owner
        )));
    }

    if policy.window_secs == 0 {
        return Err(GatewayError::ConfigurationError(format!(
            "window_secs must be positive for '{}'",
            owner
        )));
    }

    if policy.window_secs > MAX_TTL_SECS {
        return Err(GatewayError::ConfigurationError(format!(
            "window_secs ({}) exceeds the maximum of {}s for '{}'",
            policy.window_secs, MAX_TTL_SECS, owner
        )));
    }

    if policy.limit > 1_000_000_000 {
        warn!("Very high limit ({}) for '{}'", policy.limit, owner);
    }

    Ok(())
}
