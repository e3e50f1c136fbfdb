use crate::errors::{GatewayError, Result};
use redis::aio::ConnectionLike;
use redis::Script;
use tracing::{debug, info};

const GATEKEEPER_SOURCE: &str = include_str!("../../scripts/gatekeeper.lua");
const INCR_WITH_TTL_SOURCE: &str = include_str!("../../scripts/incr_with_ttl.lua");
const SET_IF_ABSENT_SOURCE: &str = include_str!("../../scripts/set_if_absent.lua");

/// Check-cache-then-rate-limit script
pub fn gatekeeper_script() -> Script {
    Script::new(GATEKEEPER_SOURCE)
}

/// Increment-with-expiry-on-first-write script
pub fn incr_with_ttl_script() -> Script {
    Script::new(INCR_WITH_TTL_SOURCE)
}

/// Write-once record script
pub fn set_if_absent_script() -> Script {
    Script::new(SET_IF_ABSENT_SOURCE)
}

/// Register a Lua script with Redis so later calls can go through EVALSHA
pub async fn load_script<C: ConnectionLike>(conn: &mut C, name: &str, script: &Script) -> Result<String> {
    debug!("Loading Lua script '{}' into Redis...", name);

    let sha = script
        .prepare_invoke()
        .load_async(conn)
        .await
        .map_err(|e| GatewayError::ScriptError(format!("Failed to load Lua script '{}': {}", name, e)))?;

    info!("Lua script '{}' loaded (SHA: {})", name, sha);
    Ok(sha)
}
