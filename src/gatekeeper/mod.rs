pub mod scripted;

use crate::errors::Result;
use async_trait::async_trait;
use std::time::Duration;

pub use scripted::ScriptedGatekeeper;

/// Result of one gatekeeper evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// New token within the identity's budget; the caller may run the transaction
    Allow,

    /// Token already has a stored result
    Duplicate(String),

    /// New token, but the identity exhausted its budget for the current window
    RateLimited,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Duplicate(_) => "duplicate",
            Decision::RateLimited => "rate_limited",
        }
    }
}

/// Atomic duplicate detection plus rate limiting.
///
/// Implementations must make the idempotency lookup, counter increment and
/// limit comparison indivisible with respect to every other evaluation that
/// touches the same keys, across all gateway instances.
#[async_trait]
pub trait Gatekeeper: Send + Sync {
    async fn evaluate(
        &self,
        identity: &str,
        token: &str,
        limit: u64,
        window: Duration,
    ) -> Result<Decision>;
}
