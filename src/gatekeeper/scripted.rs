use crate::errors::{GatewayError, Result};
use crate::gatekeeper::{Decision, Gatekeeper};
use crate::metrics;
use crate::store::{idempotency_key, rate_limit_key, GateOutcome, StateStore};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Gatekeeper that delegates the whole decision to the store's atomic unit
pub struct ScriptedGatekeeper<S: StateStore + ?Sized> {
    store: Arc<S>,
}

impl<S: StateStore + ?Sized> ScriptedGatekeeper<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

fn validate_inputs(identity: &str, token: &str, limit: u64, window: Duration) -> Result<()> {
    if identity.is_empty() {
        return Err(GatewayError::InvalidRequest("identity must not be empty".to_string()));
    }
    if token.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "idempotency token must not be empty".to_string(),
        ));
    }
    if limit == 0 {
        return Err(GatewayError::InvalidRequest("limit must be positive".to_string()));
    }
    if window.is_zero() {
        return Err(GatewayError::InvalidRequest("window must be positive".to_string()));
    }
    Ok(())
}

#[async_trait]
impl<S: StateStore + ?Sized + 'static> Gatekeeper for ScriptedGatekeeper<S> {
    async fn evaluate(
        &self,
        identity: &str,
        token: &str,
        limit: u64,
        window: Duration,
    ) -> Result<Decision> {
        validate_inputs(identity, token, limit, window)?;

        let limit_key = rate_limit_key(identity);
        let idem_key = idempotency_key(token);
        let started = Instant::now();

        debug!(
            "Evaluating gatekeeper: identity={}, token={}, limit={}, window={:?}",
            identity, token, limit, window
        );

        let outcome = self
            .store
            .run_gatekeeper(&limit_key, &idem_key, limit, window)
            .await?;

        let decision = match outcome {
            GateOutcome::Allowed { count } => {
                debug!(identity, count, limit, "Gatekeeper allowed request");
                Decision::Allow
            }
            GateOutcome::Duplicate { payload } => {
                info!(token, "Idempotency hit: returning cached result");
                Decision::Duplicate(payload)
            }
            GateOutcome::Limited { count } => {
                warn!(identity, count, limit, "Rate limit exceeded");
                Decision::RateLimited
            }
        };

        metrics::record_decision(decision.as_str(), started.elapsed().as_secs_f64());
        Ok(decision)
    }
}
