use arc_swap::ArcSwap;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::PolicyCache;
use crate::errors::{GatewayError, Result};
use crate::gatekeeper::{Decision, Gatekeeper};
use crate::metrics;
use crate::processor::TransactionProcessor;
use crate::store::{idempotency_key, StateStore};

/// Header carrying the caller's idempotency token
pub const IDEMPOTENCY_HEADER: &str = "x-idempotency-key";

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_PROCESSOR_TIMEOUT: Duration = Duration::from_secs(5);

/// What happened to a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// The processor ran and its result was stored
    Created(String),

    /// A stored result was returned without running the processor
    Replayed(String),

    /// Rejected by the identity's rate budget
    Throttled,
}

/// Drives one request through the gatekeeper, the processor and the result write.
///
/// Holds no mutable state of its own; every instance behind a load balancer
/// coordinates only through the store.
///
/// The result write happens after the gatekeeper returns `Allow`, outside its
/// atomic unit. Two concurrent requests carrying the same new token can
/// therefore both be allowed and both reach the processor. The record is
/// write-once: the first result stored wins and the later caller is answered
/// with it, so every caller of a token sees the same payload. If the processor succeeds but the write
/// fails, the caller gets a 500 and a retry runs the processor again.
pub struct TransactionService {
    gatekeeper: Arc<dyn Gatekeeper>,
    store: Arc<dyn StateStore>,
    processor: Arc<dyn TransactionProcessor>,
    policies: Arc<ArcSwap<PolicyCache>>,
    store_timeout: Duration,
    processor_timeout: Duration,
}

impl TransactionService {
    pub fn new(
        gatekeeper: Arc<dyn Gatekeeper>,
        store: Arc<dyn StateStore>,
        processor: Arc<dyn TransactionProcessor>,
        policies: Arc<ArcSwap<PolicyCache>>,
    ) -> Self {
        Self {
            gatekeeper,
            store,
            processor,
            policies,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            processor_timeout: DEFAULT_PROCESSOR_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, store_timeout: Duration, processor_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self.processor_timeout = processor_timeout;
        self
    }

    /// Run the gatekeeper protocol for one inbound call
    pub async fn submit(&self, identity: Option<&str>, token: Option<&str>) -> Result<TransactionOutcome> {
        let identity = required(identity, "user_id")?;
        let token = required(token, "X-Idempotency-Key header")?;

        let policies = self.policies.load_full();
        let policy = policies.policy_for(identity);

        let decision = timeout(
            self.store_timeout,
            self.gatekeeper
                .evaluate(identity, token, policy.limit, policy.window()),
        )
        .await
        .map_err(|_| {
            metrics::record_store_error("gatekeeper_timeout");
            GatewayError::StoreUnavailable(format!(
                "gatekeeper evaluation timed out after {:?}",
                self.store_timeout
            ))
        })??;

        match decision {
            Decision::Duplicate(payload) => Ok(TransactionOutcome::Replayed(payload)),
            Decision::RateLimited => Ok(TransactionOutcome::Throttled),
            Decision::Allow => {
                let payload = self.execute(identity, token).await?;
                match self
                    .store_result(token, &payload, policies.idempotency_ttl())
                    .await?
                {
                    None => {
                        info!(txn_id = %payload, identity, "Created transaction");
                        Ok(TransactionOutcome::Created(payload))
                    }
                    Some(recorded) => {
                        warn!(
                            token,
                            txn_id = %payload,
                            recorded_txn_id = %recorded,
                            "Concurrent request already recorded a result for this token"
                        );
                        Ok(TransactionOutcome::Replayed(recorded))
                    }
                }
            }
        }
    }

    async fn execute(&self, identity: &str, token: &str) -> Result<String> {
        match timeout(self.processor_timeout, self.processor.execute(identity, token)).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(e)) => {
                metrics::record_processor_failure("error");
                // No record is written, so the token stays usable for a retry
                Err(match e {
                    GatewayError::ProcessorFailure(_) => e,
                    other => GatewayError::ProcessorFailure(other.to_string()),
                })
            }
            Err(_) => {
                metrics::record_processor_failure("timeout");
                Err(GatewayError::ProcessorFailure(format!(
                    "processor timed out after {:?}",
                    self.processor_timeout
                )))
            }
        }
    }

    /// Record the result unless one is already on record for the token.
    /// Returns the earlier result when this write lost.
    async fn store_result(&self, token: &str, payload: &str, ttl: Duration) -> Result<Option<String>> {
        let key = idempotency_key(token);
        let written = timeout(
            self.store_timeout,
            self.store.set_if_absent_with_ttl(&key, payload, ttl),
        )
        .await;

        let err = match written {
            Ok(Ok(existing)) => {
                if existing.is_none() {
                    debug!(token, ttl_secs = ttl.as_secs(), "Stored transaction result");
                }
                return Ok(existing);
            }
            Ok(Err(e)) => {
                metrics::record_result_write_failure("error");
                e
            }
            Err(_) => {
                metrics::record_result_write_failure("timeout");
                GatewayError::StoreUnavailable(format!(
                    "result write timed out after {:?}",
                    self.store_timeout
                ))
            }
        };

        error!(
            token,
            txn_id = %payload,
            error = %err,
            "Transaction executed but its result was not stored; a retry will execute it again"
        );
        Err(match err {
            GatewayError::StoreUnavailable(_) => err,
            other => GatewayError::StoreUnavailable(other.to_string()),
        })
    }

    /// Check that the store answers within the store timeout
    pub async fn health_check(&self) -> Result<()> {
        timeout(self.store_timeout, self.store.health_check())
            .await
            .map_err(|_| GatewayError::StoreUnavailable("health check timed out".to_string()))?
    }
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(GatewayError::InvalidRequest(format!("Missing {}", name))),
    }
}

impl IntoResponse for TransactionOutcome {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            TransactionOutcome::Created(txn_id) => (
                StatusCode::CREATED,
                json!({ "message": "OK", "transaction_id": txn_id }),
            ),
            TransactionOutcome::Replayed(payload) => (StatusCode::OK, json!({ "message": payload })),
            TransactionOutcome::Throttled => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({ "message": "Rate limit exceeded" }),
            ),
        };

        metrics::record_response(status.as_u16());
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    pub user_id: Option<String>,
}

/// `POST /v1/transaction?user_id=<identity>`
pub async fn create_transaction(
    State(service): State<Arc<TransactionService>>,
    Query(query): Query<TransactionQuery>,
    headers: HeaderMap,
) -> Result<TransactionOutcome> {
    let token = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok());

    debug!(user_id = ?query.user_id, token = ?token, "Received transaction request");

    service.submit(query.user_id.as_deref(), token).await
}

/// `GET /healthz`
pub async fn health(State(service): State<Arc<TransactionService>>) -> Response {
    match service.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
                .into_response()
        }
    }
}
