//! Downstream transaction processor.
//!
//! The gateway treats the processor as a black box: it is called at most once
//! per allowed request and its result string becomes the idempotency record.

use crate::errors::{GatewayError, Result};
use async_trait::async_trait;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

#[async_trait]
pub trait TransactionProcessor: Send + Sync {
    /// Execute the business transaction and return its result payload
    async fn execute(&self, identity: &str, token: &str) -> Result<String>;
}

/// Stand-in processor that mints `TXN_<unix-nanos>` identifiers
#[derive(Debug, Default, Clone)]
pub struct SimulatedProcessor;

impl SimulatedProcessor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransactionProcessor for SimulatedProcessor {
    async fn execute(&self, identity: &str, token: &str) -> Result<String> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| GatewayError::ProcessorFailure(format!("System clock error: {}", e)))?
            .as_nanos();

        let txn_id = format!("TXN_{}", nanos);
        debug!(identity, token, txn_id = %txn_id, "Simulated transaction executed");
        Ok(txn_id)
    }
}
