use crate::errors::{GatewayError, Result};
use crate::metrics;
use crate::redis::script::{gatekeeper_script, incr_with_ttl_script, load_script, set_if_absent_script};
use crate::store::{ttl_millis, GateOutcome, StateStore};
use async_trait::async_trait;
use deadpool_redis::{Connection, Pool};
use redis::{AsyncCommands, RedisError, Script, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Redis-backed state store
pub struct RedisStore {
    pool: Arc<Pool>,
    gatekeeper: Script,
    incr_with_ttl: Script,
    set_if_absent: Script,
}

impl RedisStore {
    /// Create a new store, registering its scripts with Redis
    pub async fn new(pool: Pool) -> Result<Self> {
        let pool = Arc::new(pool);
        let gatekeeper = gatekeeper_script();
        let incr_with_ttl = incr_with_ttl_script();
        let set_if_absent = set_if_absent_script();

        let mut conn = pool.get().await.map_err(|e| {
            GatewayError::StoreUnavailable(format!("Failed to get connection for script loading: {}", e))
        })?;
        load_script(&mut *conn, "gatekeeper", &gatekeeper).await?;
        load_script(&mut *conn, "incr_with_ttl", &incr_with_ttl).await?;
        load_script(&mut *conn, "set_if_absent", &set_if_absent).await?;

        Ok(Self {
            pool,
            gatekeeper,
            incr_with_ttl,
            set_if_absent,
        })
    }

    async fn connection(&self, op: &'static str) -> Result<Connection> {
        self.pool.get().await.map_err(|e| {
            error!("Failed to get Redis connection for {}: {}", op, e);
            metrics::record_store_error(op);
            GatewayError::StoreUnavailable(format!("Redis pool exhausted: {}", e))
        })
    }
}

/// Classify a driver error: transport problems are store outages,
/// everything else is a script/command failure.
fn classify(op: &'static str, e: RedisError) -> GatewayError {
    metrics::record_store_error(op);
    if e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal() {
        GatewayError::StoreUnavailable(format!("{} failed: {}", op, e))
    } else {
        GatewayError::ScriptError(format!("{} failed: {}", op, e))
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection("get").await?;

        let value: Option<String> = conn.get(key).await.map_err(|e| classify("get", e))?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection("set").await?;
        let started = Instant::now();

        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut *conn)
            .await
            .map_err(|e| classify("set", e))?;

        metrics::record_store_duration("set", started.elapsed().as_secs_f64());
        Ok(())
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<Option<String>> {
        let mut conn = self.connection("set_if_absent").await?;
        let started = Instant::now();

        let existing: Option<String> = self
            .set_if_absent
            .key(key)
            .arg(value)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut *conn)
            .await
            .map_err(|e| classify("set_if_absent", e))?;

        metrics::record_store_duration("set_if_absent", started.elapsed().as_secs_f64());
        Ok(existing)
    }

    async fn increment_with_ttl_on_first_write(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut conn = self.connection("incr").await?;

        let count: i64 = self
            .incr_with_ttl
            .key(key)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut *conn)
            .await
            .map_err(|e| classify("incr", e))?;

        Ok(count)
    }

    async fn run_gatekeeper(
        &self,
        limit_key: &str,
        idempotency_key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<GateOutcome> {
        let mut conn = self.connection("gatekeeper").await?;
        let started = Instant::now();

        debug!(
            "Executing gatekeeper script: limit_key={}, idempotency_key={}, limit={}, window_ms={}",
            limit_key,
            idempotency_key,
            limit,
            ttl_millis(window)
        );

        // EVALSHA, falling back to EVAL if the script cache was flushed
        let reply: Vec<Value> = self
            .gatekeeper
            .key(limit_key)
            .key(idempotency_key)
            .arg(limit)
            .arg(ttl_millis(window))
            .invoke_async(&mut *conn)
            .await
            .map_err(|e| {
                error!("Gatekeeper script execution failed: {}", e);
                metrics::record_script_execution(false);
                classify("gatekeeper", e)
            })?;

        metrics::record_store_duration("gatekeeper", started.elapsed().as_secs_f64());

        let outcome = decode_gate_reply(&reply).map_err(|e| {
            metrics::record_script_execution(false);
            e
        })?;
        metrics::record_script_execution(true);
        debug!("Gatekeeper script result: {:?}", outcome);

        Ok(outcome)
    }

    async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection("ping").await?;

        let response: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| classify("ping", e))?;

        if response != "PONG" {
            return Err(GatewayError::StoreUnavailable(format!(
                "Unexpected PING response: {}",
                response
            )));
        }

        Ok(())
    }
}

/// Decode the gatekeeper script reply: `[tag, value]`.
pub fn decode_gate_reply(reply: &[Value]) -> Result<GateOutcome> {
    if reply.len() != 2 {
        return Err(GatewayError::ScriptError(format!(
            "Invalid gatekeeper reply length: {}",
            reply.len()
        )));
    }

    let tag = value_as_string(&reply[0], "tag")?;
    match tag.as_str() {
        "duplicate" => Ok(GateOutcome::Duplicate {
            payload: value_as_string(&reply[1], "payload")?,
        }),
        "allow" => Ok(GateOutcome::Allowed {
            count: value_as_int(&reply[1], "count")?,
        }),
        "limited" => Ok(GateOutcome::Limited {
            count: value_as_int(&reply[1], "count")?,
        }),
        other => Err(GatewayError::ScriptError(format!(
            "Unknown gatekeeper reply tag: {}",
            other
        ))),
    }
}

fn value_as_string(value: &Value, field: &str) -> Result<String> {
    match value {
        Value::BulkString(bytes) => String::from_utf8(bytes.clone())
            .map_err(|e| GatewayError::ScriptError(format!("Invalid UTF-8 in {}: {}", field, e))),
        Value::SimpleString(s) => Ok(s.clone()),
        other => Err(GatewayError::ScriptError(format!(
            "Invalid {} value type: {:?}",
            field, other
        ))),
    }
}

fn value_as_int(value: &Value, field: &str) -> Result<i64> {
    match value {
        Value::Int(v) => Ok(*v),
        other => Err(GatewayError::ScriptError(format!(
            "Invalid {} value type: {:?}",
            field, other
        ))),
    }
}
