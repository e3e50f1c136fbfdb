//! In-process [`StateStore`].
//!
//! Every operation, including the gatekeeper unit, runs while holding one
//! mutex over the whole keyspace, so the mutex plays the part of Redis'
//! single-threaded script execution. Expiry is tracked with
//! `tokio::time::Instant` so tests can drive TTLs with a paused clock.
//! Only suitable for a single gateway instance and for tests.

use crate::errors::{GatewayError, Result};
use crate::store::{GateOutcome, StateStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Counter(i64),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .map(|entries| entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| GatewayError::InternalError("memory store lock poisoned".to_string()))
    }
}

fn live_entry<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a Entry> {
    let now = Instant::now();
    if entries.get(key).is_some_and(|e| !e.is_live(now)) {
        entries.remove(key);
    }
    entries.get(key)
}

fn get_text(entries: &mut HashMap<String, Entry>, key: &str) -> Option<String> {
    live_entry(entries, key).map(|entry| match &entry.value {
        Value::Text(s) => s.clone(),
        Value::Counter(n) => n.to_string(),
    })
}

fn incr(entries: &mut HashMap<String, Entry>, key: &str, ttl: Duration) -> Result<i64> {
    let current = match live_entry(entries, key).map(|e| e.value.clone()) {
        None => None,
        Some(Value::Counter(n)) => Some(n),
        Some(Value::Text(s)) => Some(s.parse::<i64>().map_err(|_| {
            GatewayError::StoreUnavailable(format!("value at '{}' is not an integer", key))
        })?),
    };

    match current {
        None => {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Counter(1),
                    expires_at: Some(Instant::now() + ttl),
                },
            );
            Ok(1)
        }
        Some(n) => {
            let next = n + 1;
            if let Some(entry) = entries.get_mut(key) {
                entry.value = Value::Counter(next);
            }
            Ok(next)
        }
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.lock()?;
        Ok(get_text(&mut entries, key))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.lock()?;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<Option<String>> {
        let mut entries = self.lock()?;
        if let Some(existing) = get_text(&mut entries, key) {
            return Ok(Some(existing));
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(None)
    }

    async fn increment_with_ttl_on_first_write(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut entries = self.lock()?;
        incr(&mut entries, key, ttl)
    }

    async fn run_gatekeeper(
        &self,
        limit_key: &str,
        idempotency_key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<GateOutcome> {
        let mut entries = self.lock()?;

        if let Some(payload) = get_text(&mut entries, idempotency_key) {
            return Ok(GateOutcome::Duplicate { payload });
        }

        let count = incr(&mut entries, limit_key, window)?;
        debug!(limit_key, count, limit, "memory gatekeeper increment");

        if u64::try_from(count).map_or(false, |c| c > limit) {
            Ok(GateOutcome::Limited { count })
        } else {
            Ok(GateOutcome::Allowed { count })
        }
    }

    async fn health_check(&self) -> Result<()> {
        self.lock().map(|_| ())
    }
}
