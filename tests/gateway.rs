use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use txgate::config::{IdentityOverride, PolicyConfig};
use txgate::store::GateOutcome;
use txgate::{
    build_router, GatewayError, MemoryStore, PolicyCache, Result, ScriptedGatekeeper, StateStore,
    TransactionProcessor, TransactionService,
};

/// Processor returning a fixed payload and counting its calls
struct FixedProcessor {
    payload: &'static str,
    calls: AtomicUsize,
}

impl FixedProcessor {
    fn new(payload: &'static str) -> Arc<Self> {
        Arc::new(Self {
            payload,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionProcessor for FixedProcessor {
    async fn execute(&self, _identity: &str, _token: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.payload.to_string())
    }
}

/// Store whose result writes always fail
struct WriteFailingStore {
    inner: MemoryStore,
}

#[async_trait]
impl StateStore for WriteFailingStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        Err(GatewayError::StoreUnavailable("connection reset".to_string()))
    }

    async fn set_if_absent_with_ttl(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> Result<Option<String>> {
        Err(GatewayError::StoreUnavailable("connection reset".to_string()))
    }

    async fn increment_with_ttl_on_first_write(&self, key: &str, ttl: Duration) -> Result<i64> {
        self.inner.increment_with_ttl_on_first_write(key, ttl).await
    }

    async fn run_gatekeeper(
        &self,
        limit_key: &str,
        idempotency_key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<GateOutcome> {
        self.inner
            .run_gatekeeper(limit_key, idempotency_key, limit, window)
            .await
    }

    async fn health_check(&self) -> Result<()> {
        Err(GatewayError::StoreUnavailable("down".to_string()))
    }
}

fn app_with(store: Arc<dyn StateStore>, processor: Arc<dyn TransactionProcessor>, policy: PolicyConfig) -> Router {
    let gatekeeper = Arc::new(ScriptedGatekeeper::new(Arc::clone(&store)));
    let policies = Arc::new(ArcSwap::from_pointee(PolicyCache::new(policy)));
    let service = TransactionService::new(gatekeeper, store, processor, policies);
    build_router(Arc::new(service))
}

fn app(processor: Arc<dyn TransactionProcessor>) -> Router {
    app_with(Arc::new(MemoryStore::new()), processor, PolicyConfig::default())
}

fn transaction(user_id: Option<&str>, token: Option<&str>) -> Request<Body> {
    let uri = match user_id {
        Some(id) => format!("/v1/transaction?user_id={}", id),
        None => "/v1/transaction".to_string(),
    };
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(token) = token {
        builder = builder.header("X-Idempotency-Key", token);
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn scenario_a_retry_returns_cached_payload() {
    let processor = FixedProcessor::new("TXN_x");
    let app = app(processor.clone());

    let (status, body) = send(&app, transaction(Some("u1"), Some("abc"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "OK");
    assert_eq!(body["transaction_id"], "TXN_x");

    let (status, body) = send(&app, transaction(Some("u1"), Some("abc"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "TXN_x");

    assert_eq!(processor.calls(), 1);
}

#[tokio::test]
async fn cached_payload_is_returned_to_any_identity() {
    let app = app(FixedProcessor::new("TXN_shared"));

    send(&app, transaction(Some("alice"), Some("k1"))).await;
    let (status, body) = send(&app, transaction(Some("bob"), Some("k1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "TXN_shared");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn scenario_b_concurrent_burst_admits_exactly_the_limit() {
    let processor = FixedProcessor::new("TXN_burst");
    let app = app(processor.clone());

    let handles: Vec<_> = (0..110)
        .map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                let token = format!("concurrent-key-{}", i);
                let (status, _) = send(&app, transaction(Some("u2"), Some(&token))).await;
                status
            })
        })
        .collect();

    let mut created = 0;
    let mut limited = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::TOO_MANY_REQUESTS => limited += 1,
            other => panic!("unexpected status {}", other),
        }
    }

    assert_eq!(created, 100);
    assert_eq!(limited, 10);
    assert_eq!(processor.calls(), 100);
}

#[tokio::test]
async fn sequential_burst_admits_exactly_the_limit() {
    let app = app(FixedProcessor::new("TXN_seq"));
    let mut statuses = Vec::new();

    for i in 0..110 {
        let token = format!("seq-{}", i);
        statuses.push(send(&app, transaction(Some("u3"), Some(&token))).await.0);
    }

    assert!(statuses[..100].iter().all(|s| *s == StatusCode::CREATED));
    assert!(statuses[100..].iter().all(|s| *s == StatusCode::TOO_MANY_REQUESTS));
}

#[tokio::test]
async fn rate_limited_response_body() {
    let mut policy = PolicyConfig::default();
    policy.default.limit = 1;
    let app = app_with(Arc::new(MemoryStore::new()), FixedProcessor::new("TXN"), policy);

    send(&app, transaction(Some("u"), Some("one"))).await;
    let (status, body) = send(&app, transaction(Some("u"), Some("two"))).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["message"], "Rate limit exceeded");
}

#[tokio::test]
async fn duplicate_takes_priority_over_exhausted_budget() {
    let mut policy = PolicyConfig::default();
    policy.default.limit = 2;
    let processor = FixedProcessor::new("TXN_first");
    let app = app_with(Arc::new(MemoryStore::new()), processor.clone(), policy);

    assert_eq!(send(&app, transaction(Some("u"), Some("t1"))).await.0, StatusCode::CREATED);
    assert_eq!(send(&app, transaction(Some("u"), Some("t2"))).await.0, StatusCode::CREATED);
    assert_eq!(send(&app, transaction(Some("u"), Some("t3"))).await.0, StatusCode::TOO_MANY_REQUESTS);

    let (status, body) = send(&app, transaction(Some("u"), Some("t1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "TXN_first");
    assert_eq!(processor.calls(), 2);
}

#[tokio::test]
async fn scenario_c_missing_inputs_are_bad_requests() {
    let processor = FixedProcessor::new("TXN");
    let app = app(processor.clone());

    for req in [
        transaction(Some("u1"), None),
        transaction(None, Some("abc")),
        transaction(None, None),
        transaction(Some(""), Some("abc")),
        transaction(Some("u1"), Some("")),
    ] {
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    assert_eq!(processor.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn expired_record_is_treated_as_new() {
    let policy = PolicyConfig {
        idempotency_ttl_secs: 10,
        ..PolicyConfig::default()
    };
    let processor = FixedProcessor::new("TXN_again");
    let app = app_with(Arc::new(MemoryStore::new()), processor.clone(), policy);

    assert_eq!(send(&app, transaction(Some("u"), Some("k"))).await.0, StatusCode::CREATED);
    assert_eq!(send(&app, transaction(Some("u"), Some("k"))).await.0, StatusCode::OK);

    tokio::time::advance(Duration::from_secs(11)).await;

    assert_eq!(send(&app, transaction(Some("u"), Some("k"))).await.0, StatusCode::CREATED);
    assert_eq!(processor.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn throttled_identity_recovers_after_window() {
    let mut policy = PolicyConfig::default();
    policy.default.limit = 1;
    policy.default.window_secs = 60;
    let app = app_with(Arc::new(MemoryStore::new()), FixedProcessor::new("TXN"), policy);

    assert_eq!(send(&app, transaction(Some("u"), Some("a"))).await.0, StatusCode::CREATED);
    assert_eq!(send(&app, transaction(Some("u"), Some("b"))).await.0, StatusCode::TOO_MANY_REQUESTS);

    tokio::time::advance(Duration::from_secs(61)).await;

    assert_eq!(send(&app, transaction(Some("u"), Some("c"))).await.0, StatusCode::CREATED);
}

#[tokio::test]
async fn identity_override_changes_budget() {
    let policy = PolicyConfig {
        overrides: vec![IdentityOverride {
            identity: "tiny".to_string(),
            limit: 1,
            window_secs: 60,
        }],
        ..PolicyConfig::default()
    };
    let app = app_with(Arc::new(MemoryStore::new()), FixedProcessor::new("TXN"), policy);

    assert_eq!(send(&app, transaction(Some("tiny"), Some("1"))).await.0, StatusCode::CREATED);
    assert_eq!(send(&app, transaction(Some("tiny"), Some("2"))).await.0, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(send(&app, transaction(Some("normal"), Some("3"))).await.0, StatusCode::CREATED);
}

#[tokio::test]
async fn failed_result_write_reports_internal_error() {
    let store = Arc::new(WriteFailingStore {
        inner: MemoryStore::new(),
    });
    let processor = FixedProcessor::new("TXN_lost");
    let app = app_with(store, processor.clone(), PolicyConfig::default());

    let (status, body) = send(&app, transaction(Some("u"), Some("k"))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());

    // Known limitation: the retry runs the processor a second time
    send(&app, transaction(Some("u"), Some("k"))).await;
    assert_eq!(processor.calls(), 2);
}

#[tokio::test]
async fn cors_preflight_allows_idempotency_header() {
    let app = app(FixedProcessor::new("TXN"));
    let req = Request::builder()
        .method("OPTIONS")
        .uri("/v1/transaction?user_id=u")
        .header("Origin", "https://shop.example.com")
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "x-idempotency-key")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(req).await.unwrap();
    let headers = response.headers();

    assert_eq!(headers["access-control-allow-origin"], "*");
    let allowed = headers["access-control-allow-headers"]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(allowed.contains("x-idempotency-key"));
}

#[tokio::test]
async fn health_reflects_store_state() {
    let healthy = app(FixedProcessor::new("TXN"));
    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    assert_eq!(send(&healthy, req).await.0, StatusCode::OK);

    let broken = app_with(
        Arc::new(WriteFailingStore {
            inner: MemoryStore::new(),
        }),
        FixedProcessor::new("TXN"),
        PolicyConfig::default(),
    );
    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    assert_eq!(send(&broken, req).await.0, StatusCode::SERVICE_UNAVAILABLE);
}
