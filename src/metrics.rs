use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Gauge, HistogramVec,
};

lazy_static! {
    // Gatekeeper metrics
    pub static ref DECISIONS_TOTAL: CounterVec = register_counter_vec!(
        "txgate_decisions_total",
        "Gatekeeper decisions by outcome",
        &["decision"]
    ).unwrap();

    pub static ref DECISION_DURATION: HistogramVec = register_histogram_vec!(
        "txgate_decision_duration_seconds",
        "Gatekeeper evaluation duration in seconds",
        &["decision"],
        vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    ).unwrap();

    // HTTP metrics
    pub static ref RESPONSES_TOTAL: CounterVec = register_counter_vec!(
        "txgate_responses_total",
        "Responses by HTTP status",
        &["status"]
    ).unwrap();

    // Store metrics
    pub static ref STORE_DURATION: HistogramVec = register_histogram_vec!(
        "txgate_store_duration_seconds",
        "Store command duration in seconds",
        &["command"],
        vec![0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5]
    ).unwrap();

    pub static ref STORE_ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "txgate_store_errors_total",
        "Store errors by operation",
        &["operation"]
    ).unwrap();

    pub static ref SCRIPT_EXECUTIONS_TOTAL: CounterVec = register_counter_vec!(
        "txgate_script_executions_total",
        "Gatekeeper script executions",
        &["result"]
    ).unwrap();

    // Transaction metrics
    pub static ref PROCESSOR_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "txgate_processor_failures_total",
        "Downstream processor failures",
        &["reason"]
    ).unwrap();

    pub static ref RESULT_WRITE_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "txgate_result_write_failures_total",
        "Transactions that ran but whose result could not be stored",
        &["reason"]
    ).unwrap();

    // Policy metrics
    pub static ref POLICY_RELOADS_TOTAL: CounterVec = register_counter_vec!(
        "txgate_policy_reloads_total",
        "Total number of policy reloads",
        &["result"]
    ).unwrap();

    pub static ref ACTIVE_OVERRIDES: Gauge = register_gauge!(
        "txgate_active_overrides",
        "Number of identities with a policy override"
    ).unwrap();
}

/// Record a gatekeeper decision
pub fn record_decision(decision: &str, duration_secs: f64) {
    DECISIONS_TOTAL.with_label_values(&[decision]).inc();
    DECISION_DURATION
        .with_label_values(&[decision])
        .observe(duration_secs);
}

/// Record an HTTP response status
pub fn record_response(status: u16) {
    RESPONSES_TOTAL
        .with_label_values(&[&status.to_string()])
        .inc();
}

/// Record store operation duration
pub fn record_store_duration(command: &str, duration_secs: f64) {
    STORE_DURATION
        .with_label_values(&[command])
        .observe(duration_secs);
}

/// Record store error
pub fn record_store_error(operation: &str) {
    STORE_ERRORS_TOTAL.with_label_values(&[operation]).inc();
}

/// Record script execution
pub fn record_script_execution(success: bool) {
    let result = if success { "success" } else { "error" };
    SCRIPT_EXECUTIONS_TOTAL.with_label_values(&[result]).inc();
}

/// Record a processor failure ("error" or "timeout")
pub fn record_processor_failure(reason: &str) {
    PROCESSOR_FAILURES_TOTAL.with_label_values(&[reason]).inc();
}

/// Record a failed idempotency record write ("error" or "timeout")
pub fn record_result_write_failure(reason: &str) {
    RESULT_WRITE_FAILURES_TOTAL.with_label_values(&[reason]).inc();
}

/// Update policy metrics
pub fn update_policy_metrics(override_count: usize) {
    ACTIVE_OVERRIDES.set(override_count as f64);
}

/// Record policy reload
pub fn record_policy_reload(success: bool) {
    let result = if success { "success" } else { "error" };
    POLICY_RELOADS_TOTAL.with_label_values(&[result]).inc();
}
