use crate::errors::{GatewayError, Result};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Router serving the Prometheus text exposition
pub fn metrics_router() -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/", get(metrics_handler))
}

/// Start HTTP server for Prometheus metrics endpoint
pub async fn start_metrics_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::InternalError(format!("Failed to bind metrics server: {}", e)))?;

    info!("Metrics server listening on http://{}/metrics", addr);

    axum::serve(listener, metrics_router())
        .await
        .map_err(|e| GatewayError::InternalError(format!("Metrics server error: {}", e)))
}

async fn metrics_handler() -> Response {
    match gather_metrics_safe() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Gather metrics with Send-safe error type
fn gather_metrics_safe() -> std::result::Result<String, String> {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Failed to convert metrics to UTF-8: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_recorded_decisions() {
        crate::metrics::record_decision("allow", 0.001);
        let text = gather_metrics_safe().unwrap();
        assert!(text.contains("txgate_decisions_total"));
    }
}
