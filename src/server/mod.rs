pub mod handler;

use axum::http::{header, HeaderName, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::errors::{GatewayError, Result};
use handler::{TransactionService, IDEMPOTENCY_HEADER};

/// HTTP server configuration
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Routes, CORS and request tracing around a transaction service
pub fn build_router(service: Arc<TransactionService>) -> Router {
    // Browsers must be allowed to send the idempotency header cross-origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([HeaderName::from_static(IDEMPOTENCY_HEADER), header::CONTENT_TYPE]);

    Router::new()
        .route("/v1/transaction", post(handler::create_transaction))
        .route("/healthz", get(handler::health))
        .with_state(service)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Serve the gateway until Ctrl-C
pub async fn start_server(config: ServerConfig, service: Arc<TransactionService>) -> Result<()> {
    let addr = config.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| GatewayError::InternalError(format!("Failed to bind {}: {}", addr, e)))?;

    info!("Gateway operational on {}", addr);

    axum::serve(listener, build_router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GatewayError::InternalError(format!("Server error: {}", e)))?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
