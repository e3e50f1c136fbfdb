use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Script error: {0}")]
    ScriptError(String),

    #[error("Processor failure: {0}")]
    ProcessorFailure(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("File system error: {0}")]
    FileSystemError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl GatewayError {
    /// HTTP status this error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::StoreUnavailable(_)
            | GatewayError::RedisError(_)
            | GatewayError::ScriptError(_)
            | GatewayError::ProcessorFailure(_)
            | GatewayError::ConfigurationError(_)
            | GatewayError::FileSystemError(_)
            | GatewayError::JsonError(_)
            | GatewayError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand back to callers. Internal details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            GatewayError::InvalidRequest(msg) => msg.clone(),
            GatewayError::ProcessorFailure(_) => "Transaction processing failed".to_string(),
            _ => "Internal Server Error".to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            debug!(error = %self, "Request rejected");
        }
        crate::metrics::record_response(status.as_u16());

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
