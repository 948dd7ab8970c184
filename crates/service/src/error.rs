//! Errors of the service layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use event_bus::ChannelError;
use orders::OrderError;
use thiserror::Error;

/// Ops API error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Order store error.
    Orders(OrderError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Orders(OrderError::NotFound(id)) => {
                (StatusCode::NOT_FOUND, format!("Order {id} not found"))
            }
            ApiError::Orders(err) => {
                tracing::error!(error = %err, "order store error");
                (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Orders(err)
    }
}

/// Errors that stop the service from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Order store setup failed: {0}")]
    Orders(#[from] OrderError),

    #[error("Event channel setup failed: {0}")]
    Channel(#[from] ChannelError),

    /// `REDIS_URL` is set but the binary was built without Redis support.
    #[error("REDIS_URL is set but the service was built without the `redis` feature")]
    RedisUnsupported,
}
