use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::rate_limit::RateLimitError;

/// Errors a handler can return to the caller
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Missing or invalid credentials")]
    Unauthorized,

    #[error("Requires the {0} role")]
    Forbidden(&'static str),

    #[error("Too many requests. Try again in {retry_after_seconds} seconds.")]
    RateLimited { retry_after_seconds: u64 },

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("No healthy {0} upstream available")]
    NoUpstream(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::NoUpstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Policy problems are a server misconfiguration, never the caller's fault
impl From<RateLimitError> for ApiError {
    fn from(err: RateLimitError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        match self {
            ApiError::RateLimited { retry_after_seconds } => {
                let body = Json(serde_json::json!({
                    "error": message,
                    "retry_after_seconds": retry_after_seconds,
                }));
                let mut response = (status, body).into_response();
                response.headers_mut().insert(
                    header::RETRY_AFTER,
                    HeaderValue::from(retry_after_seconds),
                );
                response
            }
            _ => (status, Json(serde_json::json!({ "error": message }))).into_response(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// Startup problems, reported before the server binds
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("At least one {0} upstream required")]
    NoUpstreams(&'static str),

    #[error("JWT secret must not be empty")]
    EmptyJwtSecret,
}
