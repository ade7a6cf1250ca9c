//! API error types and responses.
//!
//! This module defines the standard error format for all API responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use msgbridge_connection::ConnectionStatus;
use msgbridge_control::ControlError;
use msgbridge_store::StoreError;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The bot is not ready to talk to the network.
    #[error("bot not ready, current status: {0}")]
    NotReady(ConnectionStatus),

    /// Invalid request body or parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The request conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The connection backend failed.
    #[error("backend error: {0}")]
    BadGateway(String),

    /// The connection backend is not available.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Error details.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NotReady(_) | Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::NotReady(_) => "not_ready",
            Self::BadRequest(_) => "bad_request",
            Self::Conflict(_) => "conflict",
            Self::BadGateway(_) => "backend_error",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        (status, Json(body)).into_response()
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::TenantNotFound => Self::NotFound("bot".to_string()),
            ControlError::MessageNotFound(id) => Self::NotFound(format!("message {id}")),
            ControlError::NotReady { status } => Self::NotReady(status),
            ControlError::InvalidRequest(msg) => Self::BadRequest(msg),
            ControlError::Backend(backend_err) => {
                let message = backend_err.to_string();
                match backend_err.http_status_code() {
                    400 => Self::BadRequest(message),
                    404 => Self::NotFound(message),
                    503 => Self::Unavailable(message),
                    _ => {
                        tracing::warn!(error = %message, "Backend error");
                        Self::BadGateway(message)
                    }
                }
            }
            ControlError::Store(StoreError::Conflict(msg)) => Self::Conflict(msg),
            ControlError::Store(store_err) => {
                tracing::error!(error = %store_err, "Store error");
                Self::Internal("storage error".to_string())
            }
            ControlError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                Self::Internal(msg)
            }
        }
    }
}
