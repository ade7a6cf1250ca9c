//! Error types for the control layer.
//!
//! This module defines all errors that can occur during tenant lifecycle,
//! message retrieval and webhook management operations.

use msgbridge_connection::{ConnectionError, ConnectionStatus};
use msgbridge_core::MessageId;
use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in control operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// No tenant matches the id, token or identity used for lookup.
    #[error("tenant not found")]
    TenantNotFound,

    /// The requested message is not in the tenant's cache.
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    /// The operation needs the remote party but the tenant is not ready.
    #[error("tenant not ready, current status: {status}")]
    NotReady {
        /// Status at the time of the request.
        status: ConnectionStatus,
    },

    /// The request is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The connection backend failed.
    #[error("backend error: {0}")]
    Backend(#[from] ConnectionError),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] msgbridge_store::StoreError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::TenantNotFound | Self::MessageNotFound(_) => 404,
            Self::NotReady { .. } => 503,
            Self::InvalidRequest(_) => 400,
            Self::Backend(err) => err.http_status_code(),
            Self::Store(msgbridge_store::StoreError::Conflict(_)) => 409,
            Self::Store(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::NotReady { .. } | Self::Store(_) | Self::Internal(_) => true,
            Self::Backend(err) => err.is_retriable(),
            _ => false,
        }
    }
}
