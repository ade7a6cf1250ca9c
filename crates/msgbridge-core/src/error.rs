//! Common error types for msgbridge.
//!
//! This module provides shared error types that are used across multiple crates.

use crate::ids::{MessageId, TenantId};
use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the gateway.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A tenant with the specified ID was not found.
    #[error("tenant not found: {0}")]
    TenantNotFound(TenantId),

    /// A message with the specified ID is not in the cache.
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),

    /// A recipient could not be turned into a chat id.
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}
