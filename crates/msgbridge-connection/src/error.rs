//! Error types for connection backends.

use thiserror::Error;

/// A result type using `ConnectionError`.
pub type Result<T> = std::result::Result<T, ConnectionError>;

/// Errors reported by a connection backend.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The connection has been disposed and cannot be used again.
    #[error("connection disposed")]
    Disposed,

    /// The account has not been paired, so its network identity is unknown.
    #[error("network identity unknown, connection not paired")]
    IdentityUnknown,

    /// The operation needs an established transport.
    #[error("not connected")]
    NotConnected,

    /// The recipient is not a chat the network can address.
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    /// The message carries no downloadable attachment.
    #[error("message has no attachment")]
    NoAttachment,

    /// No usable backend is configured.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The network transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The network rejected the session credentials.
    #[error("authentication error: {0}")]
    Auth(String),
}

impl ConnectionError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidRecipient(_) => 400,
            Self::NoAttachment => 404,
            Self::IdentityUnknown | Self::NotConnected | Self::Disposed | Self::Unavailable(_) => {
                503
            }
            Self::Transport(_) | Self::Auth(_) => 502,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Transport(_))
    }
}
