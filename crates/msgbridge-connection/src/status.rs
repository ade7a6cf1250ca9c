//! Connection status model.
//!
//! The live status of a connection is derived from three signals reported
//! by the backend. Lifecycle phases (`Starting`, `Halting`, ...) are set by
//! the tenant orchestration and take precedence over the derived value
//! while they are set.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operational status of a tenant's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Status could not be determined.
    Unknown,
    /// Tenant exists but no connection object has been built.
    Created,
    /// Connect requested, connection being built.
    Starting,
    /// Transport handshake in progress.
    Connecting,
    /// Stopped on request.
    Stopped,
    /// Being torn down to connect again.
    Restarting,
    /// Transport up, not authenticated.
    Connected,
    /// Authenticated; session and identity being synced after connect.
    Fetching,
    /// Transport up and authenticated.
    Ready,
    /// Being deleted.
    Halting,
    /// Transport down.
    Disconnected,
    /// Transport down after a failed connect attempt.
    Failed,
}

impl ConnectionStatus {
    /// Returns true if the remote party can be reached.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns true for lifecycle phases set explicitly by orchestration.
    #[must_use]
    pub const fn is_phase(self) -> bool {
        matches!(
            self,
            Self::Created
                | Self::Starting
                | Self::Connecting
                | Self::Stopped
                | Self::Restarting
                | Self::Fetching
                | Self::Halting
        )
    }

    /// Lower-case name, as used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Connecting => "connecting",
            Self::Stopped => "stopped",
            Self::Restarting => "restarting",
            Self::Connected => "connected",
            Self::Fetching => "fetching",
            Self::Ready => "ready",
            Self::Halting => "halting",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw signals a backend reports about its transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct ConnectionSignals {
    /// The transport is up.
    pub transport_connected: bool,
    /// The session is authenticated (paired and logged in).
    pub authenticated: bool,
    /// The most recent connect attempt failed.
    pub last_connect_attempt_failed: bool,
}

/// Derive the status implied by the backend signals.
///
/// Precedence, top to bottom: failed, disconnected, connected, ready.
#[must_use]
pub const fn derive_status(signals: ConnectionSignals) -> ConnectionStatus {
    match (
        signals.transport_connected,
        signals.authenticated,
        signals.last_connect_attempt_failed,
    ) {
        (false, _, true) => ConnectionStatus::Failed,
        (false, _, false) => ConnectionStatus::Disconnected,
        (true, false, _) => ConnectionStatus::Connected,
        (true, true, _) => ConnectionStatus::Ready,
    }
}
