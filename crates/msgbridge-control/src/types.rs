//! Request and configuration types for control operations.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Request to register a new tenant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTenantRequest {
    /// Token to use; a random one is generated when absent.
    #[serde(default)]
    pub token: Option<String>,
    /// Free-form owner reference.
    #[serde(default)]
    pub owner: Option<String>,
    /// Cache and dispatch group messages.
    #[serde(default)]
    pub handle_groups: bool,
    /// Cache and dispatch broadcast messages.
    #[serde(default)]
    pub handle_broadcast: bool,
    /// Mark the tenant as a development tenant.
    #[serde(default)]
    pub devel: bool,
}

impl CreateTenantRequest {
    /// Create a request for a tenant owned by `owner`.
    #[must_use]
    pub fn for_owner(owner: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            ..Self::default()
        }
    }
}

/// Configuration for the bridge service.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Maximum number of concurrent handler dispatches per tenant.
    pub max_inflight_dispatches: usize,
    /// Timeout for a single webhook POST (seconds).
    pub webhook_timeout_seconds: u64,
    /// Connect every loaded tenant when the service starts.
    pub connect_on_start: bool,
}

impl ControlConfig {
    /// Get the webhook timeout as a `Duration`.
    #[must_use]
    pub const fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_seconds)
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            max_inflight_dispatches: 64,
            webhook_timeout_seconds: 10,
            connect_on_start: true,
        }
    }
}
