//! Domain types stored in the database.
//!
//! These types represent the persisted configuration of tenants and their
//! webhook endpoints. Session blobs are stored as opaque bytes.

use chrono::{DateTime, Utc};
use msgbridge_core::{TenantId, Wid};
use serde::{Deserialize, Serialize};

/// A tenant record stored in the database.
///
/// A tenant is one bot: a single account on the messaging network,
/// reachable over HTTP through its token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    /// Unique identifier for the tenant.
    pub tenant_id: TenantId,
    /// Secret token used in HTTP paths to address this tenant.
    pub token: String,
    /// Network identity, known once the account has been paired.
    #[serde(default)]
    pub wid: Option<Wid>,
    /// Free-form owner reference (user id, email, ...).
    #[serde(default)]
    pub owner: Option<String>,
    /// Whether group messages are cached and dispatched.
    #[serde(default)]
    pub handle_groups: bool,
    /// Whether broadcast and status messages are cached and dispatched.
    #[serde(default)]
    pub handle_broadcast: bool,
    /// Whether the tenant has completed pairing at least once.
    #[serde(default)]
    pub verified: bool,
    /// Development tenants log more and are never connected on startup.
    #[serde(default)]
    pub devel: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TenantRecord {
    /// Create a record with default filters for a new tenant.
    #[must_use]
    pub fn new(tenant_id: TenantId, token: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            tenant_id,
            token: token.into(),
            wid: None,
            owner: None,
            handle_groups: false,
            handle_broadcast: false,
            verified: false,
            devel: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Phone number of the paired account, if known.
    #[must_use]
    pub fn phone(&self) -> Option<String> {
        self.wid.as_ref().map(Wid::phone).filter(|p| !p.is_empty())
    }
}

/// A webhook endpoint configured for a tenant.
///
/// Endpoints are unique per tenant by URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    /// Target URL receiving a JSON POST per message.
    pub url: String,
    /// Also deliver messages sent through the gateway itself.
    #[serde(default)]
    pub forward_internal: bool,
    /// Skip internal messages carrying this track id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
}

impl WebhookEndpoint {
    /// Create an endpoint that only receives external messages.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            forward_internal: false,
            track_id: None,
        }
    }

    /// The track id filter, or an empty string when unset.
    #[must_use]
    pub fn track_id_or_empty(&self) -> &str {
        self.track_id.as_deref().unwrap_or_default()
    }
}
