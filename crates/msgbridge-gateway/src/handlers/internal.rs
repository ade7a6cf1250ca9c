//! Internal API endpoints.
//!
//! These endpoints provision and enumerate bots. They hand out tokens and
//! are NOT meant to be exposed externally.
//!
//! # Security
//!
//! Internal endpoints should be protected by network policies that only allow
//! traffic from operators and trusted services.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use msgbridge_control::{Bridge, ConnectionStatus, CreateTenantRequest, Tenant};

use crate::error::ApiError;
use crate::state::GatewayState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// A bot as seen by operators.
#[derive(Debug, Serialize)]
pub struct InternalBot {
    /// Tenant ID.
    pub id: String,
    /// Token addressing the bot in `/v2/bot/{token}`.
    pub token: String,
    /// Network identity, once paired.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wid: Option<String>,
    /// Owner reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Current status.
    pub status: ConnectionStatus,
}

impl From<&Tenant> for InternalBot {
    fn from(tenant: &Tenant) -> Self {
        let record = tenant.record();
        Self {
            id: record.tenant_id.to_string(),
            token: record.token,
            wid: record.wid.map(|w| w.to_string()),
            owner: record.owner,
            status: tenant.status(),
        }
    }
}

/// Response for bot list.
#[derive(Debug, Serialize)]
pub struct ListBotsResponse {
    /// Active bots.
    pub bots: Vec<InternalBot>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Register a new bot.
///
/// # Errors
///
/// Returns `Conflict` if the requested token is already taken.
pub async fn create_bot<B>(
    State(state): State<Arc<GatewayState<B>>>,
    Json(body): Json<CreateTenantRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    B: Bridge + 'static,
{
    let tenant = state.bridge.create_tenant(body).await?;

    tracing::info!(tenant_id = %tenant.id(), "Registered bot via internal API");

    Ok((StatusCode::CREATED, Json(InternalBot::from(tenant.as_ref()))))
}

/// List every active bot.
pub async fn list_bots<B>(State(state): State<Arc<GatewayState<B>>>) -> impl IntoResponse
where
    B: Bridge + 'static,
{
    let mut bots: Vec<InternalBot> = state
        .bridge
        .list_tenants()
        .iter()
        .map(|t| InternalBot::from(t.as_ref()))
        .collect();
    bots.sort_by(|a, b| a.id.cmp(&b.id));

    Json(ListBotsResponse { bots })
}

/// Health check for internal services.
///
/// Reports how many bots are active and how many of them are ready.
pub async fn internal_health<B>(State(state): State<Arc<GatewayState<B>>>) -> impl IntoResponse
where
    B: Bridge + 'static,
{
    #[derive(Serialize)]
    struct InternalHealthResponse {
        status: &'static str,
        bots: usize,
        ready: usize,
    }

    let tenants = state.bridge.list_tenants();
    let ready = tenants.iter().filter(|t| t.status().is_ready()).count();

    Json(InternalHealthResponse {
        status: "ok",
        bots: tenants.len(),
        ready,
    })
}
