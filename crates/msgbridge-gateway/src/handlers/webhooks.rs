//! Webhook configuration endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use msgbridge_control::{Bridge, WebhookEndpoint};

use crate::error::ApiError;
use crate::extract::BotTenant;
use crate::state::GatewayState;

/// Response listing webhook endpoints.
#[derive(Debug, Serialize)]
pub struct WebhooksResponse {
    /// Configured endpoints.
    pub webhooks: Vec<WebhookEndpoint>,
}

/// Query parameters for webhook removal.
#[derive(Debug, Default, Deserialize)]
pub struct RemoveQuery {
    /// URL of the endpoint to remove; all endpoints when absent.
    #[serde(default)]
    pub url: Option<String>,
}

/// Response for webhook removal.
#[derive(Debug, Serialize)]
pub struct RemoveResponse {
    /// Number of endpoints removed.
    pub removed: usize,
}

/// List the webhook endpoints of a bot.
///
/// # Errors
///
/// Returns an error if the endpoints cannot be read.
pub async fn list_webhooks<B>(
    State(state): State<Arc<GatewayState<B>>>,
    BotTenant(tenant): BotTenant,
) -> Result<impl IntoResponse, ApiError>
where
    B: Bridge + 'static,
{
    let webhooks = state.bridge.list_webhooks(&tenant)?;
    Ok(Json(WebhooksResponse { webhooks }))
}

/// Add or replace a webhook endpoint, matched by URL.
///
/// # Errors
///
/// Returns an error if the URL is not http(s).
pub async fn add_webhook<B>(
    State(state): State<Arc<GatewayState<B>>>,
    BotTenant(tenant): BotTenant,
    Json(endpoint): Json<WebhookEndpoint>,
) -> Result<impl IntoResponse, ApiError>
where
    B: Bridge + 'static,
{
    let webhooks = state.bridge.add_webhook(&tenant, endpoint)?;
    Ok(Json(WebhooksResponse { webhooks }))
}

/// Remove one webhook endpoint, or all of them.
///
/// # Errors
///
/// Returns `NotFound` if a URL was given and no endpoint matches it.
pub async fn remove_webhook<B>(
    State(state): State<Arc<GatewayState<B>>>,
    BotTenant(tenant): BotTenant,
    Query(query): Query<RemoveQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    B: Bridge + 'static,
{
    let url = query.url.as_deref().map(str::trim).filter(|u| !u.is_empty());
    let removed = state.bridge.remove_webhook(&tenant, url)?;
    if removed == 0 {
        if let Some(url) = url {
            return Err(ApiError::NotFound(format!("webhook {url}")));
        }
    }
    Ok(Json(RemoveResponse { removed }))
}
