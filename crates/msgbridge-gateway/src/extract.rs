//! Request extractors.
//!
//! Bots are addressed by the token in the request path. The [`BotTenant`]
//! extractor resolves it to the tenant before the handler runs.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;

use msgbridge_control::{Bridge, Tenant};

use crate::error::ApiError;
use crate::state::GatewayState;

/// Name of the path parameter carrying the bot token.
pub const TOKEN_PARAM: &str = "token";

/// The tenant addressed by the `{token}` path segment.
#[derive(Clone)]
pub struct BotTenant(pub Arc<Tenant>);

impl<B> FromRequestParts<Arc<GatewayState<B>>> for BotTenant
where
    B: Bridge + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<GatewayState<B>>,
    ) -> Result<Self, Self::Rejection> {
        let Path(params) = Path::<HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        let token = params
            .get(TOKEN_PARAM)
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::BadRequest("missing bot token".to_string()))?;

        let tenant = state.bridge.tenant_by_token(token)?;
        Ok(Self(tenant))
    }
}
