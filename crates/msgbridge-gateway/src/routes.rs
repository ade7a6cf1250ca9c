//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use msgbridge_control::Bridge;

use crate::handlers::{bots, health, internal, webhooks};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Bots (addressed by token)
/// - `GET /v2/bot/{token}` - Bot information
/// - `DELETE /v2/bot/{token}` - Delete bot and erase its session
/// - `GET /v2/bot/{token}/status` - Connection status
/// - `POST /v2/bot/{token}/connect` - Connect
/// - `POST /v2/bot/{token}/disconnect` - Disconnect
/// - `POST /v2/bot/{token}/restart` - Dispose and reconnect
/// - `GET /v2/bot/{token}/pair` - First pairing code
/// - `PUT /v2/bot/{token}/filters` - Group and broadcast filters
/// - `POST /v2/bot/{token}/send` - Send a message
/// - `GET /v2/bot/{token}/receive` - Poll received messages
/// - `POST /v2/bot/{token}/attachment` - Download an attachment
/// - `GET /v2/bot/{token}/invite/{group_id}` - Group invite link
/// - `GET /v2/bot/{token}/picture/{chat_id}` - Profile picture
/// - `GET /v2/bot/{token}/chat/{chat_id}` - Chat title
/// - `GET|POST|DELETE /v2/bot/{token}/webhook` - Webhook endpoints
///
/// ## Internal
/// - `POST /internal/bots` - Register a bot
/// - `GET /internal/bots` - List bots
/// - `GET /internal/health` - Bot connectivity summary
pub fn create_router<B>(state: GatewayState<B>) -> Router
where
    B: Bridge + 'static,
{
    // Extract config values before moving state
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();

    let state = Arc::new(state);

    Router::new()
        // Health (public)
        .route("/health", get(health::health))
        // Bot info and lifecycle
        .route(
            "/v2/bot/{token}",
            get(bots::get_bot).delete(bots::delete_bot::<B>),
        )
        .route("/v2/bot/{token}/status", get(bots::get_status))
        .route("/v2/bot/{token}/connect", post(bots::connect::<B>))
        .route("/v2/bot/{token}/disconnect", post(bots::disconnect::<B>))
        .route("/v2/bot/{token}/restart", post(bots::restart::<B>))
        .route("/v2/bot/{token}/pair", get(bots::pair::<B>))
        .route("/v2/bot/{token}/filters", put(bots::update_filters::<B>))
        // Messaging
        .route("/v2/bot/{token}/send", post(bots::send::<B>))
        .route("/v2/bot/{token}/receive", get(bots::receive::<B>))
        .route("/v2/bot/{token}/attachment", post(bots::download::<B>))
        .route(
            "/v2/bot/{token}/invite/{group_id}",
            get(bots::invite_link::<B>),
        )
        .route(
            "/v2/bot/{token}/picture/{chat_id}",
            get(bots::profile_picture::<B>),
        )
        .route("/v2/bot/{token}/chat/{chat_id}", get(bots::chat::<B>))
        // Webhooks
        .route(
            "/v2/bot/{token}/webhook",
            get(webhooks::list_webhooks::<B>)
                .post(webhooks::add_webhook::<B>)
                .delete(webhooks::remove_webhook::<B>),
        )
        // Internal
        .route(
            "/internal/bots",
            get(internal::list_bots::<B>).post(internal::create_bot::<B>),
        )
        .route("/internal/health", get(internal::internal_health::<B>))
        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(RequestBodyLimitLayer::new(max_body_bytes))
                // Extractors apply their own 2 MB default otherwise.
                .layer(DefaultBodyLimit::max(max_body_bytes))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
