//! Gateway application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::sync::Arc;

use msgbridge_control::Bridge;

use crate::config::GatewayConfig;

/// Shared application state for the gateway.
///
/// This struct holds references to all services needed by the HTTP handlers.
pub struct GatewayState<B>
where
    B: Bridge,
{
    /// The bridge service owning every tenant.
    pub bridge: Arc<B>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl<B> GatewayState<B>
where
    B: Bridge,
{
    /// Create a new gateway state.
    #[must_use]
    pub fn new(bridge: Arc<B>, config: GatewayConfig) -> Self {
        Self { bridge, config }
    }
}

impl<B> Clone for GatewayState<B>
where
    B: Bridge,
{
    fn clone(&self) -> Self {
        Self {
            bridge: Arc::clone(&self.bridge),
            config: self.config.clone(),
        }
    }
}
