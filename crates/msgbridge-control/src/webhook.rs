//! Webhook fan-out with loop prevention.
//!
//! The [`WebhookDispatcher`] is registered as an [`EventHandler`] on its
//! tenant's registry. Every accepted message is POSTed as JSON to each
//! configured endpoint that [`should_forward`] it. Delivery is at most once:
//! failures are logged and dropped.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use msgbridge_core::{Message, MessageKind, TenantId, Wid};
use msgbridge_store::WebhookEndpoint;
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;

use crate::handlers::EventHandler;

/// Header carrying the wid of the tenant that observed the message.
pub const WID_HEADER: &str = "X-Bridge-Wid";

/// Errors from a single webhook delivery.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The request could not be sent or timed out.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("endpoint returned status {0}")]
    Status(u16),
}

/// Body POSTed to webhook endpoints.
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    /// Wid of the tenant, when paired.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wid: Option<&'a str>,
    /// The message.
    pub message: &'a Message,
}

/// Decide whether `message` goes to `endpoint`.
///
/// External messages always go out. Messages sent through the gateway only
/// go to endpoints asking for them, and never to an endpoint whose track id
/// filter matches the message's own track id.
#[must_use]
pub fn should_forward(endpoint: &WebhookEndpoint, message: &Message) -> bool {
    if !message.from_internal {
        return true;
    }

    let filter = endpoint.track_id_or_empty();
    endpoint.forward_internal && (filter.is_empty() || filter != message.track_id_or_empty())
}

/// Returns false for messages no endpoint should receive.
#[must_use]
pub fn is_deliverable(message: &Message) -> bool {
    match message.kind {
        MessageKind::Unknown => false,
        MessageKind::Text => !message.text.is_empty(),
        _ => true,
    }
}

/// Build the HTTP client used for webhook delivery.
///
/// Certificates are not verified: endpoints are configured by the operator.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn build_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(5)))
        .danger_accept_invalid_certs(true)
        .build()
}

/// Delivers accepted messages to a tenant's webhook endpoints.
pub struct WebhookDispatcher {
    tenant_id: TenantId,
    client: reqwest::Client,
    wid: RwLock<Option<Wid>>,
    endpoints: RwLock<Vec<WebhookEndpoint>>,
}

impl WebhookDispatcher {
    /// Create a dispatcher without endpoints.
    #[must_use]
    pub fn new(tenant_id: TenantId, client: reqwest::Client) -> Self {
        Self {
            tenant_id,
            client,
            wid: RwLock::new(None),
            endpoints: RwLock::new(Vec::new()),
        }
    }

    /// Replace the configured endpoints.
    pub fn set_endpoints(&self, endpoints: Vec<WebhookEndpoint>) {
        *self.endpoints.write() = endpoints;
    }

    /// Configured endpoints.
    #[must_use]
    pub fn endpoints(&self) -> Vec<WebhookEndpoint> {
        self.endpoints.read().clone()
    }

    /// Set the wid reported with each delivery.
    pub fn set_wid(&self, wid: Option<Wid>) {
        *self.wid.write() = wid;
    }

    /// POST one message to one endpoint.
    ///
    /// # Errors
    ///
    /// Returns a `DeliveryError` if the request fails or the endpoint
    /// answers with a non-success status.
    pub async fn deliver(
        &self,
        endpoint: &WebhookEndpoint,
        message: &Message,
    ) -> Result<(), DeliveryError> {
        let wid = self.wid.read().as_ref().map(ToString::to_string);
        let payload = WebhookPayload {
            wid: wid.as_deref(),
            message,
        };

        let mut request = self.client.post(&endpoint.url).json(&payload);
        if let Some(wid) = &wid {
            request = request.header(WID_HEADER, wid);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for WebhookDispatcher {
    async fn handle(&self, message: &Message) {
        if !is_deliverable(message) {
            tracing::debug!(
                tenant_id = %self.tenant_id,
                message_id = %message.id,
                kind = ?message.kind,
                "Ignoring message on webhook delivery"
            );
            return;
        }

        let targets: Vec<WebhookEndpoint> = self
            .endpoints
            .read()
            .iter()
            .filter(|endpoint| should_forward(endpoint, message))
            .cloned()
            .collect();

        let deliveries = targets.iter().map(|endpoint| async move {
            match self.deliver(endpoint, message).await {
                Ok(()) => tracing::debug!(
                    tenant_id = %self.tenant_id,
                    message_id = %message.id,
                    url = %endpoint.url,
                    "Webhook delivered"
                ),
                Err(e) => tracing::warn!(
                    tenant_id = %self.tenant_id,
                    message_id = %message.id,
                    url = %endpoint.url,
                    error = %e,
                    "Webhook delivery failed"
                ),
            }
        });

        join_all(deliveries).await;
    }
}
