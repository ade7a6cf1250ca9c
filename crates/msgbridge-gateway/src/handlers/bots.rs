//! Bot endpoints.
//!
//! This module provides the per-bot API: information and status, lifecycle,
//! pairing, sending, polling for received messages and attachment download.
//! Every route is addressed by the bot token in the path.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use msgbridge_control::{
    Attachment, Bridge, ConnectionStatus, Message, OutboundMessage, ProfilePicture, Tenant,
};

use crate::error::ApiError;
use crate::extract::BotTenant;
use crate::state::GatewayState;

/// Header carrying the caller's track id on send requests.
pub const TRACK_ID_HEADER: &str = "x-bridge-trackid";

// =============================================================================
// Request/Response Types
// =============================================================================

/// Response describing a bot.
#[derive(Debug, Serialize)]
pub struct BotInfoResponse {
    /// Tenant ID.
    pub id: String,
    /// Network identity, once paired.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wid: Option<String>,
    /// Phone number of the paired account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    /// Current status.
    pub status: ConnectionStatus,
    /// Whether group messages are handled.
    pub handle_groups: bool,
    /// Whether broadcast messages are handled.
    pub handle_broadcast: bool,
    /// Whether pairing completed at least once.
    pub verified: bool,
    /// Development tenant.
    pub devel: bool,
    /// Messages currently cached.
    pub cached_messages: usize,
    /// Registered event handlers.
    pub handlers: usize,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<&Tenant> for BotInfoResponse {
    fn from(tenant: &Tenant) -> Self {
        let record = tenant.record();
        Self {
            id: record.tenant_id.to_string(),
            number: record.phone(),
            wid: record.wid.map(|w| w.to_string()),
            status: tenant.status(),
            handle_groups: record.handle_groups,
            handle_broadcast: record.handle_broadcast,
            verified: record.verified,
            devel: record.devel,
            cached_messages: tenant.handlers().count(),
            handlers: tenant.handlers().handler_count(),
            created_at: record.created_at,
        }
    }
}

/// Response for status and lifecycle operations.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Tenant ID.
    pub id: String,
    /// Status after the operation.
    pub status: ConnectionStatus,
    /// Whether the bot can talk to the network.
    pub ready: bool,
}

impl StatusResponse {
    fn new(tenant: &Tenant, status: ConnectionStatus) -> Self {
        Self {
            id: tenant.id().to_string(),
            status,
            ready: status.is_ready(),
        }
    }
}

/// Attachment supplied inline with a send request.
#[derive(Debug, Deserialize)]
pub struct AttachmentBody {
    /// MIME type of the content.
    pub mime_type: String,
    /// File name shown to the recipient.
    #[serde(default)]
    pub file_name: Option<String>,
    /// Base64 encoded content.
    pub base64: String,
}

/// Request to send a message.
#[derive(Debug, Deserialize)]
pub struct SendBody {
    /// Destination, e.g. `5511999999999@s.whatsapp.net` or a group id.
    pub recipient: String,
    /// Text body, or caption when an attachment is present.
    #[serde(default)]
    pub message: Option<String>,
    /// Optional attachment.
    #[serde(default)]
    pub attachment: Option<AttachmentBody>,
}

/// Query parameters of a send request.
#[derive(Debug, Default, Deserialize)]
pub struct SendQuery {
    /// Track id, alternative to the header.
    #[serde(default)]
    pub trackid: Option<String>,
}

/// Query parameters for polling received messages.
#[derive(Debug, Default, Deserialize)]
pub struct ReceiveQuery {
    /// Only return messages newer than this Unix timestamp (seconds).
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Response for received messages.
#[derive(Debug, Serialize)]
pub struct ReceiveResponse {
    /// Messages, oldest first.
    pub messages: Vec<Message>,
    /// Number of messages returned.
    pub total: usize,
}

/// Request to download an attachment.
#[derive(Debug, Deserialize)]
pub struct AttachmentRequest {
    /// Message id.
    #[serde(default)]
    pub id: Option<String>,
    /// Attachment URL as handed out in a message; its last segment is the id.
    #[serde(default)]
    pub url: Option<String>,
}

/// Request to change the message filters.
#[derive(Debug, Deserialize)]
pub struct FiltersBody {
    /// Handle group messages.
    pub handle_groups: bool,
    /// Handle broadcast messages.
    pub handle_broadcast: bool,
}

/// Response carrying a pairing code.
#[derive(Debug, Serialize)]
pub struct PairResponse {
    /// Code or QR payload to present to the account owner.
    pub code: String,
}

/// Response carrying a group invite link.
#[derive(Debug, Serialize)]
pub struct InviteResponse {
    /// Group id.
    pub group_id: String,
    /// Invite link.
    pub link: String,
}

/// Query parameters for profile pictures.
#[derive(Debug, Default, Deserialize)]
pub struct PictureQuery {
    /// Picture id the caller already has.
    #[serde(default)]
    pub known_id: Option<String>,
}

/// Response for profile pictures.
#[derive(Debug, Serialize)]
pub struct PictureResponse {
    /// The picture, or `None` if `known_id` is still current.
    pub picture: Option<ProfilePicture>,
}

/// Response for chat information.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    /// Chat id.
    pub chat_id: String,
    /// Display title, if known.
    pub title: Option<String>,
}

// =============================================================================
// Info and lifecycle
// =============================================================================

/// Get information about a bot.
///
/// # Errors
///
/// Returns an error if no bot has this token.
pub async fn get_bot(BotTenant(tenant): BotTenant) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(BotInfoResponse::from(tenant.as_ref())))
}

/// Get the status of a bot.
///
/// # Errors
///
/// Returns an error if no bot has this token.
pub async fn get_status(BotTenant(tenant): BotTenant) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(StatusResponse::new(&tenant, tenant.status())))
}

/// Connect a bot.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect<B>(
    State(state): State<Arc<GatewayState<B>>>,
    BotTenant(tenant): BotTenant,
) -> Result<impl IntoResponse, ApiError>
where
    B: Bridge + 'static,
{
    let status = state.bridge.connect(&tenant).await?;
    Ok(Json(StatusResponse::new(&tenant, status)))
}

/// Disconnect a bot.
///
/// # Errors
///
/// Returns an error if no bot has this token.
pub async fn disconnect<B>(
    State(state): State<Arc<GatewayState<B>>>,
    BotTenant(tenant): BotTenant,
) -> Result<impl IntoResponse, ApiError>
where
    B: Bridge + 'static,
{
    let status = state.bridge.disconnect(&tenant).await?;
    Ok(Json(StatusResponse::new(&tenant, status)))
}

/// Restart a bot.
///
/// # Errors
///
/// Returns an error if the new connection cannot be established.
pub async fn restart<B>(
    State(state): State<Arc<GatewayState<B>>>,
    BotTenant(tenant): BotTenant,
) -> Result<impl IntoResponse, ApiError>
where
    B: Bridge + 'static,
{
    let status = state.bridge.restart(&tenant).await?;
    Ok(Json(StatusResponse::new(&tenant, status)))
}

/// Delete a bot, erasing its remote session.
///
/// # Errors
///
/// Returns an error if the remote session cannot be erased.
pub async fn delete_bot<B>(
    State(state): State<Arc<GatewayState<B>>>,
    BotTenant(tenant): BotTenant,
) -> Result<impl IntoResponse, ApiError>
where
    B: Bridge + 'static,
{
    state.bridge.delete_tenant(&tenant.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Change which chats a bot handles.
///
/// # Errors
///
/// Returns an error if the filters cannot be persisted.
pub async fn update_filters<B>(
    State(state): State<Arc<GatewayState<B>>>,
    BotTenant(tenant): BotTenant,
    Json(body): Json<FiltersBody>,
) -> Result<impl IntoResponse, ApiError>
where
    B: Bridge + 'static,
{
    state
        .bridge
        .update_filters(&tenant, body.handle_groups, body.handle_broadcast)?;
    Ok(Json(BotInfoResponse::from(tenant.as_ref())))
}

/// Start pairing and return the first pairing code.
///
/// Pairing continues in the background after the code is returned.
///
/// # Errors
///
/// Returns an error if the bot is already paired, or no code arrives in
/// time.
pub async fn pair<B>(
    State(state): State<Arc<GatewayState<B>>>,
    BotTenant(tenant): BotTenant,
) -> Result<impl IntoResponse, ApiError>
where
    B: Bridge + 'static,
{
    let (tx, mut rx) = mpsc::channel(4);
    let bridge = Arc::clone(&state.bridge);
    let pairing = Arc::clone(&tenant);
    let task = tokio::spawn(async move { bridge.pair(&pairing, tx).await });

    match tokio::time::timeout(state.config.pair_timeout(), rx.recv()).await {
        Ok(Some(code)) => Ok(Json(PairResponse { code })),
        Ok(None) => match task.await {
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(())) => Err(ApiError::Conflict("pairing ended without a code".into())),
            Err(e) => Err(ApiError::Internal(format!("pairing task failed: {e}"))),
        },
        Err(_) => {
            tracing::warn!(tenant_id = %tenant.id(), "Timed out waiting for a pairing code");
            Err(ApiError::Unavailable(
                "timed out waiting for a pairing code".into(),
            ))
        }
    }
}

// =============================================================================
// Messaging
// =============================================================================

/// Send a message.
///
/// The track id is taken from the `trackid` query parameter or the
/// `X-Bridge-TrackId` header, in that order.
///
/// # Errors
///
/// Returns an error if the bot is not ready, the request is invalid or the
/// backend rejects the message.
pub async fn send<B>(
    State(state): State<Arc<GatewayState<B>>>,
    BotTenant(tenant): BotTenant,
    Query(query): Query<SendQuery>,
    headers: HeaderMap,
    Json(body): Json<SendBody>,
) -> Result<impl IntoResponse, ApiError>
where
    B: Bridge + 'static,
{
    let track_id = resolve_track_id(query.trackid.as_deref(), &headers);
    let mut outbound =
        OutboundMessage::text(body.recipient, body.message.unwrap_or_default());
    if let Some(attachment) = body.attachment {
        outbound.attachment = Some(decode_attachment(attachment)?);
    }
    if let Some(track_id) = track_id {
        outbound = outbound.with_track_id(track_id);
    }

    let sent = state.bridge.send(&tenant, outbound).await?;
    Ok(Json(sent))
}

/// Poll cached messages newer than `timestamp`, oldest first.
///
/// # Errors
///
/// Returns an error if the bot is not ready or the timestamp is invalid.
pub async fn receive<B>(
    State(state): State<Arc<GatewayState<B>>>,
    BotTenant(tenant): BotTenant,
    Query(query): Query<ReceiveQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    B: Bridge + 'static,
{
    let since = parse_since(query.timestamp)?;
    let messages = state.bridge.receive(&tenant, since)?;
    Ok(Json(ReceiveResponse {
        total: messages.len(),
        messages,
    }))
}

/// Download the attachment of a cached message as raw bytes.
///
/// # Errors
///
/// Returns an error if neither `id` nor `url` is given, the message is not
/// cached, or it carries no attachment.
pub async fn download<B>(
    State(state): State<Arc<GatewayState<B>>>,
    BotTenant(tenant): BotTenant,
    Json(body): Json<AttachmentRequest>,
) -> Result<Response, ApiError>
where
    B: Bridge + 'static,
{
    let id = attachment_id(&body)
        .ok_or_else(|| ApiError::BadRequest("missing attachment id or url".into()))?;
    let attachment = state.bridge.download(&tenant, &id).await?;
    attachment_response(attachment)
}

/// Get the invite link of a group.
///
/// # Errors
///
/// Returns an error if the bot is not ready or the group is unknown.
pub async fn invite_link<B>(
    State(state): State<Arc<GatewayState<B>>>,
    BotTenant(tenant): BotTenant,
    Path((_, group_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    B: Bridge + 'static,
{
    let link = state.bridge.invite_link(&tenant, &group_id).await?;
    Ok(Json(InviteResponse { group_id, link }))
}

/// Get the profile picture of a chat.
///
/// # Errors
///
/// Returns an error if the bot is not ready.
pub async fn profile_picture<B>(
    State(state): State<Arc<GatewayState<B>>>,
    BotTenant(tenant): BotTenant,
    Path((_, chat_id)): Path<(String, String)>,
    Query(query): Query<PictureQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    B: Bridge + 'static,
{
    let picture = state
        .bridge
        .profile_picture(&tenant, &chat_id, query.known_id.as_deref())
        .await?;
    Ok(Json(PictureResponse { picture }))
}

/// Get the display title of a chat.
///
/// # Errors
///
/// Returns an error if the bot is not ready.
pub async fn chat<B>(
    State(state): State<Arc<GatewayState<B>>>,
    BotTenant(tenant): BotTenant,
    Path((_, chat_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    B: Bridge + 'static,
{
    let title = state.bridge.title(&tenant, &chat_id).await?;
    Ok(Json(ChatResponse { chat_id, title }))
}

// =============================================================================
// Helpers
// =============================================================================

fn resolve_track_id(query: Option<&str>, headers: &HeaderMap) -> Option<String> {
    query
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or_else(|| {
            headers
                .get(TRACK_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|t| !t.is_empty())
        })
        .map(str::to_string)
}

fn decode_attachment(body: AttachmentBody) -> Result<Attachment, ApiError> {
    if body.mime_type.trim().is_empty() {
        return Err(ApiError::BadRequest("attachment mime_type is required".into()));
    }
    let content = BASE64
        .decode(body.base64.trim())
        .map_err(|e| ApiError::BadRequest(format!("invalid attachment base64: {e}")))?;
    Ok(Attachment::with_content(body.mime_type, body.file_name, content))
}

fn parse_since(timestamp: Option<i64>) -> Result<DateTime<Utc>, ApiError> {
    let secs = timestamp.unwrap_or(0);
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid timestamp: {secs}")))
}

fn attachment_id(request: &AttachmentRequest) -> Option<String> {
    let from_id = request.id.as_deref().map(str::trim).filter(|id| !id.is_empty());
    let from_url = || {
        request
            .url
            .as_deref()
            .map(|url| url.split(['?', '#']).next().unwrap_or_default())
            .and_then(|url| url.trim_end_matches('/').rsplit('/').next())
            .filter(|id| !id.is_empty())
    };
    from_id.or_else(from_url).map(str::to_string)
}

fn attachment_response(attachment: Attachment) -> Result<Response, ApiError> {
    let content_type = HeaderValue::from_str(&attachment.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = attachment
        .file_name
        .as_deref()
        .map(|name| name.replace(['"', '\r', '\n'], ""))
        .and_then(|name| HeaderValue::from_str(&format!("attachment; filename=\"{name}\"")).ok())
        .unwrap_or_else(|| HeaderValue::from_static("attachment"));
    let content = attachment
        .content
        .ok_or_else(|| ApiError::NotFound("attachment content".into()))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_id_prefers_query() {
        let mut headers = HeaderMap::new();
        headers.insert(TRACK_ID_HEADER, HeaderValue::from_static("from-header"));

        assert_eq!(
            resolve_track_id(Some("from-query"), &headers).as_deref(),
            Some("from-query")
        );
        assert_eq!(
            resolve_track_id(Some("  "), &headers).as_deref(),
            Some("from-header")
        );
        assert_eq!(resolve_track_id(None, &HeaderMap::new()), None);
    }

    #[test]
    fn attachment_id_from_url() {
        let request = AttachmentRequest {
            id: None,
            url: Some("https://bridge.example/v2/bot/tok/attachment/ABC123?x=1".into()),
        };
        assert_eq!(attachment_id(&request).as_deref(), Some("ABC123"));

        let request = AttachmentRequest {
            id: Some("xyz".into()),
            url: Some("https://bridge.example/other".into()),
        };
        assert_eq!(attachment_id(&request).as_deref(), Some("xyz"));

        let request = AttachmentRequest { id: None, url: None };
        assert_eq!(attachment_id(&request), None);
    }

    #[test]
    fn attachment_decoding() {
        let attachment = decode_attachment(AttachmentBody {
            mime_type: "image/png".into(),
            file_name: Some("a.png".into()),
            base64: BASE64.encode([1u8, 2, 3]),
        })
        .unwrap();
        assert_eq!(attachment.length, 3);
        assert_eq!(attachment.content.as_deref(), Some(&[1u8, 2, 3][..]));

        assert!(decode_attachment(AttachmentBody {
            mime_type: "image/png".into(),
            file_name: None,
            base64: "not base64!".into(),
        })
        .is_err());
    }

    #[test]
    fn since_defaults_to_epoch() {
        assert_eq!(parse_since(None).unwrap().timestamp(), 0);
        assert_eq!(parse_since(Some(1_700_000_000)).unwrap().timestamp(), 1_700_000_000);
        assert!(parse_since(Some(i64::MAX)).is_err());
    }
}
