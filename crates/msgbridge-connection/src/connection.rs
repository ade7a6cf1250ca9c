//! The connection abstraction implemented by every backend.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use msgbridge_core::{Attachment, Message, MessageId, OutboundMessage, Wid};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{ConnectionError, Result};
use crate::status::{derive_status, ConnectionSignals, ConnectionStatus};

/// Receiver of inbound messages observed by a connection.
///
/// Delivery must not block: implementations hand the message off and
/// return.
pub trait InboundSink: Send + Sync {
    /// Accept one inbound message.
    fn deliver(&self, message: Message);
}

/// Result of a successful send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Id assigned to the sent message.
    pub id: MessageId,
    /// When the network accepted the message.
    pub timestamp: DateTime<Utc>,
}

/// Profile picture information for a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePicture {
    /// Chat the picture belongs to.
    pub chat_id: String,
    /// Picture version id.
    pub id: String,
    /// Download URL.
    pub url: String,
}

/// A live connection of one tenant to the messaging network.
///
/// A connection is single-use: once `dispose` has been called every
/// operation fails with [`ConnectionError::Disposed`] and reconnecting
/// requires a fresh object from a
/// [`ConnectionFactory`](crate::factory::ConnectionFactory).
#[async_trait]
pub trait Connection: Send + Sync {
    /// Backend name and version.
    fn version(&self) -> String;

    /// Raw transport signals.
    fn signals(&self) -> ConnectionSignals;

    /// Status derived from [`Connection::signals`].
    fn status(&self) -> ConnectionStatus {
        derive_status(self.signals())
    }

    /// Establish the transport and authenticate with the stored session.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be established.
    async fn connect(&self) -> Result<()>;

    /// Drop the transport, keeping the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection was already disposed.
    async fn disconnect(&self) -> Result<()>;

    /// Network identity of the paired account.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::IdentityUnknown`] if not paired.
    fn wid(&self) -> Result<Wid>;

    /// Best-effort display title of a chat.
    async fn title(&self, chat_id: &str) -> Option<String>;

    /// Start pairing, streaming codes into `sink` until paired or the
    /// receiver is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if pairing cannot be started.
    async fn pair(&self, sink: mpsc::Sender<String>) -> Result<()>;

    /// Invite link of a group.
    ///
    /// # Errors
    ///
    /// Returns an error if the group is unknown or the network refuses.
    async fn invite_link(&self, group_id: &str) -> Result<String>;

    /// Profile picture of a chat.
    ///
    /// Returns `None` when the chat has no picture or its current picture
    /// id equals `known_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the network request fails.
    async fn profile_picture(
        &self,
        chat_id: &str,
        known_id: Option<&str>,
    ) -> Result<Option<ProfilePicture>>;

    /// Download the attachment of a message.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NoAttachment`] if nothing can be downloaded.
    async fn download(&self, message: &Message) -> Result<Attachment>;

    /// Send a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be delivered to the network.
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt>;

    /// Replace the receiver of inbound messages.
    fn set_sink(&self, sink: Arc<dyn InboundSink>);

    /// Opaque session bytes to persist after a successful connect.
    fn session_blob(&self) -> Option<Vec<u8>>;

    /// Release every resource held by the connection. Idempotent.
    async fn dispose(&self);

    /// Log out on the network, erasing the remote session, then dispose.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::IdentityUnknown`] if never paired.
    async fn delete(&self) -> Result<()>;
}

/// Delete a connection, treating a never-paired account as already erased.
///
/// # Errors
///
/// Returns any other error reported by [`Connection::delete`].
pub async fn erase(connection: &dyn Connection) -> Result<()> {
    match connection.delete().await {
        Ok(()) => Ok(()),
        Err(ConnectionError::IdentityUnknown) => {
            tracing::debug!("erasing connection without identity");
            connection.dispose().await;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Resolve an attachment from content already carried by the message.
///
/// # Errors
///
/// Returns [`ConnectionError::NoAttachment`] if the message has no
/// attachment or its content is not held in memory.
pub fn attachment_from_message(message: &Message) -> Result<Attachment> {
    message
        .attachment
        .as_ref()
        .filter(|a| a.content.is_some())
        .cloned()
        .ok_or(ConnectionError::NoAttachment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_fallback_requires_content() {
        let mut msg = Message::text("a", "5511@s.whatsapp.net", "");
        assert!(matches!(
            attachment_from_message(&msg),
            Err(ConnectionError::NoAttachment)
        ));

        msg.attachment = Some(Attachment {
            mime_type: "image/png".into(),
            file_name: None,
            length: 10,
            url: Some("https://cdn.example/a".into()),
            content: None,
        });
        assert!(matches!(
            attachment_from_message(&msg),
            Err(ConnectionError::NoAttachment)
        ));

        msg.attachment = Some(Attachment::with_content("image/png", None, vec![7; 10]));
        let attachment = attachment_from_message(&msg).unwrap();
        assert_eq!(attachment.content.as_deref(), Some(&[7u8; 10][..]));
    }
}
