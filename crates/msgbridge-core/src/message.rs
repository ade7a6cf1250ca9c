//! Message model shared by the connection backends, the cache and the
//! webhook dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::MessageId;

/// Chat id suffix used by group conversations.
pub const GROUP_SUFFIX: &str = "@g.us";

/// Chat id suffix used by broadcast lists and status updates.
pub const BROADCAST_SUFFIX: &str = "@broadcast";

/// Chat id suffix used by direct conversations with a user.
pub const USER_SUFFIX: &str = "@s.whatsapp.net";

/// The kind of content carried by a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Content the gateway does not understand.
    #[default]
    Unknown,
    /// An image attachment.
    Image,
    /// A generic document attachment.
    Document,
    /// An audio clip or voice note.
    Audio,
    /// A video attachment.
    Video,
    /// Plain text.
    Text,
}

impl MessageKind {
    /// Classify an attachment by its MIME type.
    #[must_use]
    pub fn from_mime(mime_type: &str) -> Self {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.split('/').next() {
            Some("image") => Self::Image,
            Some("audio") => Self::Audio,
            Some("video") => Self::Video,
            Some("") | None => Self::Unknown,
            Some(_) => Self::Document,
        }
    }
}

/// A conversation a message belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Chat identifier (`<user>@s.whatsapp.net`, `<group>@g.us`, ...).
    pub id: String,
    /// Best-effort display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Chat {
    /// Create a chat reference without a title.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
        }
    }
}

/// The sender of a message inside a group chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Participant identifier.
    pub id: String,
    /// Best-effort display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Attachment descriptor carried by a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// MIME type of the content.
    pub mime_type: String,
    /// Original file name, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Content length in bytes.
    #[serde(default)]
    pub length: u64,
    /// Download URL exposed to HTTP clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Content already held in memory. Never serialized.
    #[serde(skip)]
    pub content: Option<Vec<u8>>,
}

impl Attachment {
    /// Create an attachment holding its content in memory.
    #[must_use]
    pub fn with_content(mime_type: impl Into<String>, file_name: Option<String>, content: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            file_name,
            length: content.len() as u64,
            url: None,
            content: Some(content),
        }
    }

    /// The message kind implied by this attachment.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        MessageKind::from_mime(&self.mime_type)
    }
}

/// A message observed on, or sent to, the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Normalized message id.
    pub id: MessageId,
    /// When the message was sent.
    pub timestamp: DateTime<Utc>,
    /// Conversation the message belongs to.
    pub chat: Chat,
    /// Group participant who sent the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<Participant>,
    /// Text body, or caption for attachments.
    #[serde(default)]
    pub text: String,
    /// Content kind.
    #[serde(default)]
    pub kind: MessageKind,
    /// Attachment descriptor, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    /// Correlation id of the send request that produced this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
    /// True when the message was sent through this gateway.
    #[serde(default)]
    pub from_internal: bool,
}

impl Message {
    /// Create a plain text message.
    #[must_use]
    pub fn text(id: impl AsRef<str>, chat_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(id),
            timestamp: Utc::now(),
            chat: Chat::new(chat_id),
            participant: None,
            text: text.into(),
            kind: MessageKind::Text,
            attachment: None,
            track_id: None,
            from_internal: false,
        }
    }

    /// Returns true if the message was posted in a group chat.
    #[must_use]
    pub fn is_from_group(&self) -> bool {
        self.chat.id.ends_with(GROUP_SUFFIX)
    }

    /// Returns true if the message came from a broadcast list or status.
    #[must_use]
    pub fn is_from_broadcast(&self) -> bool {
        self.chat.id.ends_with(BROADCAST_SUFFIX)
    }

    /// Returns true if the message carries an attachment.
    #[must_use]
    pub const fn has_attachment(&self) -> bool {
        self.attachment.is_some()
    }

    /// The track id, or an empty string when the message has none.
    #[must_use]
    pub fn track_id_or_empty(&self) -> &str {
        self.track_id.as_deref().unwrap_or_default()
    }
}

/// A message the gateway has been asked to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Id to send the message with; generated by the backend when `None`.
    pub id: Option<MessageId>,
    /// Destination chat id.
    pub chat_id: String,
    /// Text body, or caption for attachments.
    pub text: String,
    /// Attachment to upload.
    pub attachment: Option<Attachment>,
    /// Correlation id supplied by the caller.
    pub track_id: Option<String>,
}

impl OutboundMessage {
    /// Create a text message for the given chat.
    #[must_use]
    pub fn text(chat_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: None,
            chat_id: chat_id.into(),
            text: text.into(),
            attachment: None,
            track_id: None,
        }
    }

    /// Attach a track id.
    #[must_use]
    pub fn with_track_id(mut self, track_id: impl Into<String>) -> Self {
        let track_id = track_id.into();
        self.track_id = (!track_id.is_empty()).then_some(track_id);
        self
    }

    /// The content kind this message will be sent as.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.attachment
            .as_ref()
            .map_or(MessageKind::Text, Attachment::kind)
    }

    /// Build the message as it will appear in the cache once sent.
    #[must_use]
    pub fn into_sent(self, id: MessageId, timestamp: DateTime<Utc>) -> Message {
        let kind = self.kind();
        Message {
            id,
            timestamp,
            chat: Chat::new(self.chat_id),
            participant: None,
            text: self.text,
            kind,
            attachment: self.attachment,
            track_id: self.track_id,
            from_internal: true,
        }
    }
}

/// Normalize a recipient into a chat id the network accepts.
///
/// A leading `+` and whitespace are dropped. The recipient must carry a
/// server part, and only direct and group chats can be addressed.
///
/// Returns `None` when the recipient cannot be used.
#[must_use]
pub fn format_chat_id(recipient: &str) -> Option<String> {
    let compact: String = recipient
        .trim()
        .trim_start_matches('+')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let (user, server) = compact.split_once('@')?;
    let addressable = [&USER_SUFFIX[1..], &GROUP_SUFFIX[1..]];
    (!user.is_empty() && addressable.contains(&server)).then_some(compact)
}
