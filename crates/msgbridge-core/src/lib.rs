//! Core types and utilities for msgbridge.
//!
//! This crate provides the foundational types used throughout the gateway:
//!
//! - **Identifiers**: Strongly-typed IDs for tenants, network identities and messages
//! - **Messages**: The message model cached per tenant and forwarded to webhooks
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use msgbridge_core::{Message, MessageId, Wid};
//!
//! // Message ids compare case-insensitively
//! assert_eq!(MessageId::new("3eb0abc"), MessageId::new("3EB0ABC"));
//!
//! // A wid knows its phone number
//! let wid = Wid::new("5511999999999.0:3@s.whatsapp.net").unwrap();
//! assert_eq!(wid.phone(), "5511999999999");
//!
//! // Group chats are recognized by their chat id
//! let msg = Message::text("abc", "120363-1234@g.us", "hello");
//! assert!(msg.is_from_group());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod message;

pub use error::{CoreError, Result};
pub use ids::{IdError, MessageId, TenantId, Wid};
pub use message::{
    format_chat_id, Attachment, Chat, Message, MessageKind, OutboundMessage, Participant,
};
