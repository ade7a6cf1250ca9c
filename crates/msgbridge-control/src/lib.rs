//! Tenant orchestration for msgbridge.
//!
//! This crate provides the core business logic of the gateway: the
//! per-tenant message cache and event handler registry, webhook fan-out,
//! the directory of active tenants, and the [`BridgeService`] that ties
//! them to the storage layer and the connection backends.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Gateway (HTTP)                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      BridgeService                          │
//! │  ┌─────────────┐ ┌─────────────────────────────────────┐   │
//! │  │  Tenant     │ │  Tenant                             │   │
//! │  │  Directory  │ │  ┌──────────────┐ ┌──────────────┐ │   │
//! │  │             │ │  │ Handlers     │ │ Webhook      │ │   │
//! │  │             │ │  │ (cache)      │▶│ Dispatcher   │ │   │
//! │  └─────────────┘ │  └──────────────┘ └──────────────┘ │   │
//! │                  └─────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌────────────┐  ┌──────────┐
//!        │  Store   │   │ Connection │  │ Webhook  │
//!        │ (RocksDB)│   │  backends  │  │ (HTTP)   │
//!        └──────────┘   └────────────┘  └──────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use msgbridge_connection::OfflineFactory;
//! use msgbridge_control::{Bridge, BridgeService, CreateTenantRequest};
//! use msgbridge_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/msgbridge")?);
//! let bridge = BridgeService::with_defaults(store, Arc::new(OfflineFactory))?;
//!
//! // Load persisted tenants, then register a new one
//! bridge.start().await?;
//! let tenant = bridge.create_tenant(CreateTenantRequest::for_owner("ops")).await?;
//!
//! println!("Created tenant {} with token {}", tenant.id(), tenant.token());
//! # Ok(())
//! # }
//! ```
//!
//! # Message flow
//!
//! Inbound messages reach [`TenantHandlers::ingest`], which filters them,
//! caches them by normalized id and dispatches them to every registered
//! [`EventHandler`]. The [`WebhookDispatcher`] is one such handler. Messages
//! sent through [`Bridge::send`] are ingested the same way, flagged as
//! internal, which is what webhook loop prevention keys on.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod directory;
pub mod error;
pub mod handlers;
pub mod service;
pub mod tenant;
pub mod types;
pub mod webhook;

pub use directory::TenantDirectory;
pub use error::{ControlError, Result};
pub use handlers::{DispatchLimiter, EventHandler, IngestOutcome, TenantHandlers};
pub use service::{Bridge, BridgeService};
pub use tenant::Tenant;
pub use types::{ControlConfig, CreateTenantRequest};
pub use webhook::{should_forward, DeliveryError, WebhookDispatcher, WebhookPayload, WID_HEADER};

// Re-export commonly used types from dependencies for convenience
pub use msgbridge_connection::{BackendKind, ConnectionStatus, ProfilePicture};
pub use msgbridge_core::{Attachment, Message, MessageId, OutboundMessage, TenantId, Wid};
pub use msgbridge_store::{TenantRecord, WebhookEndpoint};
