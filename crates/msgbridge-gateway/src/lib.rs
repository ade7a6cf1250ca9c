//! HTTP gateway for msgbridge.
//!
//! This crate exposes every tenant ("bot") over HTTP. It handles:
//!
//! - Resolving the bot token in the request path
//! - Sending messages and polling the received-message cache
//! - Attachment download, pairing and connection lifecycle
//! - Webhook configuration and internal provisioning endpoints
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     HTTP clients                            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   msgbridge-gateway                         │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐   │
//! │  │  BotTenant  │ │   Router    │ │    Internal         │   │
//! │  │  Extractor  │ │  + Handlers │ │    Provisioning     │   │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                    ┌──────────────────┐
//!                    │  BridgeService   │
//!                    │  (control)       │
//!                    └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use msgbridge_connection::OfflineFactory;
//! use msgbridge_control::BridgeService;
//! use msgbridge_gateway::{create_router, GatewayConfig, GatewayState};
//! use msgbridge_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/msgbridge")?);
//! let bridge = Arc::new(BridgeService::with_defaults(store, Arc::new(OfflineFactory))?);
//! bridge.start().await?;
//!
//! let state = GatewayState::new(bridge, GatewayConfig::default());
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use error::ApiError;
pub use extract::BotTenant;
pub use routes::create_router;
pub use state::GatewayState;
