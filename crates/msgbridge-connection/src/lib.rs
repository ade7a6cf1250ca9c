//! Connection backends and status model for msgbridge.
//!
//! Each tenant owns one long-lived connection to the messaging network.
//! This crate defines what a connection can do, how its status is derived,
//! and how fresh connections are built.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  create   ┌──────────────────────┐
//! │  Tenant          │──────────▶│  ConnectionFactory   │
//! │  (control)       │           │  (trait)             │
//! └────────┬─────────┘           └──────────┬───────────┘
//!          │ Arc<dyn Connection>            │
//!          ▼                     ┌──────────┴───────────┐
//! ┌──────────────────┐           ▼                      ▼
//! │  Connection      │   ┌──────────────┐      ┌──────────────┐
//! │  (trait)         │   │   Offline    │      │    Mock      │
//! └────────┬─────────┘   │  (default)   │      │ (test-utils) │
//!          │ deliver     └──────────────┘      └──────────────┘
//!          ▼
//! ┌──────────────────┐
//! │  InboundSink     │
//! └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use msgbridge_connection::{derive_status, ConnectionSignals, ConnectionStatus};
//!
//! let signals = ConnectionSignals {
//!     transport_connected: true,
//!     authenticated: true,
//!     last_connect_attempt_failed: false,
//! };
//! assert_eq!(derive_status(signals), ConnectionStatus::Ready);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod connection;
pub mod error;
pub mod factory;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod offline;
pub mod status;

pub use connection::{
    attachment_from_message, erase, Connection, InboundSink, ProfilePicture, SendReceipt,
};
pub use error::{ConnectionError, Result};
pub use factory::{factory_for, BackendKind, ConnectionFactory};
#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockConnection, MockFactory};
pub use offline::{OfflineConnection, OfflineFactory};
pub use status::{derive_status, ConnectionSignals, ConnectionStatus};
