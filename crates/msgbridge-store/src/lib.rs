//! `RocksDB` storage layer for msgbridge.
//!
//! This crate provides persistent storage for tenant configuration, webhook
//! endpoints and connection session blobs using `RocksDB` with column
//! families for efficient indexing.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `tenants`: Primary tenant records, keyed by `tenant_id`
//! - `tenants_by_token`: Index for resolving the token in HTTP paths
//! - `webhooks`: Webhook endpoints, keyed by `tenant_id || url`
//! - `sessions`: Opaque session blobs handed out by connection backends
//!
//! # Example
//!
//! ```no_run
//! use msgbridge_store::{RocksStore, Store};
//!
//! let store = RocksStore::open("/tmp/msgbridge-db").unwrap();
//!
//! // Resolve the tenant behind an HTTP token
//! let tenant = store.get_tenant_by_token("3f1c...").unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;
pub use types::{TenantRecord, WebhookEndpoint};

use msgbridge_core::TenantId;

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, in-memory for testing).
pub trait Store: Send + Sync {
    // =========================================================================
    // Tenant Operations
    // =========================================================================

    /// Insert or update a tenant record.
    ///
    /// This also maintains the token index.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the token belongs to another tenant.
    fn put_tenant(&self, tenant: &TenantRecord) -> Result<()>;

    /// Get a tenant by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_tenant(&self, tenant_id: &TenantId) -> Result<Option<TenantRecord>>;

    /// Get a tenant by its HTTP token.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_tenant_by_token(&self, token: &str) -> Result<Option<TenantRecord>>;

    /// Delete a tenant by ID.
    ///
    /// This also removes the tenant from the token index. Webhooks and the
    /// session blob are left to their own delete operations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the tenant doesn't exist.
    fn delete_tenant(&self, tenant_id: &TenantId) -> Result<()>;

    /// List all tenants in the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_tenants(&self) -> Result<Vec<TenantRecord>>;

    // =========================================================================
    // Webhook Operations
    // =========================================================================

    /// Insert or replace a webhook endpoint, matched by URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_webhook(&self, tenant_id: &TenantId, webhook: &WebhookEndpoint) -> Result<()>;

    /// Delete the webhook endpoint with the given URL.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no such endpoint exists.
    fn delete_webhook(&self, tenant_id: &TenantId, url: &str) -> Result<()>;

    /// List all webhook endpoints of a tenant.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_webhooks(&self, tenant_id: &TenantId) -> Result<Vec<WebhookEndpoint>>;

    // =========================================================================
    // Session Blob Operations
    // =========================================================================

    /// Persist the opaque session blob of a tenant's connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_session_blob(&self, tenant_id: &TenantId, blob: &[u8]) -> Result<()>;

    /// Load the session blob of a tenant, if one was persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_session_blob(&self, tenant_id: &TenantId) -> Result<Option<Vec<u8>>>;

    /// Remove the session blob of a tenant. Missing blobs are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_session_blob(&self, tenant_id: &TenantId) -> Result<()>;
}
