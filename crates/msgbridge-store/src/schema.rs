//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary tenant records, keyed by `tenant_id`.
    pub const TENANTS: &str = "tenants";

    /// Index: tenants by token, keyed by `token`, value is `tenant_id`.
    pub const TENANTS_BY_TOKEN: &str = "tenants_by_token";

    /// Webhook endpoints, keyed by `tenant_id || url`.
    pub const WEBHOOKS: &str = "webhooks";

    /// Opaque connection session blobs, keyed by `tenant_id`.
    pub const SESSIONS: &str = "sessions";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::TENANTS, cf::TENANTS_BY_TOKEN, cf::WEBHOOKS, cf::SESSIONS]
}
