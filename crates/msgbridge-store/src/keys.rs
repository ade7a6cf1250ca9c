//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions to encode and decode keys for various indexes.
//! All keys are designed to support efficient prefix scans.

use msgbridge_core::TenantId;

/// Encode a tenant key (just the tenant ID bytes).
#[must_use]
pub fn tenant_key(tenant_id: &TenantId) -> Vec<u8> {
    tenant_id.as_bytes().to_vec()
}

/// Encode a token index key.
#[must_use]
pub fn token_key(token: &str) -> Vec<u8> {
    token.as_bytes().to_vec()
}

/// Decode a tenant ID stored as a token index value.
#[must_use]
pub fn decode_tenant_id(value: &[u8]) -> Option<TenantId> {
    let bytes: [u8; 16] = value.try_into().ok()?;
    Some(TenantId::from_uuid(uuid::Uuid::from_bytes(bytes)))
}

/// Encode a webhook key: `tenant_id || url`.
///
/// This allows efficient prefix scans for all webhooks of a tenant.
#[must_use]
pub fn webhook_key(tenant_id: &TenantId, url: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + url.len());
    key.extend_from_slice(tenant_id.as_bytes());
    key.extend_from_slice(url.as_bytes());
    key
}

/// Encode a tenant prefix for scanning all webhooks by tenant.
#[must_use]
pub fn tenant_prefix(tenant_id: &TenantId) -> Vec<u8> {
    tenant_id.as_bytes().to_vec()
}

/// Encode a session blob key.
#[must_use]
pub fn session_key(tenant_id: &TenantId) -> Vec<u8> {
    tenant_id.as_bytes().to_vec()
}
