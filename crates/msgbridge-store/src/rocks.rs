//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::Arc;

use msgbridge_core::TenantId;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use parking_lot::Mutex;

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::types::{TenantRecord, WebhookEndpoint};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serializes writes to the token index: the ownership check and the
    /// batch that claims a token must not interleave.
    token_claims: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        tracing::debug!(path = %path.as_ref().display(), "opening store");

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            token_claims: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Resolve a token to the tenant ID it is indexed under.
    fn tenant_id_for_token(&self, token: &str) -> Result<Option<TenantId>> {
        let cf = self.cf(cf::TENANTS_BY_TOKEN)?;

        self.db
            .get_cf(&cf, keys::token_key(token))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|value| {
                keys::decode_tenant_id(&value)
                    .ok_or_else(|| StoreError::Serialization("corrupt token index".into()))
            })
            .transpose()
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Tenant Operations
    // =========================================================================

    fn put_tenant(&self, tenant: &TenantRecord) -> Result<()> {
        let cf_tenants = self.cf(cf::TENANTS)?;
        let cf_by_token = self.cf(cf::TENANTS_BY_TOKEN)?;

        let _claim = self.token_claims.lock();
        if let Some(owner) = self.tenant_id_for_token(&tenant.token)? {
            if owner != tenant.tenant_id {
                return Err(StoreError::Conflict(format!(
                    "token already assigned to tenant {owner}"
                )));
            }
        }

        let tenant_key = keys::tenant_key(&tenant.tenant_id);
        let value = Self::serialize(tenant)?;

        // Check if tenant exists to handle token index updates
        let old_token = self
            .get_tenant(&tenant.tenant_id)?
            .map(|t| t.token)
            .filter(|token| *token != tenant.token);

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_tenants, &tenant_key, &value);

        if let Some(old) = old_token {
            batch.delete_cf(&cf_by_token, keys::token_key(&old));
        }
        batch.put_cf(&cf_by_token, keys::token_key(&tenant.token), &tenant_key);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_tenant(&self, tenant_id: &TenantId) -> Result<Option<TenantRecord>> {
        let cf = self.cf(cf::TENANTS)?;
        let key = keys::tenant_key(tenant_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn get_tenant_by_token(&self, token: &str) -> Result<Option<TenantRecord>> {
        match self.tenant_id_for_token(token)? {
            Some(tenant_id) => self.get_tenant(&tenant_id),
            None => Ok(None),
        }
    }

    fn delete_tenant(&self, tenant_id: &TenantId) -> Result<()> {
        let cf_tenants = self.cf(cf::TENANTS)?;
        let cf_by_token = self.cf(cf::TENANTS_BY_TOKEN)?;

        let _claim = self.token_claims.lock();

        // Get the tenant to find its token
        let tenant = self.get_tenant(tenant_id)?.ok_or(StoreError::NotFound)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_tenants, keys::tenant_key(tenant_id));
        batch.delete_cf(&cf_by_token, keys::token_key(&tenant.token));

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn list_tenants(&self) -> Result<Vec<TenantRecord>> {
        let cf = self.cf(cf::TENANTS)?;

        let mut tenants = Vec::new();
        let iter = self.db.iterator_cf(&cf, IteratorMode::Start);

        for item in iter {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let tenant: TenantRecord = Self::deserialize(&value)?;
            tenants.push(tenant);
        }

        Ok(tenants)
    }

    // =========================================================================
    // Webhook Operations
    // =========================================================================

    fn put_webhook(&self, tenant_id: &TenantId, webhook: &WebhookEndpoint) -> Result<()> {
        let cf = self.cf(cf::WEBHOOKS)?;
        let key = keys::webhook_key(tenant_id, &webhook.url);
        let value = Self::serialize(webhook)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn delete_webhook(&self, tenant_id: &TenantId, url: &str) -> Result<()> {
        let cf = self.cf(cf::WEBHOOKS)?;
        let key = keys::webhook_key(tenant_id, url);

        let exists = self
            .db
            .get_cf(&cf, &key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();
        if !exists {
            return Err(StoreError::NotFound);
        }

        self.db
            .delete_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn list_webhooks(&self, tenant_id: &TenantId) -> Result<Vec<WebhookEndpoint>> {
        let cf = self.cf(cf::WEBHOOKS)?;
        let prefix = keys::tenant_prefix(tenant_id);

        let mut webhooks = Vec::new();
        let iter = self.db.iterator_cf(
            &cf,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            // Stop if we're past the prefix
            if !key.starts_with(&prefix) {
                break;
            }

            webhooks.push(Self::deserialize(&value)?);
        }

        Ok(webhooks)
    }

    // =========================================================================
    // Session Blob Operations
    // =========================================================================

    fn put_session_blob(&self, tenant_id: &TenantId, blob: &[u8]) -> Result<()> {
        let cf = self.cf(cf::SESSIONS)?;

        self.db
            .put_cf(&cf, keys::session_key(tenant_id), blob)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_session_blob(&self, tenant_id: &TenantId) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(cf::SESSIONS)?;

        self.db
            .get_cf(&cf, keys::session_key(tenant_id))
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn delete_session_blob(&self, tenant_id: &TenantId) -> Result<()> {
        let cf = self.cf(cf::SESSIONS)?;

        self.db
            .delete_cf(&cf, keys::session_key(tenant_id))
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgbridge_core::Wid;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn create_test_tenant(token: &str) -> TenantRecord {
        TenantRecord::new(TenantId::generate(), token)
    }

    #[test]
    fn tenant_crud() {
        let (store, _dir) = create_test_store();
        let mut tenant = create_test_tenant("token-1");

        // Create
        store.put_tenant(&tenant).unwrap();

        // Read
        let retrieved = store.get_tenant(&tenant.tenant_id).unwrap().unwrap();
        assert_eq!(retrieved, tenant);

        // Update
        tenant.wid = Some(Wid::new("5511999999999@s.whatsapp.net").unwrap());
        tenant.handle_groups = true;
        store.put_tenant(&tenant).unwrap();
        let updated = store.get_tenant(&tenant.tenant_id).unwrap().unwrap();
        assert!(updated.handle_groups);
        assert_eq!(updated.phone().as_deref(), Some("5511999999999"));

        // Delete
        store.delete_tenant(&tenant.tenant_id).unwrap();
        assert!(store.get_tenant(&tenant.tenant_id).unwrap().is_none());
        assert!(store.get_tenant_by_token("token-1").unwrap().is_none());
    }

    #[test]
    fn delete_missing_tenant() {
        let (store, _dir) = create_test_store();
        let result = store.delete_tenant(&TenantId::generate());
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[test]
    fn token_index_follows_token_changes() {
        let (store, _dir) = create_test_store();
        let mut tenant = create_test_tenant("old-token");
        store.put_tenant(&tenant).unwrap();

        let found = store.get_tenant_by_token("old-token").unwrap().unwrap();
        assert_eq!(found.tenant_id, tenant.tenant_id);

        tenant.token = "new-token".to_string();
        store.put_tenant(&tenant).unwrap();

        assert!(store.get_tenant_by_token("old-token").unwrap().is_none());
        let found = store.get_tenant_by_token("new-token").unwrap().unwrap();
        assert_eq!(found.tenant_id, tenant.tenant_id);
    }

    #[test]
    fn token_conflict_rejected() {
        let (store, _dir) = create_test_store();
        store.put_tenant(&create_test_tenant("shared")).unwrap();

        let result = store.put_tenant(&create_test_tenant("shared"));
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[test]
    fn concurrent_token_claims_have_one_winner() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let tenant = create_test_tenant("contested");
                    store.put_tenant(&tenant).map(|()| tenant.tenant_id)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(StoreError::Conflict(_)))));

        let indexed = store.get_tenant_by_token("contested").unwrap().unwrap();
        assert_eq!(&indexed.tenant_id, winners[0]);
        assert_eq!(store.list_tenants().unwrap().len(), 1);
    }

    #[test]
    fn list_tenants() {
        let (store, _dir) = create_test_store();
        for i in 0..3 {
            store
                .put_tenant(&create_test_tenant(&format!("token-{i}")))
                .unwrap();
        }

        assert_eq!(store.list_tenants().unwrap().len(), 3);
    }

    #[test]
    fn webhook_crud() {
        let (store, _dir) = create_test_store();
        let tenant_a = TenantId::generate();
        let tenant_b = TenantId::generate();

        let mut hook = WebhookEndpoint::new("https://a.example/hook");
        store.put_webhook(&tenant_a, &hook).unwrap();
        store
            .put_webhook(&tenant_a, &WebhookEndpoint::new("https://b.example/hook"))
            .unwrap();
        store
            .put_webhook(&tenant_b, &WebhookEndpoint::new("https://a.example/hook"))
            .unwrap();

        assert_eq!(store.list_webhooks(&tenant_a).unwrap().len(), 2);
        assert_eq!(store.list_webhooks(&tenant_b).unwrap().len(), 1);

        // Same URL replaces the endpoint
        hook.forward_internal = true;
        hook.track_id = Some("abc".into());
        store.put_webhook(&tenant_a, &hook).unwrap();
        let hooks = store.list_webhooks(&tenant_a).unwrap();
        assert_eq!(hooks.len(), 2);
        assert!(hooks.iter().any(|h| h.forward_internal && h.track_id_or_empty() == "abc"));

        store
            .delete_webhook(&tenant_a, "https://a.example/hook")
            .unwrap();
        assert_eq!(store.list_webhooks(&tenant_a).unwrap().len(), 1);
        assert_eq!(store.list_webhooks(&tenant_b).unwrap().len(), 1);

        let missing = store.delete_webhook(&tenant_a, "https://a.example/hook");
        assert!(matches!(missing, Err(StoreError::NotFound)));
    }

    #[test]
    fn session_blob_crud() {
        let (store, _dir) = create_test_store();
        let tenant_id = TenantId::generate();

        assert!(store.get_session_blob(&tenant_id).unwrap().is_none());

        store.put_session_blob(&tenant_id, b"opaque").unwrap();
        assert_eq!(
            store.get_session_blob(&tenant_id).unwrap().as_deref(),
            Some(&b"opaque"[..])
        );

        store.delete_session_blob(&tenant_id).unwrap();
        assert!(store.get_session_blob(&tenant_id).unwrap().is_none());

        // Deleting again is fine
        store.delete_session_blob(&tenant_id).unwrap();
    }

    #[test]
    fn reopen_keeps_data() {
        let dir = TempDir::new().unwrap();
        let tenant = create_test_tenant("persisted");
        {
            let store = RocksStore::open(dir.path()).unwrap();
            store.put_tenant(&tenant).unwrap();
            store.put_session_blob(&tenant.tenant_id, b"blob").unwrap();
        }

        let store = RocksStore::open(dir.path()).unwrap();
        let found = store.get_tenant_by_token("persisted").unwrap().unwrap();
        assert_eq!(found.tenant_id, tenant.tenant_id);
        assert!(store.get_session_blob(&tenant.tenant_id).unwrap().is_some());
    }
}
