//! Tenant orchestration.
//!
//! A [`Tenant`] ties together one persisted [`TenantRecord`], its message
//! cache and handler registry, its webhook dispatcher, and the current
//! connection. Lifecycle operations are serialized by an async guard so a
//! reconnect always disposes the previous connection before a new one is
//! built.

use std::sync::Arc;

use chrono::Utc;
use msgbridge_connection::{
    erase, Connection, ConnectionFactory, ConnectionStatus, InboundSink,
};
use msgbridge_core::{TenantId, Wid};
use msgbridge_store::{Store, TenantRecord};
use parking_lot::RwLock;

use crate::error::{ControlError, Result};
use crate::handlers::{DispatchLimiter, EventHandler, TenantHandlers};
use crate::types::ControlConfig;
use crate::webhook::WebhookDispatcher;

/// One bot: a single account on the messaging network.
pub struct Tenant {
    record: RwLock<TenantRecord>,
    handlers: Arc<TenantHandlers>,
    dispatcher: Arc<WebhookDispatcher>,
    connection: RwLock<Option<Arc<dyn Connection>>>,
    phase: RwLock<Option<ConnectionStatus>>,
    lifecycle: tokio::sync::Mutex<()>,
    store: Arc<dyn Store>,
    factory: Arc<dyn ConnectionFactory>,
}

impl Tenant {
    /// Create a tenant without a connection.
    ///
    /// The webhook dispatcher is registered on the handler registry right
    /// away; endpoints are configured separately.
    #[must_use]
    pub fn new(
        record: TenantRecord,
        store: Arc<dyn Store>,
        factory: Arc<dyn ConnectionFactory>,
        client: reqwest::Client,
        config: &ControlConfig,
    ) -> Self {
        let handlers = Arc::new(TenantHandlers::new(
            record.tenant_id,
            record.handle_groups,
            record.handle_broadcast,
            DispatchLimiter::new(config.max_inflight_dispatches),
        ));

        let dispatcher = Arc::new(WebhookDispatcher::new(record.tenant_id, client));
        dispatcher.set_wid(record.wid.clone());
        handlers.register(Arc::clone(&dispatcher) as Arc<dyn EventHandler>);

        Self {
            record: RwLock::new(record),
            handlers,
            dispatcher,
            connection: RwLock::new(None),
            phase: RwLock::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            store,
            factory,
        }
    }

    /// Tenant id.
    #[must_use]
    pub fn id(&self) -> TenantId {
        self.record.read().tenant_id
    }

    /// HTTP token.
    #[must_use]
    pub fn token(&self) -> String {
        self.record.read().token.clone()
    }

    /// Network identity, once paired.
    #[must_use]
    pub fn wid(&self) -> Option<Wid> {
        self.record.read().wid.clone()
    }

    /// Snapshot of the persisted record.
    #[must_use]
    pub fn record(&self) -> TenantRecord {
        self.record.read().clone()
    }

    /// Message cache and handler registry.
    #[must_use]
    pub fn handlers(&self) -> &Arc<TenantHandlers> {
        &self.handlers
    }

    /// Webhook dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<WebhookDispatcher> {
        &self.dispatcher
    }

    /// Current connection, if one has been built.
    #[must_use]
    pub fn connection(&self) -> Option<Arc<dyn Connection>> {
        self.connection.read().clone()
    }

    /// Apply a change to the record and persist it.
    ///
    /// Filters and identity are pushed to the live handlers and dispatcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be stored.
    pub fn persist_record(&self, change: impl FnOnce(&mut TenantRecord)) -> Result<TenantRecord> {
        // Held across read, store and write-back so concurrent changes to
        // different fields do not overwrite each other.
        let mut record = self.record.write();
        let mut updated = record.clone();
        change(&mut updated);
        updated.updated_at = Utc::now();

        self.store.put_tenant(&updated)?;
        self.handlers
            .set_filters(updated.handle_groups, updated.handle_broadcast);
        self.dispatcher.set_wid(updated.wid.clone());
        *record = updated.clone();

        Ok(updated)
    }

    /// Operational status.
    ///
    /// An explicit lifecycle phase wins; without a connection the tenant is
    /// `Created`; otherwise the connection's derived status is reported.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        if let Some(phase) = *self.phase.read() {
            return phase;
        }
        self.connection
            .read()
            .as_ref()
            .map_or(ConnectionStatus::Created, |c| c.status())
    }

    /// The connection, if the tenant is `Ready`.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::NotReady` with the current status otherwise.
    pub fn require_ready(&self) -> Result<Arc<dyn Connection>> {
        let status = self.status();
        if !status.is_ready() {
            return Err(ControlError::NotReady { status });
        }
        self.connection()
            .ok_or(ControlError::NotReady { status: ConnectionStatus::Created })
    }

    fn set_phase(&self, phase: Option<ConnectionStatus>) {
        *self.phase.write() = phase;
    }

    /// Build a fresh connection and connect it.
    ///
    /// Any previous connection is disposed first.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be built or established.
    /// The failed connection is kept so its status can be reported.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.connect_locked().await
    }

    /// Disconnect and dispose the current connection.
    ///
    /// # Errors
    ///
    /// Never fails today; the signature leaves room for backends that do.
    pub async fn disconnect(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let previous = self.connection.write().take();
        if let Some(connection) = previous {
            if let Err(e) = connection.disconnect().await {
                tracing::debug!(tenant_id = %self.id(), error = %e, "Disconnect before dispose failed");
            }
            connection.dispose().await;
        }
        self.handlers.set_attached(false);
        self.set_phase(Some(ConnectionStatus::Stopped));

        tracing::info!(tenant_id = %self.id(), "Tenant stopped");
        Ok(())
    }

    /// Dispose the current connection and connect a fresh one.
    ///
    /// # Errors
    ///
    /// Returns an error if the new connection cannot be established.
    pub async fn restart(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.set_phase(Some(ConnectionStatus::Restarting));
        self.release_connection().await;

        tracing::info!(tenant_id = %self.id(), "Restarting tenant");
        self.connect_locked().await
    }

    /// Erase the remote session and dispose the connection.
    ///
    /// Without a live connection (stopped, never connected in this process,
    /// or a retry after a failed erase) the persisted session is resumed on
    /// a fresh connection so it can still be logged out. A tenant that was
    /// never paired is deleted without error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to erase the remote session.
    pub async fn delete(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        self.set_phase(Some(ConnectionStatus::Halting));

        let previous = self.connection.write().take();
        self.handlers.set_attached(false);
        let connection = match previous {
            Some(connection) => Some(connection),
            None => self.resume_for_erase()?,
        };
        if let Some(connection) = connection {
            if let Err(e) = erase(connection.as_ref()).await {
                connection.dispose().await;
                return Err(e.into());
            }
        }
        self.handlers.clear();

        tracing::info!(tenant_id = %self.id(), "Tenant halted");
        Ok(())
    }

    /// Persist the session blob and identity a connection reports.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the update.
    pub fn sync_identity(&self, connection: &dyn Connection) -> Result<()> {
        let tenant_id = self.id();
        if let Some(blob) = connection.session_blob() {
            self.store.put_session_blob(&tenant_id, &blob)?;
        }

        if let Ok(wid) = connection.wid() {
            if self.wid().as_ref() != Some(&wid) {
                tracing::info!(tenant_id = %tenant_id, wid = %wid, "Tenant identity updated");
                self.persist_record(|r| {
                    r.wid = Some(wid);
                    r.verified = true;
                })?;
            }
        }

        Ok(())
    }

    async fn connect_locked(&self) -> Result<()> {
        self.set_phase(Some(ConnectionStatus::Starting));
        self.release_connection().await;

        let result = self.establish().await;
        self.set_phase(None);

        match &result {
            Ok(()) => tracing::info!(
                tenant_id = %self.id(),
                status = %self.status(),
                "Tenant connected"
            ),
            Err(e) => tracing::warn!(tenant_id = %self.id(), error = %e, "Tenant connect failed"),
        }
        result
    }

    fn resume_for_erase(&self) -> Result<Option<Arc<dyn Connection>>> {
        let record = self.record();
        let Some(session) = self.store.get_session_blob(&record.tenant_id)? else {
            return Ok(None);
        };

        tracing::debug!(tenant_id = %record.tenant_id, "Resuming stored session to erase it");
        Ok(Some(self.factory.create(&record, Some(session))?))
    }

    async fn release_connection(&self) {
        let previous = self.connection.write().take();
        if let Some(connection) = previous {
            connection.dispose().await;
            self.handlers.set_attached(false);
        }
    }

    async fn establish(&self) -> Result<()> {
        let record = self.record();
        let session = self.store.get_session_blob(&record.tenant_id)?;
        let connection = self.factory.create(&record, session)?;

        self.set_phase(Some(ConnectionStatus::Connecting));
        connection.set_sink(Arc::clone(&self.handlers) as Arc<dyn InboundSink>);
        self.handlers.set_attached(true);
        *self.connection.write() = Some(Arc::clone(&connection));

        tracing::debug!(
            tenant_id = %record.tenant_id,
            version = %connection.version(),
            "Connecting tenant"
        );
        connection.connect().await?;

        if connection.status().is_ready() {
            self.set_phase(Some(ConnectionStatus::Fetching));
        }
        self.sync_identity(connection.as_ref())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use msgbridge_connection::{ConnectionError, MockFactory};
    use msgbridge_core::Message;
    use msgbridge_store::RocksStore;
    use tempfile::TempDir;

    use crate::webhook::build_client;

    /// Factory that records whether a connection was ever created while a
    /// previous one was still live.
    struct OrderChecking {
        inner: MockFactory,
        overlapped: AtomicBool,
    }

    impl ConnectionFactory for OrderChecking {
        fn kind(&self) -> msgbridge_connection::BackendKind {
            self.inner.kind()
        }

        fn create(
            &self,
            record: &TenantRecord,
            session: Option<Vec<u8>>,
        ) -> msgbridge_connection::Result<Arc<dyn Connection>> {
            if self.inner.created().iter().any(|c| !c.is_disposed()) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            self.inner.create(record, session)
        }
    }

    pub(crate) fn test_tenant_with(
        token: &str,
        factory: Arc<dyn ConnectionFactory>,
    ) -> (Arc<Tenant>, Arc<RocksStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let record = TenantRecord::new(TenantId::generate(), token);
        store.put_tenant(&record).unwrap();

        let tenant = Arc::new(Tenant::new(
            record,
            store.clone(),
            factory,
            build_client(Duration::from_secs(2)).unwrap(),
            &ControlConfig::default(),
        ));
        (tenant, store, dir)
    }

    pub(crate) fn test_tenant(token: &str) -> (Arc<Tenant>, TempDir) {
        let (tenant, _store, dir) = test_tenant_with(token, Arc::new(MockFactory::new()));
        (tenant, dir)
    }

    #[tokio::test]
    async fn created_without_connection() {
        let (tenant, _dir) = test_tenant("t");
        assert_eq!(tenant.status(), ConnectionStatus::Created);
        assert!(matches!(
            tenant.require_ready(),
            Err(ControlError::NotReady {
                status: ConnectionStatus::Created
            })
        ));
    }

    #[tokio::test]
    async fn connect_unpaired_then_pair() {
        let factory = Arc::new(MockFactory::new());
        let (tenant, store, _dir) = test_tenant_with("t", factory.clone());

        tenant.connect().await.unwrap();
        assert_eq!(tenant.status(), ConnectionStatus::Connected);
        assert!(tenant.handlers().is_attached());
        assert!(tenant.require_ready().is_err());

        let connection = tenant.connection().unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        connection.pair(tx).await.unwrap();
        assert!(rx.recv().await.is_some());
        tenant.sync_identity(connection.as_ref()).unwrap();

        assert_eq!(tenant.status(), ConnectionStatus::Ready);
        let record = store.get_tenant(&tenant.id()).unwrap().unwrap();
        assert!(record.verified);
        assert_eq!(record.wid, tenant.wid());
        assert!(store.get_session_blob(&tenant.id()).unwrap().is_some());
    }

    #[tokio::test]
    async fn reconnect_disposes_previous_first() {
        let factory = Arc::new(OrderChecking {
            inner: MockFactory::new(),
            overlapped: AtomicBool::new(false),
        });
        let (tenant, _store, _dir) = test_tenant_with("t", factory.clone());

        tenant.connect().await.unwrap();
        tenant.connect().await.unwrap();
        tenant.restart().await.unwrap();

        let created = factory.inner.created();
        assert_eq!(created.len(), 3);
        assert!(created[0].is_disposed());
        assert!(created[1].is_disposed());
        assert!(!created[2].is_disposed());
        assert!(!factory.overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_connect_reports_failed() {
        let factory = Arc::new(MockFactory::new());
        factory.set_fail_connect(true);
        let (tenant, _store, _dir) = test_tenant_with("t", factory);

        let result = tenant.connect().await;
        assert!(matches!(
            result,
            Err(ControlError::Backend(ConnectionError::Transport(_)))
        ));
        assert_eq!(tenant.status(), ConnectionStatus::Failed);
    }

    #[tokio::test]
    async fn disconnect_sets_stopped() {
        let factory = Arc::new(MockFactory::new());
        let (tenant, _store, _dir) = test_tenant_with("t", factory.clone());

        tenant.connect().await.unwrap();
        tenant.disconnect().await.unwrap();

        assert_eq!(tenant.status(), ConnectionStatus::Stopped);
        assert!(tenant.connection().is_none());
        assert!(factory.last().unwrap().is_disposed());

        tenant.connect().await.unwrap();
        assert_eq!(tenant.status(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn delete_without_identity_succeeds() {
        let factory = Arc::new(MockFactory::new());
        let (tenant, _store, _dir) = test_tenant_with("t", factory.clone());

        tenant.connect().await.unwrap();
        tenant.delete().await.unwrap();

        assert_eq!(tenant.status(), ConnectionStatus::Halting);
        let connection = factory.last().unwrap();
        assert!(connection.is_disposed());
        assert!(!connection.remote_erased());
        assert_eq!(tenant.handlers().handler_count(), 0);
    }

    #[tokio::test]
    async fn delete_paired_erases_remote() {
        let factory = Arc::new(MockFactory::new());
        let (tenant, _store, _dir) = test_tenant_with("t", factory.clone());
        tenant
            .persist_record(|r| r.wid = Some(Wid::new("5511999999999@s.whatsapp.net").unwrap()))
            .unwrap();

        tenant.connect().await.unwrap();
        assert_eq!(tenant.status(), ConnectionStatus::Ready);

        tenant.delete().await.unwrap();
        assert!(factory.last().unwrap().remote_erased());
    }

    #[tokio::test]
    async fn delete_stopped_tenant_erases_stored_session() {
        let factory = Arc::new(MockFactory::new());
        let (tenant, store, _dir) = test_tenant_with("t", factory.clone());
        tenant
            .persist_record(|r| r.wid = Some(Wid::new("5511999999999@s.whatsapp.net").unwrap()))
            .unwrap();

        tenant.connect().await.unwrap();
        tenant.disconnect().await.unwrap();
        assert!(tenant.connection().is_none());
        assert!(store.get_session_blob(&tenant.id()).unwrap().is_some());

        tenant.delete().await.unwrap();

        let created = factory.created();
        assert_eq!(created.len(), 2);
        assert!(!created[0].remote_erased());
        assert!(created[1].remote_erased());
        assert!(created[1].is_disposed());
    }

    #[tokio::test]
    async fn delete_never_connected_tenant_without_session() {
        let factory = Arc::new(MockFactory::new());
        let (tenant, _store, _dir) = test_tenant_with("t", factory.clone());

        tenant.delete().await.unwrap();
        assert!(factory.created().is_empty());
        assert_eq!(tenant.status(), ConnectionStatus::Halting);
    }

    #[test]
    fn concurrent_record_changes_are_all_kept() {
        let (tenant, store, _dir) = test_tenant_with("t", Arc::new(MockFactory::new()));
        let wid = Wid::new("5511999999999@s.whatsapp.net").unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..500 {
                    tenant.persist_record(|r| r.handle_groups = i % 2 == 1).unwrap();
                }
            });
            scope.spawn(|| {
                for i in 0..500 {
                    tenant
                        .persist_record(|r| {
                            r.handle_broadcast = i % 2 == 1;
                            r.wid = Some(wid.clone());
                            r.verified = true;
                        })
                        .unwrap();
                }
            });
        });

        let stored = store.get_tenant(&tenant.id()).unwrap().unwrap();
        assert!(stored.handle_groups);
        assert!(stored.handle_broadcast);
        assert!(stored.verified);
        assert_eq!(stored.wid.as_ref(), Some(&wid));
        assert_eq!(tenant.record(), stored);
        assert_eq!(tenant.handlers().filters(), (true, true));
    }

    /// Store that records the tenant's status whenever a session blob is
    /// written, which happens while the post-connect sync runs.
    struct StatusRecordingStore {
        inner: RocksStore,
        tenant: parking_lot::Mutex<std::sync::Weak<Tenant>>,
        seen: parking_lot::Mutex<Vec<ConnectionStatus>>,
    }

    impl Store for StatusRecordingStore {
        fn put_tenant(&self, tenant: &TenantRecord) -> msgbridge_store::Result<()> {
            self.inner.put_tenant(tenant)
        }

        fn get_tenant(&self, tenant_id: &TenantId) -> msgbridge_store::Result<Option<TenantRecord>> {
            self.inner.get_tenant(tenant_id)
        }

        fn get_tenant_by_token(&self, token: &str) -> msgbridge_store::Result<Option<TenantRecord>> {
            self.inner.get_tenant_by_token(token)
        }

        fn delete_tenant(&self, tenant_id: &TenantId) -> msgbridge_store::Result<()> {
            self.inner.delete_tenant(tenant_id)
        }

        fn list_tenants(&self) -> msgbridge_store::Result<Vec<TenantRecord>> {
            self.inner.list_tenants()
        }

        fn put_webhook(
            &self,
            tenant_id: &TenantId,
            webhook: &msgbridge_store::WebhookEndpoint,
        ) -> msgbridge_store::Result<()> {
            self.inner.put_webhook(tenant_id, webhook)
        }

        fn delete_webhook(&self, tenant_id: &TenantId, url: &str) -> msgbridge_store::Result<()> {
            self.inner.delete_webhook(tenant_id, url)
        }

        fn list_webhooks(
            &self,
            tenant_id: &TenantId,
        ) -> msgbridge_store::Result<Vec<msgbridge_store::WebhookEndpoint>> {
            self.inner.list_webhooks(tenant_id)
        }

        fn put_session_blob(&self, tenant_id: &TenantId, blob: &[u8]) -> msgbridge_store::Result<()> {
            if let Some(tenant) = self.tenant.lock().upgrade() {
                self.seen.lock().push(tenant.status());
            }
            self.inner.put_session_blob(tenant_id, blob)
        }

        fn get_session_blob(&self, tenant_id: &TenantId) -> msgbridge_store::Result<Option<Vec<u8>>> {
            self.inner.get_session_blob(tenant_id)
        }

        fn delete_session_blob(&self, tenant_id: &TenantId) -> msgbridge_store::Result<()> {
            self.inner.delete_session_blob(tenant_id)
        }
    }

    #[tokio::test]
    async fn authenticated_connect_syncs_in_fetching_phase() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(StatusRecordingStore {
            inner: RocksStore::open(dir.path()).unwrap(),
            tenant: parking_lot::Mutex::new(std::sync::Weak::new()),
            seen: parking_lot::Mutex::new(Vec::new()),
        });
        let mut record = TenantRecord::new(TenantId::generate(), "t");
        record.wid = Some(Wid::new("5511999999999@s.whatsapp.net").unwrap());
        store.put_tenant(&record).unwrap();

        let tenant = Arc::new(Tenant::new(
            record,
            store.clone(),
            Arc::new(MockFactory::new()),
            build_client(Duration::from_secs(2)).unwrap(),
            &ControlConfig::default(),
        ));
        *store.tenant.lock() = Arc::downgrade(&tenant);

        tenant.connect().await.unwrap();

        assert_eq!(*store.seen.lock(), vec![ConnectionStatus::Fetching]);
        assert_eq!(tenant.status(), ConnectionStatus::Ready);
    }

    #[tokio::test]
    async fn inbound_messages_reach_cache() {
        let factory = Arc::new(MockFactory::new());
        let (tenant, _store, _dir) = test_tenant_with("t", factory.clone());
        tenant.connect().await.unwrap();

        let connection = factory.last().unwrap();
        assert!(connection.inject(Message::text("in1", "5511@s.whatsapp.net", "hello")));
        assert_eq!(tenant.handlers().get_by_id("IN1").unwrap().text, "hello");
    }

    #[tokio::test]
    async fn persisted_filters_apply_to_handlers() {
        let (tenant, _dir) = test_tenant("t");
        tenant
            .persist_record(|r| {
                r.handle_groups = true;
                r.handle_broadcast = true;
            })
            .unwrap();
        assert_eq!(tenant.handlers().filters(), (true, true));
    }
}
