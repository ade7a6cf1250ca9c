//! Bridge service implementation.
//!
//! This module provides the `Bridge` trait and the `BridgeService`
//! implementation that owns the tenant directory and coordinates tenant
//! lifecycle, messaging and webhook configuration.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use msgbridge_connection::{BackendKind, ConnectionFactory, ConnectionStatus, ProfilePicture};
use msgbridge_core::{format_chat_id, Attachment, Message, OutboundMessage, Participant, TenantId};
use msgbridge_store::{Store, TenantRecord, WebhookEndpoint};
use tokio::sync::mpsc;

use crate::directory::TenantDirectory;
use crate::error::{ControlError, Result};
use crate::tenant::Tenant;
use crate::types::{ControlConfig, CreateTenantRequest};
use crate::webhook::build_client;

/// Trait defining the bridge operations.
///
/// This trait provides the complete API the HTTP layer consumes. Tenants
/// are resolved first and then passed to the per-tenant operations.
#[async_trait]
pub trait Bridge: Send + Sync {
    // =========================================================================
    // Tenant Operations
    // =========================================================================

    /// Register a new tenant. It is not connected until asked to.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Store` with a conflict if the token is taken.
    async fn create_tenant(&self, request: CreateTenantRequest) -> Result<Arc<Tenant>>;

    /// Get a tenant by id.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::TenantNotFound` if the tenant is not active.
    fn tenant(&self, tenant_id: &TenantId) -> Result<Arc<Tenant>>;

    /// Get a tenant by token, loading it from the store if needed.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::TenantNotFound` if no tenant has this token.
    fn tenant_by_token(&self, token: &str) -> Result<Arc<Tenant>>;

    /// Get a tenant by network identity.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::TenantNotFound` if no paired tenant matches.
    fn tenant_by_wid(&self, wid: &str) -> Result<Arc<Tenant>>;

    /// All active tenants.
    fn list_tenants(&self) -> Vec<Arc<Tenant>>;

    /// Change the group and broadcast filters of a tenant.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    fn update_filters(
        &self,
        tenant: &Tenant,
        handle_groups: bool,
        handle_broadcast: bool,
    ) -> Result<TenantRecord>;

    /// Halt a tenant and remove every trace of it.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::TenantNotFound` if the tenant is not active,
    /// or the backend error if the remote session cannot be erased.
    async fn delete_tenant(&self, tenant_id: &TenantId) -> Result<()>;

    // =========================================================================
    // Lifecycle Operations
    // =========================================================================

    /// Connect a tenant and report its status afterwards.
    async fn connect(&self, tenant: &Tenant) -> Result<ConnectionStatus>;

    /// Disconnect a tenant.
    async fn disconnect(&self, tenant: &Tenant) -> Result<ConnectionStatus>;

    /// Dispose and reconnect a tenant.
    async fn restart(&self, tenant: &Tenant) -> Result<ConnectionStatus>;

    /// Stream pairing codes into `sink` until the account is paired.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidRequest` if the tenant is already
    /// paired and connected.
    async fn pair(&self, tenant: &Tenant, sink: mpsc::Sender<String>) -> Result<()>;

    // =========================================================================
    // Messaging Operations
    // =========================================================================

    /// Send a message and cache it as an internal message.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::NotReady` unless the tenant is ready, and
    /// `ControlError::InvalidRequest` for bad recipients or empty messages.
    async fn send(&self, tenant: &Tenant, message: OutboundMessage) -> Result<Message>;

    /// Cached messages newer than `since`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::NotReady` unless the tenant is ready.
    fn receive(&self, tenant: &Tenant, since: DateTime<Utc>) -> Result<Vec<Message>>;

    /// Download the attachment of a cached message.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::MessageNotFound` if the message is not cached.
    async fn download(&self, tenant: &Tenant, message_id: &str) -> Result<Attachment>;

    /// Invite link of a group.
    async fn invite_link(&self, tenant: &Tenant, group_id: &str) -> Result<String>;

    /// Profile picture of a chat; `None` if `known_id` is still current.
    async fn profile_picture(
        &self,
        tenant: &Tenant,
        chat_id: &str,
        known_id: Option<&str>,
    ) -> Result<Option<ProfilePicture>>;

    /// Display title of a chat.
    async fn title(&self, tenant: &Tenant, chat_id: &str) -> Result<Option<String>>;

    // =========================================================================
    // Webhook Operations
    // =========================================================================

    /// Add or replace a webhook endpoint. Returns the updated list.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidRequest` if the URL is not http(s).
    fn add_webhook(&self, tenant: &Tenant, endpoint: WebhookEndpoint)
        -> Result<Vec<WebhookEndpoint>>;

    /// Remove the endpoint with `url`, or every endpoint when `url` is
    /// `None`. Returns how many were removed.
    fn remove_webhook(&self, tenant: &Tenant, url: Option<&str>) -> Result<usize>;

    /// Configured webhook endpoints.
    fn list_webhooks(&self, tenant: &Tenant) -> Result<Vec<WebhookEndpoint>>;
}

/// The main bridge service implementation.
pub struct BridgeService<S: Store> {
    store: Arc<S>,
    factory: Arc<dyn ConnectionFactory>,
    directory: TenantDirectory,
    client: reqwest::Client,
    config: ControlConfig,
}

impl<S: Store + 'static> BridgeService<S> {
    /// Create a new bridge service.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Internal` if the webhook client cannot be built.
    pub fn new(
        store: Arc<S>,
        factory: Arc<dyn ConnectionFactory>,
        config: ControlConfig,
    ) -> Result<Self> {
        let client = build_client(config.webhook_timeout())
            .map_err(|e| ControlError::Internal(format!("webhook client: {e}")))?;

        Ok(Self {
            store,
            factory,
            directory: TenantDirectory::new(),
            client,
            config,
        })
    }

    /// Create with default configuration.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Internal` if the webhook client cannot be built.
    pub fn with_defaults(store: Arc<S>, factory: Arc<dyn ConnectionFactory>) -> Result<Self> {
        Self::new(store, factory, ControlConfig::default())
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Active tenants.
    #[must_use]
    pub const fn directory(&self) -> &TenantDirectory {
        &self.directory
    }

    /// Backend new connections are built with.
    #[must_use]
    pub fn backend(&self) -> BackendKind {
        self.factory.kind()
    }

    /// Load every persisted tenant and connect the non-development ones.
    ///
    /// Connect failures are logged; the tenant stays registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the tenants cannot be read from the store.
    pub async fn start(&self) -> Result<usize> {
        let records = self.store.list_tenants()?;
        let mut loaded = Vec::with_capacity(records.len());
        for record in records {
            loaded.push(self.register(record)?);
        }

        tracing::info!(
            tenants = loaded.len(),
            backend = %self.backend(),
            "Loaded tenants"
        );

        if self.config.connect_on_start {
            let connects = loaded
                .iter()
                .filter(|tenant| !tenant.record().devel)
                .map(|tenant| async move {
                    if let Err(e) = tenant.connect().await {
                        tracing::warn!(
                            tenant_id = %tenant.id(),
                            error = %e,
                            "Failed to connect tenant on start"
                        );
                    }
                });
            join_all(connects).await;
        }

        Ok(loaded.len())
    }

    /// Register a tenant from its record, loading its webhooks.
    ///
    /// If the tenant is already registered the existing one is returned
    /// and nothing is built.
    fn register(&self, record: TenantRecord) -> Result<Arc<Tenant>> {
        let tenant_id = record.tenant_id;
        self.directory.get_or_insert_with(tenant_id, || {
            let webhooks = self.store.list_webhooks(&tenant_id)?;
            let tenant = Arc::new(Tenant::new(
                record,
                Arc::clone(&self.store) as Arc<dyn Store>,
                Arc::clone(&self.factory),
                self.client.clone(),
                &self.config,
            ));
            tenant.dispatcher().set_endpoints(webhooks);
            Ok(tenant)
        })
    }

    fn refresh_webhooks(&self, tenant: &Tenant) -> Result<Vec<WebhookEndpoint>> {
        let endpoints = self.store.list_webhooks(&tenant.id())?;
        tenant.dispatcher().set_endpoints(endpoints.clone());
        Ok(endpoints)
    }
}

#[async_trait]
impl<S: Store + 'static> Bridge for BridgeService<S> {
    // =========================================================================
    // Tenant Operations
    // =========================================================================

    async fn create_tenant(&self, request: CreateTenantRequest) -> Result<Arc<Tenant>> {
        let token = request
            .token
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

        let mut record = TenantRecord::new(TenantId::generate(), token);
        record.owner = request.owner;
        record.handle_groups = request.handle_groups;
        record.handle_broadcast = request.handle_broadcast;
        record.devel = request.devel;

        self.store.put_tenant(&record)?;
        let tenant = self.register(record)?;

        tracing::info!(tenant_id = %tenant.id(), "Created tenant");
        Ok(tenant)
    }

    fn tenant(&self, tenant_id: &TenantId) -> Result<Arc<Tenant>> {
        self.directory.get(tenant_id)
    }

    fn tenant_by_token(&self, token: &str) -> Result<Arc<Tenant>> {
        match self.directory.by_token(token) {
            Ok(tenant) => Ok(tenant),
            Err(ControlError::TenantNotFound) => {
                let record = self
                    .store
                    .get_tenant_by_token(token)?
                    .ok_or(ControlError::TenantNotFound)?;
                tracing::debug!(tenant_id = %record.tenant_id, "Loaded tenant from store");
                self.register(record)
            }
            Err(e) => Err(e),
        }
    }

    fn tenant_by_wid(&self, wid: &str) -> Result<Arc<Tenant>> {
        self.directory.by_wid(wid)
    }

    fn list_tenants(&self) -> Vec<Arc<Tenant>> {
        self.directory.list()
    }

    fn update_filters(
        &self,
        tenant: &Tenant,
        handle_groups: bool,
        handle_broadcast: bool,
    ) -> Result<TenantRecord> {
        let record = tenant.persist_record(|r| {
            r.handle_groups = handle_groups;
            r.handle_broadcast = handle_broadcast;
        })?;

        tracing::info!(
            tenant_id = %record.tenant_id,
            handle_groups,
            handle_broadcast,
            "Updated tenant filters"
        );
        Ok(record)
    }

    async fn delete_tenant(&self, tenant_id: &TenantId) -> Result<()> {
        let tenant = self.directory.get(tenant_id)?;
        tenant.delete().await?;

        for webhook in self.store.list_webhooks(tenant_id)? {
            self.store.delete_webhook(tenant_id, &webhook.url)?;
        }
        self.store.delete_session_blob(tenant_id)?;
        match self.store.delete_tenant(tenant_id) {
            Ok(()) | Err(msgbridge_store::StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
        self.directory.remove(tenant_id);

        tracing::info!(tenant_id = %tenant_id, "Deleted tenant");
        Ok(())
    }

    // =========================================================================
    // Lifecycle Operations
    // =========================================================================

    async fn connect(&self, tenant: &Tenant) -> Result<ConnectionStatus> {
        tenant.connect().await?;
        Ok(tenant.status())
    }

    async fn disconnect(&self, tenant: &Tenant) -> Result<ConnectionStatus> {
        tenant.disconnect().await?;
        Ok(tenant.status())
    }

    async fn restart(&self, tenant: &Tenant) -> Result<ConnectionStatus> {
        tenant.restart().await?;
        Ok(tenant.status())
    }

    async fn pair(&self, tenant: &Tenant, sink: mpsc::Sender<String>) -> Result<()> {
        let status = tenant.status();
        if status.is_ready() {
            return Err(ControlError::InvalidRequest("tenant is already paired".into()));
        }
        if status != ConnectionStatus::Connected {
            tenant.connect().await?;
        }

        let connection = tenant
            .connection()
            .ok_or(ControlError::NotReady { status: tenant.status() })?;

        tracing::info!(tenant_id = %tenant.id(), "Pairing tenant");
        connection.pair(sink).await?;
        tenant.sync_identity(connection.as_ref())
    }

    // =========================================================================
    // Messaging Operations
    // =========================================================================

    async fn send(&self, tenant: &Tenant, mut message: OutboundMessage) -> Result<Message> {
        let connection = tenant.require_ready()?;

        if message.text.is_empty() && message.attachment.is_none() {
            return Err(ControlError::InvalidRequest(
                "message has neither text nor attachment".into(),
            ));
        }
        message.chat_id = format_chat_id(&message.chat_id).ok_or_else(|| {
            ControlError::InvalidRequest(format!("invalid recipient: {}", message.chat_id))
        })?;

        let receipt = connection.send(&message).await?;
        let title = connection.title(&message.chat_id).await;

        let mut sent = message.into_sent(receipt.id, receipt.timestamp);
        sent.chat.title = title;
        if sent.is_from_group() {
            sent.participant = tenant.wid().map(|wid| Participant {
                id: wid.to_string(),
                title: None,
            });
        }

        tracing::debug!(
            tenant_id = %tenant.id(),
            message_id = %sent.id,
            kind = ?sent.kind,
            "Message sent"
        );

        tenant.handlers().ingest(sent.clone());
        Ok(sent)
    }

    fn receive(&self, tenant: &Tenant, since: DateTime<Utc>) -> Result<Vec<Message>> {
        tenant.require_ready()?;
        let mut messages = tenant.handlers().get_since(since);
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    async fn download(&self, tenant: &Tenant, message_id: &str) -> Result<Attachment> {
        let connection = tenant.require_ready()?;
        let message = tenant.handlers().get_by_id(message_id)?;
        Ok(connection.download(&message).await?)
    }

    async fn invite_link(&self, tenant: &Tenant, group_id: &str) -> Result<String> {
        let connection = tenant.require_ready()?;
        Ok(connection.invite_link(group_id).await?)
    }

    async fn profile_picture(
        &self,
        tenant: &Tenant,
        chat_id: &str,
        known_id: Option<&str>,
    ) -> Result<Option<ProfilePicture>> {
        let connection = tenant.require_ready()?;
        Ok(connection.profile_picture(chat_id, known_id).await?)
    }

    async fn title(&self, tenant: &Tenant, chat_id: &str) -> Result<Option<String>> {
        let connection = tenant.require_ready()?;
        Ok(connection.title(chat_id).await)
    }

    // =========================================================================
    // Webhook Operations
    // =========================================================================

    fn add_webhook(
        &self,
        tenant: &Tenant,
        endpoint: WebhookEndpoint,
    ) -> Result<Vec<WebhookEndpoint>> {
        let url = endpoint.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ControlError::InvalidRequest(format!(
                "webhook url must be http(s): {url}"
            )));
        }

        self.store.put_webhook(&tenant.id(), &endpoint)?;
        tracing::info!(tenant_id = %tenant.id(), url = %endpoint.url, "Added webhook");
        self.refresh_webhooks(tenant)
    }

    fn remove_webhook(&self, tenant: &Tenant, url: Option<&str>) -> Result<usize> {
        let tenant_id = tenant.id();
        let targets: Vec<WebhookEndpoint> = self
            .store
            .list_webhooks(&tenant_id)?
            .into_iter()
            .filter(|w| url.is_none_or(|url| w.url == url))
            .collect();

        for webhook in &targets {
            self.store.delete_webhook(&tenant_id, &webhook.url)?;
        }
        self.refresh_webhooks(tenant)?;

        tracing::info!(tenant_id = %tenant_id, removed = targets.len(), "Removed webhooks");
        Ok(targets.len())
    }

    fn list_webhooks(&self, tenant: &Tenant) -> Result<Vec<WebhookEndpoint>> {
        Ok(self.store.list_webhooks(&tenant.id())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::TimeZone;
    use msgbridge_connection::{ConnectionError, MockFactory};
    use msgbridge_core::Wid;
    use msgbridge_store::RocksStore;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service() -> (BridgeService<RocksStore>, Arc<MockFactory>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let factory = Arc::new(MockFactory::new());
        let service = BridgeService::with_defaults(store, factory.clone()).unwrap();
        (service, factory, dir)
    }

    async fn ready_tenant(service: &BridgeService<RocksStore>) -> Arc<Tenant> {
        let tenant = service
            .create_tenant(CreateTenantRequest::default())
            .await
            .unwrap();
        tenant
            .persist_record(|r| r.wid = Some(Wid::new("5511999999999@s.whatsapp.net").unwrap()))
            .unwrap();
        assert_eq!(service.connect(&tenant).await.unwrap(), ConnectionStatus::Ready);
        tenant
    }

    fn at(secs: i64, id: &str) -> Message {
        let mut msg = Message::text(id, "5511888888888@s.whatsapp.net", "hello");
        msg.timestamp = Utc.timestamp_opt(secs, 0).unwrap();
        msg
    }

    #[tokio::test]
    async fn create_and_lookup() {
        let (service, _factory, _dir) = service();
        let tenant = service
            .create_tenant(CreateTenantRequest {
                token: Some("my-token".into()),
                ..CreateTenantRequest::default()
            })
            .await
            .unwrap();

        assert_eq!(service.tenant(&tenant.id()).unwrap().id(), tenant.id());
        assert_eq!(service.tenant_by_token("my-token").unwrap().id(), tenant.id());
        assert_eq!(service.list_tenants().len(), 1);
        assert!(service.store().get_tenant(&tenant.id()).unwrap().is_some());
        assert_eq!(tenant.status(), ConnectionStatus::Created);
    }

    #[tokio::test]
    async fn generated_token_when_absent() {
        let (service, _factory, _dir) = service();
        let tenant = service
            .create_tenant(CreateTenantRequest::default())
            .await
            .unwrap();
        assert_eq!(tenant.token().len(), 32);
    }

    #[tokio::test]
    async fn duplicate_token_conflicts() {
        let (service, _factory, _dir) = service();
        let request = CreateTenantRequest {
            token: Some("dup".into()),
            ..CreateTenantRequest::default()
        };
        service.create_tenant(request.clone()).await.unwrap();

        let err = service.create_tenant(request).await.unwrap_err();
        assert_eq!(err.http_status_code(), 409);
    }

    #[tokio::test]
    async fn token_lookup_falls_back_to_store() {
        let (service, _factory, _dir) = service();
        let record = TenantRecord::new(TenantId::generate(), "stored-only");
        service.store().put_tenant(&record).unwrap();
        assert!(service.directory().is_empty());

        let tenant = service.tenant_by_token("stored-only").unwrap();
        assert_eq!(tenant.id(), record.tenant_id);
        assert_eq!(service.directory().len(), 1);

        assert!(matches!(
            service.tenant_by_token("missing"),
            Err(ControlError::TenantNotFound)
        ));
    }

    #[test]
    fn concurrent_token_lookups_share_one_tenant() {
        let (service, _factory, _dir) = service();
        let record = TenantRecord::new(TenantId::generate(), "stored-only");
        service.store().put_tenant(&record).unwrap();

        let found: Vec<Arc<Tenant>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| service.tenant_by_token("stored-only").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(found.iter().all(|t| Arc::ptr_eq(t, &found[0])));
        assert_eq!(service.directory().len(), 1);
        let registered = service.directory().get(&record.tenant_id).unwrap();
        assert!(Arc::ptr_eq(&registered, &found[0]));
    }

    #[tokio::test]
    async fn start_loads_and_connects_tenants() {
        let (service, factory, _dir) = service();
        let regular = TenantRecord::new(TenantId::generate(), "a");
        let mut devel = TenantRecord::new(TenantId::generate(), "b");
        devel.devel = true;
        service.store().put_tenant(&regular).unwrap();
        service.store().put_tenant(&devel).unwrap();
        service
            .store()
            .put_webhook(&regular.tenant_id, &WebhookEndpoint::new("http://localhost/hook"))
            .unwrap();

        assert_eq!(service.start().await.unwrap(), 2);

        let regular = service.tenant(&regular.tenant_id).unwrap();
        assert_eq!(regular.status(), ConnectionStatus::Connected);
        assert_eq!(regular.dispatcher().endpoints().len(), 1);

        let devel = service.tenant(&devel.tenant_id).unwrap();
        assert_eq!(devel.status(), ConnectionStatus::Created);
        assert_eq!(factory.created().len(), 1);
    }

    #[tokio::test]
    async fn remote_operations_require_ready() {
        let (service, _factory, _dir) = service();
        let tenant = service
            .create_tenant(CreateTenantRequest::default())
            .await
            .unwrap();

        let outbound = OutboundMessage::text("5511888888888@s.whatsapp.net", "hi");
        assert!(matches!(
            service.send(&tenant, outbound).await,
            Err(ControlError::NotReady {
                status: ConnectionStatus::Created
            })
        ));
        assert!(matches!(
            service.receive(&tenant, Utc::now()),
            Err(ControlError::NotReady { .. })
        ));
        assert!(matches!(
            service.download(&tenant, "x").await,
            Err(ControlError::NotReady { .. })
        ));
        assert!(matches!(
            service.invite_link(&tenant, "1234@g.us").await,
            Err(ControlError::NotReady { .. })
        ));

        service.connect(&tenant).await.unwrap();
        assert!(matches!(
            service.profile_picture(&tenant, "5511@s.whatsapp.net", None).await,
            Err(ControlError::NotReady {
                status: ConnectionStatus::Connected
            })
        ));
    }

    #[tokio::test]
    async fn send_caches_internal_echo() {
        let (service, factory, _dir) = service();
        let tenant = ready_tenant(&service).await;
        factory
            .last()
            .unwrap()
            .set_title("5511888888888@s.whatsapp.net", "Alice");

        let outbound = OutboundMessage::text("+5511888888888@s.whatsapp.net", "hi").with_track_id("abc");
        let sent = service.send(&tenant, outbound).await.unwrap();

        assert!(sent.from_internal);
        assert_eq!(sent.track_id.as_deref(), Some("abc"));
        assert_eq!(sent.chat.id, "5511888888888@s.whatsapp.net");
        assert_eq!(sent.chat.title.as_deref(), Some("Alice"));
        assert_eq!(factory.last().unwrap().sent().len(), 1);

        let cached = tenant.handlers().get_by_id(sent.id.as_str()).unwrap();
        assert!(cached.from_internal);
    }

    #[tokio::test]
    async fn group_send_sets_own_participant() {
        let (service, _factory, _dir) = service();
        let tenant = ready_tenant(&service).await;

        let sent = service
            .send(&tenant, OutboundMessage::text("120363-1234@g.us", "hi all"))
            .await
            .unwrap();
        assert_eq!(
            sent.participant.map(|p| p.id).as_deref(),
            Some("5511999999999@s.whatsapp.net")
        );
    }

    #[tokio::test]
    async fn send_rejects_bad_requests() {
        let (service, _factory, _dir) = service();
        let tenant = ready_tenant(&service).await;

        let empty = OutboundMessage::text("5511888888888@s.whatsapp.net", "");
        assert!(matches!(
            service.send(&tenant, empty).await,
            Err(ControlError::InvalidRequest(_))
        ));

        let no_server = OutboundMessage::text("5511888888888", "hi");
        assert!(matches!(
            service.send(&tenant, no_server).await,
            Err(ControlError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn receive_is_sorted_ascending() {
        let (service, _factory, _dir) = service();
        let tenant = ready_tenant(&service).await;

        tenant.handlers().ingest(at(300, "c"));
        tenant.handlers().ingest(at(100, "a"));
        tenant.handlers().ingest(at(200, "b"));

        let since = Utc.timestamp_opt(50, 0).unwrap();
        let ids: Vec<String> = service
            .receive(&tenant, since)
            .unwrap()
            .into_iter()
            .map(|m| m.id.to_string())
            .collect();
        assert_eq!(ids, vec!["A", "B", "C"]);

        let since = Utc.timestamp_opt(200, 0).unwrap();
        assert_eq!(service.receive(&tenant, since).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn download_cached_attachment() {
        let (service, factory, _dir) = service();
        let tenant = ready_tenant(&service).await;

        let mut msg = at(100, "media1");
        msg.attachment = Some(Attachment::with_content(
            "image/png",
            Some("pic.png".into()),
            vec![1, 2, 3],
        ));
        msg.kind = msgbridge_core::MessageKind::Image;
        assert!(factory.last().unwrap().inject(msg));

        let attachment = service.download(&tenant, "Media1").await.unwrap();
        assert_eq!(attachment.content.as_deref(), Some(&[1u8, 2, 3][..]));

        assert!(matches!(
            service.download(&tenant, "nope").await,
            Err(ControlError::MessageNotFound(_))
        ));

        tenant.handlers().ingest(at(101, "plain"));
        assert!(matches!(
            service.download(&tenant, "plain").await,
            Err(ControlError::Backend(ConnectionError::NoAttachment))
        ));
    }

    #[tokio::test]
    async fn pair_streams_code_and_persists_identity() {
        let (service, _factory, _dir) = service();
        let tenant = service
            .create_tenant(CreateTenantRequest::default())
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        service.pair(&tenant, tx).await.unwrap();
        assert!(rx.recv().await.unwrap().starts_with("2@mock,"));

        assert_eq!(tenant.status(), ConnectionStatus::Ready);
        let record = service.store().get_tenant(&tenant.id()).unwrap().unwrap();
        assert!(record.verified);
        assert_eq!(
            service.tenant_by_wid("5500000000000@s.whatsapp.net").unwrap().id(),
            tenant.id()
        );

        let (tx, _rx) = mpsc::channel(1);
        assert!(matches!(
            service.pair(&tenant, tx).await,
            Err(ControlError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn update_filters_persists_and_applies() {
        let (service, _factory, _dir) = service();
        let tenant = ready_tenant(&service).await;

        let group = Message::text("g1", "120363-1234@g.us", "hi");
        tenant.handlers().ingest(group.clone());
        assert_eq!(tenant.handlers().count(), 0);

        let record = service.update_filters(&tenant, true, false).unwrap();
        assert!(record.handle_groups);
        let stored = service.store().get_tenant(&tenant.id()).unwrap().unwrap();
        assert!(stored.handle_groups);

        tenant.handlers().ingest(group);
        assert_eq!(tenant.handlers().count(), 1);
    }

    #[tokio::test]
    async fn webhook_management() {
        let (service, _factory, _dir) = service();
        let tenant = service
            .create_tenant(CreateTenantRequest::default())
            .await
            .unwrap();

        assert!(matches!(
            service.add_webhook(&tenant, WebhookEndpoint::new("ftp://nope")),
            Err(ControlError::InvalidRequest(_))
        ));

        service
            .add_webhook(&tenant, WebhookEndpoint::new("http://a.example/hook"))
            .unwrap();
        let listed = service
            .add_webhook(&tenant, WebhookEndpoint::new("https://b.example/hook"))
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(tenant.dispatcher().endpoints().len(), 2);

        assert_eq!(
            service
                .remove_webhook(&tenant, Some("http://a.example/hook"))
                .unwrap(),
            1
        );
        assert_eq!(service.remove_webhook(&tenant, Some("http://a.example/hook")).unwrap(), 0);
        assert_eq!(service.list_webhooks(&tenant).unwrap().len(), 1);

        assert_eq!(service.remove_webhook(&tenant, None).unwrap(), 1);
        assert!(tenant.dispatcher().endpoints().is_empty());
    }

    #[tokio::test]
    async fn delete_tenant_removes_everything() {
        let (service, factory, _dir) = service();
        let tenant = ready_tenant(&service).await;
        let tenant_id = tenant.id();
        service
            .add_webhook(&tenant, WebhookEndpoint::new("http://a.example/hook"))
            .unwrap();
        assert!(service.store().get_session_blob(&tenant_id).unwrap().is_some());

        service.delete_tenant(&tenant_id).await.unwrap();

        assert!(factory.last().unwrap().remote_erased());
        assert!(service.store().get_tenant(&tenant_id).unwrap().is_none());
        assert!(service.store().get_session_blob(&tenant_id).unwrap().is_none());
        assert!(service.store().list_webhooks(&tenant_id).unwrap().is_empty());
        assert!(matches!(
            service.tenant(&tenant_id),
            Err(ControlError::TenantNotFound)
        ));
    }

    #[tokio::test]
    async fn delete_disconnected_tenant_still_logs_out() {
        let (service, factory, _dir) = service();
        let tenant = ready_tenant(&service).await;
        let tenant_id = tenant.id();
        assert_eq!(
            service.disconnect(&tenant).await.unwrap(),
            ConnectionStatus::Stopped
        );

        service.delete_tenant(&tenant_id).await.unwrap();

        assert_eq!(factory.created().len(), 2);
        assert!(factory.last().unwrap().remote_erased());
        assert!(service.store().get_session_blob(&tenant_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_unpaired_tenant() {
        let (service, _factory, _dir) = service();
        let tenant = service
            .create_tenant(CreateTenantRequest::default())
            .await
            .unwrap();
        service.delete_tenant(&tenant.id()).await.unwrap();
        assert!(service.directory().is_empty());
    }

    #[tokio::test]
    async fn sent_echo_reaches_opted_in_webhook() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "message": { "from_internal": true, "track_id": "abc" }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let (service, _factory, _dir) = service();
        let tenant = ready_tenant(&service).await;
        service
            .add_webhook(
                &tenant,
                WebhookEndpoint {
                    url: format!("{}/hook", mock_server.uri()),
                    forward_internal: true,
                    track_id: Some("other".into()),
                },
            )
            .unwrap();

        let outbound =
            OutboundMessage::text("5511888888888@s.whatsapp.net", "hi").with_track_id("abc");
        service.send(&tenant, outbound).await.unwrap();

        for _ in 0..50 {
            if !mock_server.received_requests().await.unwrap_or_default().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
