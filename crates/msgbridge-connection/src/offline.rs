//! Backend used when no network backend is configured.
//!
//! Offline connections never come up. They keep the tenant addressable
//! over HTTP (status, webhooks, deletion) while every operation that needs
//! the network reports the backend as unavailable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use msgbridge_core::{Attachment, Message, OutboundMessage, TenantId, Wid};
use msgbridge_store::TenantRecord;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::connection::{attachment_from_message, Connection, InboundSink, ProfilePicture, SendReceipt};
use crate::error::{ConnectionError, Result};
use crate::factory::{BackendKind, ConnectionFactory};
use crate::status::ConnectionSignals;

const UNAVAILABLE: &str = "no network backend configured";

/// Factory for [`OfflineConnection`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineFactory;

impl ConnectionFactory for OfflineFactory {
    fn kind(&self) -> BackendKind {
        BackendKind::Offline
    }

    fn create(
        &self,
        record: &TenantRecord,
        session: Option<Vec<u8>>,
    ) -> Result<Arc<dyn Connection>> {
        Ok(Arc::new(OfflineConnection::new(record, session)))
    }
}

/// A connection that is always disconnected.
pub struct OfflineConnection {
    tenant_id: TenantId,
    wid: Option<Wid>,
    session: Option<Vec<u8>>,
    failed: AtomicBool,
    disposed: AtomicBool,
    sink: Mutex<Option<Arc<dyn InboundSink>>>,
}

impl OfflineConnection {
    /// Create an offline connection for a tenant.
    #[must_use]
    pub fn new(record: &TenantRecord, session: Option<Vec<u8>>) -> Self {
        Self {
            tenant_id: record.tenant_id,
            wid: record.wid.clone(),
            session,
            failed: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            sink: Mutex::new(None),
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(ConnectionError::Disposed);
        }
        Ok(())
    }

    fn unavailable(&self, operation: &str) -> ConnectionError {
        tracing::warn!(
            tenant_id = %self.tenant_id,
            operation,
            "OfflineConnection: called but {UNAVAILABLE}"
        );
        ConnectionError::Unavailable(UNAVAILABLE.to_string())
    }
}

#[async_trait]
impl Connection for OfflineConnection {
    fn version(&self) -> String {
        format!("offline/{}", env!("CARGO_PKG_VERSION"))
    }

    fn signals(&self) -> ConnectionSignals {
        ConnectionSignals {
            transport_connected: false,
            authenticated: false,
            last_connect_attempt_failed: self.failed.load(Ordering::Acquire),
        }
    }

    async fn connect(&self) -> Result<()> {
        self.ensure_live()?;
        self.failed.store(true, Ordering::Release);
        Err(self.unavailable("connect"))
    }

    async fn disconnect(&self) -> Result<()> {
        self.ensure_live()
    }

    fn wid(&self) -> Result<Wid> {
        self.wid.clone().ok_or(ConnectionError::IdentityUnknown)
    }

    async fn title(&self, _chat_id: &str) -> Option<String> {
        None
    }

    async fn pair(&self, _sink: mpsc::Sender<String>) -> Result<()> {
        self.ensure_live()?;
        Err(self.unavailable("pair"))
    }

    async fn invite_link(&self, _group_id: &str) -> Result<String> {
        self.ensure_live()?;
        Err(self.unavailable("invite_link"))
    }

    async fn profile_picture(
        &self,
        _chat_id: &str,
        _known_id: Option<&str>,
    ) -> Result<Option<ProfilePicture>> {
        self.ensure_live()?;
        Err(self.unavailable("profile_picture"))
    }

    async fn download(&self, message: &Message) -> Result<Attachment> {
        self.ensure_live()?;
        attachment_from_message(message)
    }

    async fn send(&self, _message: &OutboundMessage) -> Result<SendReceipt> {
        self.ensure_live()?;
        Err(self.unavailable("send"))
    }

    fn set_sink(&self, sink: Arc<dyn InboundSink>) {
        *self.sink.lock() = Some(sink);
    }

    fn session_blob(&self) -> Option<Vec<u8>> {
        self.session.clone()
    }

    async fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.sink.lock().take();
        }
    }

    async fn delete(&self) -> Result<()> {
        if self.wid.is_none() {
            return Err(ConnectionError::IdentityUnknown);
        }
        tracing::warn!(
            tenant_id = %self.tenant_id,
            "OfflineConnection: remote session left in place, {UNAVAILABLE}"
        );
        self.dispose().await;
        Ok(())
    }
}
