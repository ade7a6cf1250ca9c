//! Scriptable in-memory backend for tests and local development.
//!
//! A mock connection behaves like a real one from the outside: it connects,
//! pairs, sends and receives, but everything happens in memory. Tests drive
//! it through [`MockConnection::inject`] and the knobs on [`MockFactory`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use msgbridge_core::message::GROUP_SUFFIX;
use msgbridge_core::{Attachment, Message, MessageId, OutboundMessage, TenantId, Wid};
use msgbridge_store::TenantRecord;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::connection::{attachment_from_message, Connection, InboundSink, ProfilePicture, SendReceipt};
use crate::error::{ConnectionError, Result};
use crate::factory::{BackendKind, ConnectionFactory};
use crate::status::ConnectionSignals;

const SESSION_PREFIX: &str = "mock-session:";

/// Builds [`MockConnection`]s and keeps every one it built.
#[derive(Default)]
pub struct MockFactory {
    pair_as: Mutex<Option<Wid>>,
    fail_connect: AtomicBool,
    created: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockFactory {
    /// Create a factory whose connections pair as a fixed test account.
    #[must_use]
    pub fn new() -> Self {
        let factory = Self::default();
        if let Ok(wid) = Wid::new("5500000000000@s.whatsapp.net") {
            *factory.pair_as.lock() = Some(wid);
        }
        factory
    }

    /// Identity new connections take on when paired.
    pub fn set_pair_as(&self, wid: Wid) {
        *self.pair_as.lock() = Some(wid);
    }

    /// Make every subsequent connect attempt fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::Release);
    }

    /// Every connection built so far, oldest first.
    #[must_use]
    pub fn created(&self) -> Vec<Arc<MockConnection>> {
        self.created.lock().clone()
    }

    /// The most recently built connection.
    #[must_use]
    pub fn last(&self) -> Option<Arc<MockConnection>> {
        self.created.lock().last().cloned()
    }
}

impl ConnectionFactory for MockFactory {
    fn kind(&self) -> BackendKind {
        BackendKind::Mock
    }

    fn create(
        &self,
        record: &TenantRecord,
        session: Option<Vec<u8>>,
    ) -> Result<Arc<dyn Connection>> {
        let resumed = session
            .as_deref()
            .and_then(|blob| std::str::from_utf8(blob).ok())
            .and_then(|blob| blob.strip_prefix(SESSION_PREFIX))
            .and_then(|wid| Wid::new(wid).ok());

        let connection = Arc::new(MockConnection::new(record.tenant_id));
        {
            let mut state = connection.state.lock();
            state.wid = resumed.or_else(|| record.wid.clone());
            state.pair_as.clone_from(&self.pair_as.lock());
            state.fail_connect = self.fail_connect.load(Ordering::Acquire);
        }

        self.created.lock().push(Arc::clone(&connection));
        Ok(connection)
    }
}

#[derive(Default)]
struct MockState {
    signals: ConnectionSignals,
    wid: Option<Wid>,
    pair_as: Option<Wid>,
    fail_connect: bool,
    titles: HashMap<String, String>,
    media: HashMap<MessageId, Attachment>,
    sent: Vec<OutboundMessage>,
    remote_erased: bool,
}

/// An in-memory connection.
pub struct MockConnection {
    tenant_id: TenantId,
    state: Mutex<MockState>,
    sink: Mutex<Option<Arc<dyn InboundSink>>>,
    disposed: AtomicBool,
    dispose_calls: AtomicUsize,
}

impl MockConnection {
    /// Create an unpaired, disconnected mock connection.
    #[must_use]
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            state: Mutex::new(MockState::default()),
            sink: Mutex::new(None),
            disposed: AtomicBool::new(false),
            dispose_calls: AtomicUsize::new(0),
        }
    }

    /// Create a mock connection that is already paired as `wid`.
    #[must_use]
    pub fn paired(tenant_id: TenantId, wid: Wid) -> Self {
        let connection = Self::new(tenant_id);
        connection.state.lock().wid = Some(wid);
        connection
    }

    /// Simulate an inbound message arriving from the network.
    ///
    /// Returns false if no sink is attached.
    pub fn inject(&self, message: Message) -> bool {
        let sink = self.sink.lock().clone();
        match sink {
            Some(sink) => {
                sink.deliver(message);
                true
            }
            None => false,
        }
    }

    /// Make attachment content downloadable for a message id.
    pub fn add_media(&self, id: &MessageId, attachment: Attachment) {
        self.state.lock().media.insert(id.clone(), attachment);
    }

    /// Set the display title of a chat.
    pub fn set_title(&self, chat_id: impl Into<String>, title: impl Into<String>) {
        self.state.lock().titles.insert(chat_id.into(), title.into());
    }

    /// Simulate the transport dropping.
    pub fn drop_transport(&self) {
        self.state.lock().signals.transport_connected = false;
    }

    /// Messages sent through this connection.
    #[must_use]
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.state.lock().sent.clone()
    }

    /// Returns true once `dispose` has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Number of `dispose` calls, including repeated ones.
    #[must_use]
    pub fn dispose_calls(&self) -> usize {
        self.dispose_calls.load(Ordering::Acquire)
    }

    /// Returns true once the remote session has been erased.
    #[must_use]
    pub fn remote_erased(&self) -> bool {
        self.state.lock().remote_erased
    }

    /// Returns true if an inbound sink is attached.
    #[must_use]
    pub fn has_sink(&self) -> bool {
        self.sink.lock().is_some()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(ConnectionError::Disposed);
        }
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        self.ensure_live()?;
        let signals = self.state.lock().signals;
        if signals.transport_connected && signals.authenticated {
            Ok(())
        } else {
            Err(ConnectionError::NotConnected)
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn version(&self) -> String {
        format!("mock/{}", env!("CARGO_PKG_VERSION"))
    }

    fn signals(&self) -> ConnectionSignals {
        self.state.lock().signals
    }

    async fn connect(&self) -> Result<()> {
        self.ensure_live()?;
        let mut state = self.state.lock();
        if state.fail_connect {
            state.signals.transport_connected = false;
            state.signals.last_connect_attempt_failed = true;
            return Err(ConnectionError::Transport("scripted connect failure".into()));
        }

        state.signals = ConnectionSignals {
            transport_connected: true,
            authenticated: state.wid.is_some(),
            last_connect_attempt_failed: false,
        };
        tracing::debug!(
            tenant_id = %self.tenant_id,
            authenticated = state.signals.authenticated,
            "MockConnection: connected"
        );
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.ensure_live()?;
        let mut state = self.state.lock();
        state.signals.transport_connected = false;
        state.signals.authenticated = false;
        Ok(())
    }

    fn wid(&self) -> Result<Wid> {
        self.state
            .lock()
            .wid
            .clone()
            .ok_or(ConnectionError::IdentityUnknown)
    }

    async fn title(&self, chat_id: &str) -> Option<String> {
        self.state.lock().titles.get(chat_id).cloned()
    }

    async fn pair(&self, sink: mpsc::Sender<String>) -> Result<()> {
        self.ensure_live()?;
        if !self.state.lock().signals.transport_connected {
            return Err(ConnectionError::NotConnected);
        }

        let code = format!("2@mock,{},{}", self.tenant_id, uuid::Uuid::new_v4().simple());
        if sink.send(code).await.is_err() {
            tracing::debug!(tenant_id = %self.tenant_id, "pairing receiver dropped");
            return Ok(());
        }

        let mut state = self.state.lock();
        let wid = state
            .pair_as
            .clone()
            .ok_or_else(|| ConnectionError::Auth("no identity to pair as".into()))?;
        state.wid = Some(wid);
        state.signals.authenticated = true;
        Ok(())
    }

    async fn invite_link(&self, group_id: &str) -> Result<String> {
        self.ensure_ready()?;
        let code = group_id
            .strip_suffix(GROUP_SUFFIX)
            .ok_or_else(|| ConnectionError::InvalidRecipient(group_id.to_string()))?;
        Ok(format!("https://chat.whatsapp.com/{code}"))
    }

    async fn profile_picture(
        &self,
        chat_id: &str,
        known_id: Option<&str>,
    ) -> Result<Option<ProfilePicture>> {
        self.ensure_ready()?;
        let id = format!("{:x}", chat_id.len());
        if known_id == Some(id.as_str()) {
            return Ok(None);
        }
        Ok(Some(ProfilePicture {
            chat_id: chat_id.to_string(),
            url: format!("https://pps.example/{chat_id}/{id}.jpg"),
            id,
        }))
    }

    async fn download(&self, message: &Message) -> Result<Attachment> {
        self.ensure_ready()?;
        let stored = self.state.lock().media.get(&message.id).cloned();
        match stored {
            Some(attachment) => Ok(attachment),
            None => attachment_from_message(message),
        }
    }

    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt> {
        self.ensure_ready()?;
        let id = message
            .id
            .clone()
            .unwrap_or_else(|| MessageId::new(uuid::Uuid::new_v4().simple().to_string()));

        let mut state = self.state.lock();
        if let Some(attachment) = &message.attachment {
            state.media.insert(id.clone(), attachment.clone());
        }
        state.sent.push(message.clone());

        Ok(SendReceipt {
            id,
            timestamp: Utc::now(),
        })
    }

    fn set_sink(&self, sink: Arc<dyn InboundSink>) {
        *self.sink.lock() = Some(sink);
    }

    fn session_blob(&self) -> Option<Vec<u8>> {
        self.state
            .lock()
            .wid
            .as_ref()
            .map(|wid| format!("{SESSION_PREFIX}{wid}").into_bytes())
    }

    async fn dispose(&self) {
        self.dispose_calls.fetch_add(1, Ordering::AcqRel);
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.sink.lock().take();
        let mut state = self.state.lock();
        state.signals.transport_connected = false;
        state.signals.authenticated = false;
    }

    async fn delete(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.wid.is_none() {
                return Err(ConnectionError::IdentityUnknown);
            }
            state.remote_erased = true;
            state.wid = None;
        }
        self.dispose().await;
        Ok(())
    }
}
