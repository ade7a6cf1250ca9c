//! Per-tenant message cache and event handler registry.
//!
//! Every message a tenant's connection observes goes through
//! [`TenantHandlers::ingest`]: it is filtered, cached under its normalized
//! id and then handed to every registered [`EventHandler`] on its own task.
//!
//! The cache and the registry are guarded by independent locks. Neither is
//! held while handlers run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use msgbridge_connection::InboundSink;
use msgbridge_core::{Message, MessageId, TenantId};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{ControlError, Result};

/// A consumer of accepted inbound messages.
///
/// Handlers are identified by reference: registering the same `Arc` twice
/// has no effect.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one accepted message.
    async fn handle(&self, message: &Message);
}

/// What [`TenantHandlers::ingest`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Cached and dispatched.
    Accepted,
    /// Dropped because group messages are not handled.
    DroppedGroup,
    /// Dropped because broadcast messages are not handled.
    DroppedBroadcast,
}

/// Bounds the number of handler dispatches running at once.
#[derive(Debug, Clone)]
pub struct DispatchLimiter {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl DispatchLimiter {
    /// Create a limiter allowing `capacity` concurrent dispatches.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Take a permit without waiting.
    #[must_use]
    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.permits).try_acquire_owned().ok()
    }

    /// Number of dispatches currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Maximum number of concurrent dispatches.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Message cache and handler registry of one tenant.
pub struct TenantHandlers {
    tenant_id: TenantId,
    handle_groups: AtomicBool,
    handle_broadcast: AtomicBool,
    cache: Mutex<HashMap<MessageId, Message>>,
    registry: Mutex<Vec<Arc<dyn EventHandler>>>,
    limiter: DispatchLimiter,
    attached: AtomicBool,
}

impl TenantHandlers {
    /// Create an empty cache and registry.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        handle_groups: bool,
        handle_broadcast: bool,
        limiter: DispatchLimiter,
    ) -> Self {
        Self {
            tenant_id,
            handle_groups: AtomicBool::new(handle_groups),
            handle_broadcast: AtomicBool::new(handle_broadcast),
            cache: Mutex::new(HashMap::new()),
            registry: Mutex::new(Vec::new()),
            limiter,
            attached: AtomicBool::new(false),
        }
    }

    /// Change the group and broadcast filters for subsequent messages.
    pub fn set_filters(&self, handle_groups: bool, handle_broadcast: bool) {
        self.handle_groups.store(handle_groups, Ordering::Release);
        self.handle_broadcast.store(handle_broadcast, Ordering::Release);
    }

    /// Current `(handle_groups, handle_broadcast)` filters.
    #[must_use]
    pub fn filters(&self) -> (bool, bool) {
        (
            self.handle_groups.load(Ordering::Acquire),
            self.handle_broadcast.load(Ordering::Acquire),
        )
    }

    /// Filter, cache and dispatch one message.
    ///
    /// Returns as soon as the message is cached; handlers run on their own
    /// tasks and their outcome is never reported back.
    pub fn ingest(&self, mut message: Message) -> IngestOutcome {
        let (handle_groups, handle_broadcast) = self.filters();
        if !handle_groups && message.is_from_group() {
            return IngestOutcome::DroppedGroup;
        }
        if !handle_broadcast && message.is_from_broadcast() {
            return IngestOutcome::DroppedBroadcast;
        }

        message.id = MessageId::new(message.id.as_str());
        self.cache.lock().insert(message.id.clone(), message.clone());

        let handlers = self.registry.lock().clone();
        if !handlers.is_empty() {
            self.dispatch(handlers, message);
        }

        IngestOutcome::Accepted
    }

    fn dispatch(&self, handlers: Vec<Arc<dyn EventHandler>>, message: Message) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                tenant_id = %self.tenant_id,
                message_id = %message.id,
                "No async runtime, message not dispatched"
            );
            return;
        };

        let message = Arc::new(message);
        for handler in handlers {
            let Some(permit) = self.limiter.try_acquire() else {
                tracing::warn!(
                    tenant_id = %self.tenant_id,
                    message_id = %message.id,
                    capacity = self.limiter.capacity(),
                    "Dispatch limit reached, dropping handler dispatch"
                );
                continue;
            };

            let message = Arc::clone(&message);
            runtime.spawn(async move {
                handler.handle(&message).await;
                drop(permit);
            });
        }
    }

    /// Cached messages strictly newer than `since`, in no particular order.
    #[must_use]
    pub fn get_since(&self, since: DateTime<Utc>) -> Vec<Message> {
        self.cache
            .lock()
            .values()
            .filter(|m| m.timestamp > since)
            .cloned()
            .collect()
    }

    /// Look up a cached message, ignoring the casing of `id`.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::MessageNotFound` if the message is not cached.
    pub fn get_by_id(&self, id: &str) -> Result<Message> {
        let id = MessageId::new(id);
        self.cache
            .lock()
            .get(&id)
            .cloned()
            .ok_or(ControlError::MessageNotFound(id))
    }

    /// Number of cached messages.
    #[must_use]
    pub fn count(&self) -> usize {
        self.cache.lock().len()
    }

    /// Register a handler. Registering the same handler again is a no-op.
    pub fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut registry = self.registry.lock();
        if !registry.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            registry.push(handler);
        }
    }

    /// Unregister a handler. Unknown handlers are ignored.
    pub fn unregister(&self, handler: &Arc<dyn EventHandler>) {
        self.registry.lock().retain(|h| !Arc::ptr_eq(h, handler));
    }

    /// Remove every registered handler.
    pub fn clear(&self) {
        self.registry.lock().clear();
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Mark whether a live connection is feeding these handlers.
    pub fn set_attached(&self, attached: bool) {
        self.attached.store(attached, Ordering::Release);
    }

    /// Returns true if a live connection is feeding these handlers.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Dispatches currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.limiter.in_flight()
    }
}

impl InboundSink for TenantHandlers {
    fn deliver(&self, message: Message) {
        let outcome = self.ingest(message);
        if outcome != IngestOutcome::Accepted {
            tracing::trace!(tenant_id = %self.tenant_id, ?outcome, "Inbound message filtered");
        }
    }
}
