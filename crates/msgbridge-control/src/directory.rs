//! In-memory directory of active tenants.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use msgbridge_core::TenantId;
use parking_lot::RwLock;

use crate::error::{ControlError, Result};
use crate::tenant::Tenant;

/// Active tenants, looked up by id, token or network identity.
#[derive(Default)]
pub struct TenantDirectory {
    tenants: RwLock<HashMap<TenantId, Arc<Tenant>>>,
}

impl TenantDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a tenant by id.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::TenantNotFound` if no tenant has this id.
    pub fn get(&self, tenant_id: &TenantId) -> Result<Arc<Tenant>> {
        self.tenants
            .read()
            .get(tenant_id)
            .cloned()
            .ok_or(ControlError::TenantNotFound)
    }

    /// Get a tenant by its HTTP token.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::TenantNotFound` if no tenant has this token.
    pub fn by_token(&self, token: &str) -> Result<Arc<Tenant>> {
        self.tenants
            .read()
            .values()
            .find(|t| t.token() == token)
            .cloned()
            .ok_or(ControlError::TenantNotFound)
    }

    /// Get a tenant by network identity. Device suffixes are ignored.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::TenantNotFound` if no paired tenant matches.
    pub fn by_wid(&self, wid: &str) -> Result<Arc<Tenant>> {
        self.tenants
            .read()
            .values()
            .find(|t| t.wid().is_some_and(|w| w.matches(wid)))
            .cloned()
            .ok_or(ControlError::TenantNotFound)
    }

    /// Get the tenant registered under `tenant_id`, or build and add it.
    ///
    /// `build` runs under the write lock and only when no tenant holds the
    /// id, so concurrent callers all receive the same tenant.
    ///
    /// # Errors
    ///
    /// Returns the error of `build`; the directory is left unchanged.
    pub fn get_or_insert_with(
        &self,
        tenant_id: TenantId,
        build: impl FnOnce() -> Result<Arc<Tenant>>,
    ) -> Result<Arc<Tenant>> {
        match self.tenants.write().entry(tenant_id) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => Ok(Arc::clone(entry.insert(build()?))),
        }
    }

    /// Remove a tenant, returning it if it was present.
    pub fn remove(&self, tenant_id: &TenantId) -> Option<Arc<Tenant>> {
        self.tenants.write().remove(tenant_id)
    }

    /// All tenants, in no particular order.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<Tenant>> {
        self.tenants.read().values().cloned().collect()
    }

    /// Number of tenants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tenants.read().len()
    }

    /// Returns true if there are no tenants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tenants.read().is_empty()
    }
}
