//! Construction of fresh connections.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use msgbridge_store::TenantRecord;
use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::error::{ConnectionError, Result};
use crate::offline::OfflineFactory;

/// Which backend connections are built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// No network backend; connections never come up.
    #[default]
    Offline,
    /// In-memory scriptable backend (`test-utils` feature).
    Mock,
}

impl FromStr for BackendKind {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "offline" => Ok(Self::Offline),
            "mock" => Ok(Self::Mock),
            other => Err(ConnectionError::Unavailable(format!(
                "unknown backend: {other}"
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => f.write_str("offline"),
            Self::Mock => f.write_str("mock"),
        }
    }
}

/// Builds a fresh connection for a tenant.
///
/// Every call returns a new object; disposed connections are never reused.
pub trait ConnectionFactory: Send + Sync {
    /// The backend this factory builds.
    fn kind(&self) -> BackendKind;

    /// Build a connection for `record`, resuming `session` if one was
    /// persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot build a connection.
    fn create(
        &self,
        record: &TenantRecord,
        session: Option<Vec<u8>>,
    ) -> Result<Arc<dyn Connection>>;
}

/// Build the factory for a configured backend.
///
/// # Errors
///
/// Returns [`ConnectionError::Unavailable`] if the backend is not compiled in.
pub fn factory_for(kind: BackendKind) -> Result<Arc<dyn ConnectionFactory>> {
    match kind {
        BackendKind::Offline => Ok(Arc::new(OfflineFactory)),
        #[cfg(any(test, feature = "test-utils"))]
        BackendKind::Mock => Ok(Arc::new(crate::mock::MockFactory::new())),
        #[cfg(not(any(test, feature = "test-utils")))]
        BackendKind::Mock => Err(ConnectionError::Unavailable(
            "mock backend requires the test-utils feature".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_parsing() {
        assert_eq!("offline".parse::<BackendKind>().unwrap(), BackendKind::Offline);
        assert_eq!(" MOCK ".parse::<BackendKind>().unwrap(), BackendKind::Mock);
        assert_eq!("".parse::<BackendKind>().unwrap(), BackendKind::Offline);
        assert!("whatsmeow".parse::<BackendKind>().is_err());
    }

    #[test]
    fn factory_matches_kind() {
        assert_eq!(factory_for(BackendKind::Offline).unwrap().kind(), BackendKind::Offline);
        assert_eq!(factory_for(BackendKind::Mock).unwrap().kind(), BackendKind::Mock);
    }
}
