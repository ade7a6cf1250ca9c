//! Core identifier types for msgbridge.
//!
//! This module provides strongly-typed identifiers for tenants, network
//! identities and messages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 16-byte tenant identifier based on UUID v4.
///
/// Tenant IDs are generated when a bot is registered with the gateway and
/// never change afterwards, even when the bot is re-paired.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(uuid::Uuid);

impl TenantId {
    /// Create a new `TenantId` from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a new random `TenantId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Return the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Return the bytes of the UUID.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl FromStr for TenantId {
    type Err = IdError;

    /// Parse a `TenantId` from a UUID string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
        Ok(Self(uuid))
    }
}

impl fmt::Debug for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TenantId({})", self.0)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for TenantId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0.to_string()
    }
}

impl AsRef<[u8]> for TenantId {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// The network-assigned identity of a paired account.
///
/// A wid looks like `5511999999999@s.whatsapp.net`, possibly with a device
/// suffix (`5511999999999.0:3@s.whatsapp.net`), or just the bare user part.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Wid(String);

impl Wid {
    /// Create a `Wid`, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `IdError::Empty` if nothing is left after trimming.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, IdError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(IdError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Return the wid as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract the phone number part of the wid.
    ///
    /// Everything after `@`, and any device suffix after `.` or `:`, is
    /// dropped. The result only keeps the leading digits.
    #[must_use]
    pub fn phone(&self) -> String {
        let compact: String = self.0.chars().filter(|c| !c.is_whitespace()).collect();
        let user = compact.split('@').next().unwrap_or_default();
        let user = user.split(['.', ':']).next().unwrap_or_default();
        user.trim_start_matches('+')
            .chars()
            .take_while(char::is_ascii_digit)
            .collect()
    }

    /// Returns true if the given raw identity refers to the same account.
    ///
    /// Device suffixes and the server part are ignored.
    #[must_use]
    pub fn matches(&self, other: &str) -> bool {
        Wid::new(other).is_ok_and(|other| other.phone() == self.phone() && !self.phone().is_empty())
            || self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl fmt::Debug for Wid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wid({})", self.0)
    }
}

impl fmt::Display for Wid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Wid {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Wid> for String {
    fn from(wid: Wid) -> Self {
        wid.0
    }
}

/// A message identifier, compared case-insensitively.
///
/// The raw id is normalized to upper case on construction, so two ids that
/// differ only in casing are equal and hash identically.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct MessageId(String);

impl MessageId {
    /// Create a normalized `MessageId`.
    #[must_use]
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_uppercase())
    }

    /// Return the normalized id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the id is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.0
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,

    /// The input is empty.
    #[error("identifier must not be empty")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_id_roundtrip() {
        let id = TenantId::generate();
        let str_repr = id.to_string();
        let parsed = TenantId::from_str(&str_repr).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn tenant_id_invalid_uuid() {
        let result = TenantId::from_str("not-a-uuid");
        assert!(matches!(result, Err(IdError::InvalidUuid)));
    }

    #[test]
    fn tenant_id_serde_json() {
        let id = TenantId::generate();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: TenantId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn message_id_is_case_insensitive() {
        let lower = MessageId::new("3eb0a1b2c3");
        let upper = MessageId::new("3EB0A1B2C3");
        assert_eq!(lower, upper);
        assert_eq!(lower.as_str(), "3EB0A1B2C3");
    }

    #[test]
    fn message_id_deserialize_normalizes() {
        let id: MessageId = serde_json::from_str("\" abcDEF \"").unwrap();
        assert_eq!(id.as_str(), "ABCDEF");
    }

    #[test]
    fn wid_phone_extraction() {
        let wid = Wid::new("5511999999999@s.whatsapp.net").unwrap();
        assert_eq!(wid.phone(), "5511999999999");

        let device = Wid::new("5511999999999.0:3@s.whatsapp.net").unwrap();
        assert_eq!(device.phone(), "5511999999999");

        let bare = Wid::new("+55 11 99999 9999").unwrap();
        assert_eq!(bare.phone(), "5511999999999");
    }

    #[test]
    fn wid_matches_ignores_device_suffix() {
        let wid = Wid::new("5511999999999@s.whatsapp.net").unwrap();
        assert!(wid.matches("5511999999999.0:7@s.whatsapp.net"));
        assert!(wid.matches("5511999999999"));
        assert!(!wid.matches("5511888888888@s.whatsapp.net"));
    }

    #[test]
    fn wid_rejects_empty() {
        assert!(matches!(Wid::new("   "), Err(IdError::Empty)));
    }
}
