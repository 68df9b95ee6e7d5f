//! Tenant identifier type.
//!
//! This module defines the [`TenantId`] type, an opaque identifier for the
//! organization whose data partition an operation is scoped to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Maximum accepted length of a tenant identifier.
const MAX_TENANT_ID_LEN: usize = 128;

/// An opaque tenant identifier.
///
/// In the care-coordination platform a tenant is an organization; the
/// identifier is the organization ID carried in the caller's identity or in
/// inbound domain events.
///
/// # Examples
///
/// ```
/// use nfc_persistence::tenant::TenantId;
///
/// let tenant = TenantId::new("org-1");
/// assert_eq!(tenant.as_str(), "org-1");
///
/// assert!(TenantId::parse("  ").is_err());
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Creates a new tenant ID from the given string without validation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parses a tenant ID from external input.
    ///
    /// Surrounding whitespace is trimmed. Empty or overlong identifiers are
    /// rejected.
    pub fn parse(id: &str) -> Result<Self, ValidationError> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::InvalidIdentifier {
                field: "tenant_id".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if trimmed.len() > MAX_TENANT_ID_LEN {
            return Err(ValidationError::InvalidIdentifier {
                field: "tenant_id".to_string(),
                message: format!("exceeds {} characters", MAX_TENANT_ID_LEN),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the tenant ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TenantId({})", self.0)
    }
}

impl FromStr for TenantId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TenantId::parse(s)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        TenantId::new(s)
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        TenantId::new(s)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
