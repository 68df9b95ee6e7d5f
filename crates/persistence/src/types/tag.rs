//! Stored tag types.
//!
//! This module defines the [`Tag`] row type together with the [`TagStatus`]
//! and [`PatientId`] value types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::tenant::TenantId;

/// Lifecycle status of a tag. No other values are representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagStatus {
    /// The tag resolves to its patient.
    Active,
    /// The tag is retained but no longer resolves.
    Inactive,
}

impl TagStatus {
    /// Returns the storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TagStatus::Active => "active",
            TagStatus::Inactive => "inactive",
        }
    }

    /// Returns `true` for [`TagStatus::Active`].
    pub fn is_active(&self) -> bool {
        matches!(self, TagStatus::Active)
    }
}

impl fmt::Display for TagStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TagStatus::Active),
            "inactive" => Ok(TagStatus::Inactive),
            other => Err(ValidationError::InvalidStatus {
                value: other.to_string(),
            }),
        }
    }
}

/// Identifier of a patient owned by the patient service.
///
/// Treated as opaque text; its string form is what tag searches match against.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(String);

impl PatientId {
    /// Creates a patient ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the patient ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PatientId({})", self.0)
    }
}

impl From<&str> for PatientId {
    fn from(s: &str) -> Self {
        PatientId::new(s)
    }
}

impl From<String> for PatientId {
    fn from(s: String) -> Self {
        PatientId::new(s)
    }
}

impl From<Uuid> for PatientId {
    fn from(id: Uuid) -> Self {
        PatientId::new(id.to_string())
    }
}

/// A tag row as persisted in a tenant's partition.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use nfc_persistence::tenant::TenantId;
/// use nfc_persistence::types::{PatientId, Tag, TagStatus};
///
/// let tag = Tag::issued(TenantId::new("org-1"), "tag-1", PatientId::new("p-1"), Utc::now());
///
/// assert_eq!(tag.tag_id(), "tag-1");
/// assert_eq!(tag.status(), TagStatus::Active);
/// assert!(tag.deactivated_at().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Surrogate row identifier.
    id: Uuid,

    /// The tenant whose partition holds this row.
    tenant_id: TenantId,

    /// External tag identifier, unique within the tenant.
    tag_id: String,

    /// The bound patient.
    patient_id: PatientId,

    /// Current lifecycle status.
    status: TagStatus,

    /// When the tag was last issued through an assignment.
    issued_at: Option<DateTime<Utc>>,

    /// When the tag last became inactive; cleared on reactivation.
    deactivated_at: Option<DateTime<Utc>>,
}

impl Tag {
    /// Creates a freshly issued, active tag row.
    pub fn issued(
        tenant_id: TenantId,
        tag_id: impl Into<String>,
        patient_id: PatientId,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            tag_id: tag_id.into(),
            patient_id,
            status: TagStatus::Active,
            issued_at: Some(issued_at),
            deactivated_at: None,
        }
    }

    /// Creates a tag from existing data (e.g., loaded from database).
    pub fn from_storage(
        id: Uuid,
        tenant_id: TenantId,
        tag_id: impl Into<String>,
        patient_id: PatientId,
        status: TagStatus,
        issued_at: Option<DateTime<Utc>>,
        deactivated_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            tag_id: tag_id.into(),
            patient_id,
            status,
            issued_at,
            deactivated_at,
        }
    }

    /// Returns the surrogate row identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the owning tenant.
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Returns the external tag identifier.
    pub fn tag_id(&self) -> &str {
        &self.tag_id
    }

    /// Returns the bound patient.
    pub fn patient_id(&self) -> &PatientId {
        &self.patient_id
    }

    /// Returns the current status.
    pub fn status(&self) -> TagStatus {
        self.status
    }

    /// Returns `true` if the tag currently resolves.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Returns when the tag was last issued.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    /// Returns when the tag was deactivated, if it is inactive.
    pub fn deactivated_at(&self) -> Option<DateTime<Utc>> {
        self.deactivated_at
    }
}
