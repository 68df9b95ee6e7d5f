//! Error types for the lifecycle engine.
//!
//! Storage errors from the persistence layer are mapped onto the caller-facing
//! taxonomy and from there to HTTP status codes:
//!
//! | Error | Kind | HTTP Status |
//! |-------|------|-------------|
//! | TagNotFound, NoActiveTag, PatientNotFound | NotFound | 404 |
//! | Inactive | Inactive | 403 |
//! | Forbidden (tenant or permission) | Forbidden | 403 |
//! | Conflict (incl. store constraint) | Conflict | 409 |
//! | InvalidArgument | InvalidArgument | 400 |
//! | Storage | Internal | 500 |

use std::fmt;

use http::StatusCode;
use nfc_persistence::error::{ConstraintError, StorageError, TenantError, ValidationError};
use nfc_persistence::types::PatientId;
use thiserror::Error;

/// Why an operation would break one-active-tag-per-patient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// The patient already has a different active tag.
    PatientHasActiveTag {
        /// The patient.
        patient_id: PatientId,
        /// The tag currently active for the patient, when known.
        active_tag_id: Option<String>,
    },
    /// The replacement tag is bound to another patient.
    TagAssignedElsewhere {
        /// The replacement tag.
        tag_id: String,
        /// The patient the replacement tag is bound to.
        patient_id: PatientId,
    },
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::PatientHasActiveTag { .. } => {
                f.write_str("Patient already has an active NFC tag")
            }
            ConflictReason::TagAssignedElsewhere { .. } => {
                f.write_str("New tag is assigned to a different patient")
            }
        }
    }
}

/// Broad error category reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The tag or patient does not exist in the caller's tenant.
    NotFound,
    /// The tag exists but is not active.
    Inactive,
    /// The operation would violate one-active-tag-per-patient.
    Conflict,
    /// The request itself is invalid.
    InvalidArgument,
    /// The caller may not perform the operation.
    Forbidden,
    /// A storage failure.
    Internal,
}

/// The error type for lifecycle operations.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// No tag with this id in the caller's tenant.
    #[error("NFC tag not found")]
    TagNotFound {
        /// The requested tag.
        tag_id: String,
    },

    /// The patient has no active tag.
    #[error("NFC tag not found")]
    NoActiveTag {
        /// The requested patient.
        patient_id: PatientId,
    },

    /// The patient does not exist in the caller's tenant.
    #[error("Patient not found")]
    PatientNotFound {
        /// The requested patient.
        patient_id: PatientId,
    },

    /// The tag exists but is inactive.
    #[error("NFC tag is not active")]
    Inactive {
        /// The inactive tag.
        tag_id: String,
    },

    /// One-active-tag-per-patient would be violated.
    #[error("{0}")]
    Conflict(ConflictReason),

    /// Invalid request arguments.
    #[error("{message}")]
    InvalidArgument {
        /// What was wrong.
        message: String,
    },

    /// The tenant context does not allow the operation.
    #[error(transparent)]
    Forbidden(TenantError),

    /// Any other storage failure.
    #[error(transparent)]
    Storage(StorageError),
}

impl LifecycleError {
    /// Creates an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        LifecycleError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Returns the broad category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::TagNotFound { .. }
            | LifecycleError::NoActiveTag { .. }
            | LifecycleError::PatientNotFound { .. } => ErrorKind::NotFound,
            LifecycleError::Inactive { .. } => ErrorKind::Inactive,
            LifecycleError::Conflict(_) => ErrorKind::Conflict,
            LifecycleError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            LifecycleError::Forbidden(_) => ErrorKind::Forbidden,
            LifecycleError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Inactive | ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` if the same call might succeed later.
    pub fn is_transient(&self) -> bool {
        matches!(self, LifecycleError::Storage(e) if e.is_transient())
    }
}

impl From<StorageError> for LifecycleError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Constraint(ConstraintError::ActiveTagExists { patient_id }) => {
                LifecycleError::Conflict(ConflictReason::PatientHasActiveTag {
                    patient_id,
                    active_tag_id: None,
                })
            }
            StorageError::Tenant(e) => LifecycleError::Forbidden(e),
            StorageError::Validation(e) => e.into(),
            other => LifecycleError::Storage(other),
        }
    }
}

impl From<TenantError> for LifecycleError {
    fn from(err: TenantError) -> Self {
        LifecycleError::Forbidden(err)
    }
}

impl From<ValidationError> for LifecycleError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidStatus { .. } => {
                LifecycleError::invalid_argument("Invalid status filter")
            }
            other => LifecycleError::invalid_argument(other.to_string()),
        }
    }
}

/// Result type alias for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;
