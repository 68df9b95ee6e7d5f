//! Error types for the persistence layer.
//!
//! This module defines all error types used by tag stores, following a
//! hierarchy that separates constraint errors, tenant errors, validation
//! errors, transaction errors, and backend errors.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::tenant::TenantId;
use crate::types::PatientId;

/// The primary error type for all storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Store-enforced invariant violations
    #[error(transparent)]
    Constraint(#[from] ConstraintError),

    /// Tenant isolation errors
    #[error(transparent)]
    Tenant(#[from] TenantError),

    /// Validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Transaction errors
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl StorageError {
    /// Returns `true` if retrying the same operation later might succeed.
    ///
    /// Connectivity problems and lock contention are transient; constraint,
    /// tenant, and validation failures will fail again on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::Backend(
                BackendError::Unavailable { .. }
                    | BackendError::ConnectionFailed { .. }
                    | BackendError::PoolExhausted { .. }
                    | BackendError::Busy { .. }
            ) | StorageError::Transaction(TransactionError::BeginFailed { .. })
        )
    }
}

/// Violations of invariants that the store enforces itself.
#[derive(Error, Debug)]
pub enum ConstraintError {
    /// A second tag would become active for the same patient.
    #[error("patient {patient_id} already has an active tag")]
    ActiveTagExists { patient_id: PatientId },
}

/// Errors related to tenant isolation.
#[derive(Error, Debug)]
pub enum TenantError {
    /// Access to data of another tenant denied.
    #[error("access denied: tenant {tenant_id} cannot access data of tenant {target_tenant}")]
    AccessDenied {
        tenant_id: TenantId,
        target_tenant: TenantId,
    },

    /// The specified tenant does not exist or is invalid.
    #[error("invalid tenant: {tenant_id}")]
    InvalidTenant { tenant_id: TenantId },

    /// Operation not permitted for tenant.
    #[error("operation {operation} not permitted for tenant {tenant_id}")]
    OperationNotPermitted {
        tenant_id: TenantId,
        operation: String,
    },
}

/// Errors related to input validation.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// A status value other than `active` or `inactive`.
    #[error("invalid tag status: {value}")]
    InvalidStatus { value: String },

    /// An identifier that cannot be stored (empty or too long).
    #[error("invalid {field}: {message}")]
    InvalidIdentifier { field: String, message: String },

    /// Missing required field.
    #[error("missing required field: {field}")]
    MissingRequiredField { field: String },
}

/// Errors related to transactions.
#[derive(Error, Debug)]
pub enum TransactionError {
    /// The transaction could not be started.
    #[error("failed to begin transaction: {reason}")]
    BeginFailed { reason: String },

    /// Transaction was rolled back.
    #[error("transaction rolled back: {reason}")]
    RolledBack { reason: String },

    /// Transaction is no longer valid (already committed or rolled back).
    #[error("transaction no longer valid")]
    InvalidTransaction,
}

/// Errors originating from the database backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is currently unavailable.
    #[error("backend unavailable: {backend_name}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Connection pool exhausted.
    #[error("connection pool exhausted for {backend_name}")]
    PoolExhausted { backend_name: String },

    /// The database stayed locked past the busy timeout.
    #[error("{backend_name} is busy: {message}")]
    Busy {
        backend_name: String,
        message: String,
    },

    /// Schema migration error.
    #[error("schema migration failed: {message}")]
    MigrationError { message: String },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref failure, _) = err {
            if matches!(
                failure.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) {
                return StorageError::Backend(BackendError::Busy {
                    backend_name: "sqlite".to_string(),
                    message: err.to_string(),
                });
            }
        }
        StorageError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StorageError {
    fn from(_err: r2d2::Error) -> Self {
        StorageError::Backend(BackendError::PoolExhausted {
            backend_name: "sqlite".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_error_display() {
        let err = StorageError::Constraint(ConstraintError::ActiveTagExists {
            patient_id: PatientId::new("p-1"),
        });
        assert_eq!(err.to_string(), "patient p-1 already has an active tag");
    }

    #[test]
    fn test_tenant_error_display() {
        let err = TenantError::OperationNotPermitted {
            tenant_id: TenantId::new("org-1"),
            operation: "assign".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "operation assign not permitted for tenant org-1"
        );
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::InvalidStatus {
            value: "pending".to_string(),
        };
        assert_eq!(err.to_string(), "invalid tag status: pending");
    }

    #[test]
    fn test_transient_classification() {
        let busy = StorageError::Backend(BackendError::Busy {
            backend_name: "sqlite".to_string(),
            message: "database is locked".to_string(),
        });
        assert!(busy.is_transient());

        let pool = StorageError::Backend(BackendError::PoolExhausted {
            backend_name: "sqlite".to_string(),
        });
        assert!(pool.is_transient());

        let constraint = StorageError::Constraint(ConstraintError::ActiveTagExists {
            patient_id: PatientId::new("p-1"),
        });
        assert!(!constraint.is_transient());

        let invalid: StorageError = ValidationError::InvalidStatus {
            value: "x".to_string(),
        }
        .into();
        assert!(!invalid.is_transient());
    }

    #[test]
    fn test_storage_error_from_sub_errors() {
        let err: StorageError = TransactionError::InvalidTransaction.into();
        assert!(matches!(err, StorageError::Transaction(_)));

        let err: StorageError = BackendError::MigrationError {
            message: "boom".to_string(),
        }
        .into();
        assert!(matches!(err, StorageError::Backend(_)));
    }
}
