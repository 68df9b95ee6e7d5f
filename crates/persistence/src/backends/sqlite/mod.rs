//! SQLite backend implementation.
//!
//! Supports both in-memory databases (for tests) and file-based databases.
//! All tenants share one table; every statement is filtered on `tenant_id`.
//!
//! # Example
//!
//! ```no_run
//! use nfc_persistence::backends::sqlite::SqliteBackend;
//! use nfc_persistence::tenant::{TenantContext, TenantId, TenantPermissions};
//! use nfc_persistence::types::PatientId;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SqliteBackend::in_memory()?;
//! backend.init_schema()?;
//!
//! let tenant = TenantContext::new(
//!     TenantId::new("acme"),
//!     TenantPermissions::full_access(),
//! );
//! backend.register_patient(&tenant, &PatientId::new("patient-1"))?;
//! # Ok(())
//! # }
//! ```
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE nfc_tags (
//!     id TEXT NOT NULL UNIQUE,          -- surrogate UUID
//!     tenant_id TEXT NOT NULL,
//!     tag_id TEXT NOT NULL,
//!     patient_id TEXT NOT NULL,
//!     status TEXT NOT NULL CHECK (status IN ('active', 'inactive')),
//!     issued_at TEXT,                   -- RFC 3339, added in v2
//!     deactivated_at TEXT,              -- RFC 3339, added in v2
//!     PRIMARY KEY (tenant_id, tag_id)
//! );
//!
//! CREATE TABLE patients (
//!     tenant_id TEXT NOT NULL,
//!     id TEXT NOT NULL,
//!     PRIMARY KEY (tenant_id, id)
//! );
//!
//! -- v3
//! CREATE UNIQUE INDEX idx_nfc_tags_active_patient
//!     ON nfc_tags(tenant_id, patient_id) WHERE status = 'active';
//! ```

mod backend;
mod queries;
pub(crate) mod schema;
mod store;
mod transaction;

pub use backend::{SqliteBackend, SqliteBackendConfig};
pub use schema::SCHEMA_VERSION;
pub use transaction::SqliteTransaction;
