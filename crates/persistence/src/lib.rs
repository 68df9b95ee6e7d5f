//! NFC Tag Registry Persistence Layer
//!
//! This crate stores NFC tag assignments per tenant. It provides the tag
//! store contract the lifecycle engine is written against, and a SQLite
//! implementation of it.
//!
//! # Features
//!
//! - **Tenant isolation**: every call takes a [`TenantContext`](tenant::TenantContext);
//!   there is no ambient "current tenant"
//! - **Atomic writes**: mutations run in one write transaction that the caller commits
//! - **Store-enforced invariant**: at most one active tag per patient, backed by a
//!   partial unique index
//! - **Keyset pagination**: ordered by `tag_id` with an exclusive cursor
//!
//! # Architecture
//!
//! - [`tenant`] - Tenant identity, context, and operation permissions
//! - [`types`] - Stored tags, listing queries, and aggregate counts
//! - [`error`] - Error types for all operations
//! - [`core`] - Store and transaction traits
//! - [`backends`] - Backend implementations
//!
//! # Multitenancy
//!
//! ```
//! use nfc_persistence::tenant::{TenantContext, TenantId, TenantPermissions, Operation};
//!
//! let nurse = TenantContext::new(
//!     TenantId::new("st-mary"),
//!     TenantPermissions::check_in_only(),
//! )
//! .with_user_id("nurse-7");
//!
//! assert!(nurse.check_permission(Operation::Resolve).is_ok());
//! assert!(nurse.check_permission(Operation::Assign).is_err());
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod core;
pub mod error;
pub mod tenant;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{StorageError, StorageResult};
pub use tenant::{TenantContext, TenantId, TenantPermissions};
pub use types::{PatientId, Tag, TagPage, TagQuery, TagStats, TagStatus};

pub use core::{TagStore, TagTransaction};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
