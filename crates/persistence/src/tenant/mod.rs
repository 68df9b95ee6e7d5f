//! Tenant management for multi-tenant tag storage.
//!
//! This module provides the core types for multi-tenant support in the persistence layer.
//! All storage operations require a [`TenantContext`] to ensure proper tenant isolation.
//!
//! # Core Types
//!
//! - [`TenantId`] - Opaque tenant (organization) identifier
//! - [`TenantContext`] - Validated context required for all storage operations
//! - [`TenantPermissions`] - Defines which tag operations a context can perform
//!
//! # Design Philosophy
//!
//! Every tag store call takes a `TenantContext` and every SQL statement the
//! backends issue is filtered by its tenant ID. There is no ambient "current
//! tenant" on a connection; the context travels with the call.
//!
//! # Examples
//!
//! ```
//! use nfc_persistence::tenant::{Operation, TenantContext, TenantId, TenantPermissions};
//!
//! // Organization admin
//! let admin = TenantContext::new(
//!     TenantId::new("org-1"),
//!     TenantPermissions::full_access(),
//! );
//!
//! // Caregiver who may only check patients in and out
//! let caregiver = TenantContext::new(
//!     TenantId::new("org-1"),
//!     TenantPermissions::check_in_only(),
//! )
//! .with_user_id("caregiver-7");
//!
//! assert!(admin.check_permission(Operation::Assign).is_ok());
//! assert!(caregiver.check_permission(Operation::Resolve).is_ok());
//! assert!(caregiver.check_permission(Operation::Assign).is_err());
//! ```

mod context;
mod id;
mod permissions;

pub use context::{TenantContext, TenantContextBuilder};
pub use id::TenantId;
pub use permissions::{Operation, TenantPermissions, TenantPermissionsBuilder};
