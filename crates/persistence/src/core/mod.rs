//! Core storage traits and abstractions.
//!
//! This module provides the two traits every tag store implements:
//!
//! - [`TagStore`] - Tenant-scoped reads and the entry point for writes
//! - [`TagTransaction`] - An open write transaction on one tenant partition
//!
//! Stores carry no business rules. The lifecycle engine decides what to
//! write; the store guarantees tenant scoping, atomic commits, and the
//! one-active-tag-per-patient constraint.
//!
//! # Example
//!
//! ```ignore
//! use nfc_persistence::core::{TagStore, TagTransaction};
//!
//! async fn deactivate<S: TagStore>(store: &S, tenant: &TenantContext) -> StorageResult<u64> {
//!     let mut tx = store.begin(tenant).await?;
//!     let changed = tx.set_status("tag-1", TagStatus::Inactive, Utc::now()).await?;
//!     Box::new(tx).commit().await?;
//!     Ok(changed)
//! }
//! ```

mod store;

pub use store::{TagStore, TagTransaction};
