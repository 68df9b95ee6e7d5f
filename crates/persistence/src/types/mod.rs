//! Core types for the persistence layer.
//!
//! This module provides the fundamental types used throughout the persistence layer:
//!
//! - [`Tag`] - A stored tag row with its tenant and lifecycle timestamps
//! - [`TagStatus`], [`PatientId`] - Value types for tag rows
//! - [`TagQuery`], [`TagPage`] - Keyset pagination over a tenant's tags
//! - [`TagStats`] - Aggregate counts for a tenant partition
//!
//! # Examples
//!
//! ## Building a Listing Query
//!
//! ```
//! use nfc_persistence::types::{TagQuery, TagStatus};
//!
//! let query = TagQuery::new(20)
//!     .with_cursor("tag-0040")
//!     .with_status(TagStatus::Active)
//!     .with_search("  ward-3  ");
//!
//! assert_eq!(query.fetch_limit(), 21);
//! assert_eq!(query.search(), Some("ward-3"));
//! ```

mod pagination;
mod stats;
mod tag;

pub use pagination::{TagPage, TagQuery, fold_case};
pub use stats::TagStats;
pub use tag::{PatientId, Tag, TagStatus};
