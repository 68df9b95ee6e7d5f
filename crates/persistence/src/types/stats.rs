//! Aggregate tag counts.

use serde::{Deserialize, Serialize};

/// Tag counts for one tenant partition.
///
/// Every field is always present; an empty partition reports zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagStats {
    /// Number of tag rows.
    pub total: u64,
    /// Number of active tags.
    pub active: u64,
    /// Number of inactive tags.
    pub inactive: u64,
}

impl TagStats {
    /// Builds stats from nullable SQL aggregates, treating `NULL` as zero.
    pub fn from_aggregates(total: Option<i64>, active: Option<i64>, inactive: Option<i64>) -> Self {
        let count = |value: Option<i64>| value.unwrap_or(0).max(0) as u64;
        Self {
            total: count(total),
            active: count(active),
            inactive: count(inactive),
        }
    }
}
