//! Keyset pagination over a tenant's tags.
//!
//! Pages are ordered ascending by `tag_id`. The cursor is the last `tag_id`
//! seen on the previous page and is exclusive. Stores fetch one row more
//! than the page size so that [`TagPage::from_overfetch`] can tell whether
//! another page exists without a separate count query.

use serde::{Deserialize, Serialize};

use super::tag::{Tag, TagStatus};

/// Folds case for search comparisons.
///
/// Unicode-aware, unlike SQL `LOWER()`, which only folds ASCII.
pub fn fold_case(value: &str) -> String {
    value.to_lowercase()
}

/// Parameters for listing a tenant's tags.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagQuery {
    limit: usize,
    cursor: Option<String>,
    status: Option<TagStatus>,
    search: Option<String>,
}

impl TagQuery {
    /// Creates a query returning at most `limit` tags.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    /// Starts after the given `tag_id`.
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Restricts results to one status.
    pub fn with_status(mut self, status: TagStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Adds a case-insensitive substring filter on `tag_id` or `patient_id`.
    ///
    /// The term is trimmed; a blank term leaves the query unfiltered.
    pub fn with_search(mut self, search: impl AsRef<str>) -> Self {
        let term = search.as_ref().trim();
        self.search = if term.is_empty() {
            None
        } else {
            Some(term.to_string())
        };
        self
    }

    /// Returns the page size.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Returns the number of rows a store should fetch.
    pub fn fetch_limit(&self) -> usize {
        self.limit.saturating_add(1)
    }

    /// Returns the exclusive cursor.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Returns the status filter.
    pub fn status(&self) -> Option<TagStatus> {
        self.status
    }

    /// Returns the trimmed search term.
    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    /// Returns the search term as a `LIKE` pattern, case-folded with
    /// [`fold_case`], with `%`, `_` and `\` escaped for use with `ESCAPE '\'`.
    ///
    /// Stores must fold the searched columns with the same function.
    pub fn search_pattern(&self) -> Option<String> {
        self.search.as_deref().map(|term| {
            let mut pattern = String::with_capacity(term.len() + 2);
            pattern.push('%');
            for c in fold_case(term).chars() {
                if matches!(c, '%' | '_' | '\\') {
                    pattern.push('\\');
                }
                pattern.push(c);
            }
            pattern.push('%');
            pattern
        })
    }
}

/// One page of tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagPage {
    /// Tags on this page, ascending by `tag_id`.
    pub items: Vec<Tag>,
    /// Cursor for the next page, if more tags exist.
    pub next_cursor: Option<String>,
}

impl TagPage {
    /// Builds a page from up to `limit + 1` rows.
    ///
    /// ```
    /// use chrono::Utc;
    /// use nfc_persistence::tenant::TenantId;
    /// use nfc_persistence::types::{PatientId, Tag, TagPage};
    ///
    /// let rows: Vec<Tag> = ["tag-1", "tag-2", "tag-3"]
    ///     .iter()
    ///     .map(|id| Tag::issued(TenantId::new("org-1"), *id, PatientId::new("p"), Utc::now()))
    ///     .collect();
    ///
    /// let page = TagPage::from_overfetch(rows, 2);
    /// assert_eq!(page.items.len(), 2);
    /// assert_eq!(page.next_cursor.as_deref(), Some("tag-2"));
    /// ```
    pub fn from_overfetch(mut rows: Vec<Tag>, limit: usize) -> Self {
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next_cursor = if has_more {
            rows.last().map(|tag| tag.tag_id().to_string())
        } else {
            None
        };
        Self {
            items: rows,
            next_cursor,
        }
    }

    /// Returns an empty page.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }
}
