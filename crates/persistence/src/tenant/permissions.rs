//! Tenant permission types.
//!
//! This module defines the permission model for tag operations, controlling
//! what actions a tenant context is allowed to perform.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Operations that can be performed on tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Resolve a tag to its patient (check-in / check-out).
    Resolve,
    /// Bind a tag to a patient.
    Assign,
    /// Deactivate a tag.
    Deactivate,
    /// Reactivate a previously deactivated tag.
    Reactivate,
    /// Swap a patient's tag for a new one.
    Replace,
    /// Read tags and statistics.
    Read,
    /// Cascade deactivations triggered by other services.
    Reconcile,
}

impl Operation {
    /// Every operation, in declaration order.
    pub const ALL: [Operation; 7] = [
        Operation::Resolve,
        Operation::Assign,
        Operation::Deactivate,
        Operation::Reactivate,
        Operation::Replace,
        Operation::Read,
        Operation::Reconcile,
    ];
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Resolve => write!(f, "resolve"),
            Operation::Assign => write!(f, "assign"),
            Operation::Deactivate => write!(f, "deactivate"),
            Operation::Reactivate => write!(f, "reactivate"),
            Operation::Replace => write!(f, "replace"),
            Operation::Read => write!(f, "read"),
            Operation::Reconcile => write!(f, "reconcile"),
        }
    }
}

/// Permissions granted to a tenant context.
///
/// Role-to-permission mapping happens in the identity layer; by the time a
/// context reaches the tag engine it only carries the resulting operation set.
///
/// # Examples
///
/// ```
/// use nfc_persistence::tenant::{TenantPermissions, Operation};
///
/// let full = TenantPermissions::full_access();
/// assert!(full.can_perform(Operation::Assign));
///
/// let read_only = TenantPermissions::read_only();
/// assert!(read_only.can_perform(Operation::Read));
/// assert!(!read_only.can_perform(Operation::Resolve));
///
/// let custom = TenantPermissions::builder()
///     .allow_operations(vec![Operation::Read, Operation::Deactivate])
///     .build();
/// assert!(custom.can_perform(Operation::Deactivate));
/// assert!(!custom.can_perform(Operation::Assign));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantPermissions {
    /// Allowed operations. If None, all operations are allowed.
    allowed_operations: Option<HashSet<Operation>>,
}

impl TenantPermissions {
    /// Creates permissions with full access to all operations.
    pub fn full_access() -> Self {
        Self {
            allowed_operations: None,
        }
    }

    /// Creates read-only permissions (tag lookups, listings, statistics).
    pub fn read_only() -> Self {
        Self::builder().allow_operations(vec![Operation::Read]).build()
    }

    /// Creates permissions for caregivers scanning tags at check-in and check-out.
    pub fn check_in_only() -> Self {
        Self::builder()
            .allow_operations(vec![Operation::Resolve, Operation::Read])
            .build()
    }

    /// Creates a builder for custom permissions.
    pub fn builder() -> TenantPermissionsBuilder {
        TenantPermissionsBuilder::new()
    }

    /// Returns `true` if the given operation is permitted.
    pub fn can_perform(&self, operation: Operation) -> bool {
        match self.allowed_operations {
            Some(ref allowed_ops) => allowed_ops.contains(&operation),
            None => true,
        }
    }

    /// Returns the set of allowed operations, or None if all are allowed.
    pub fn allowed_operations(&self) -> Option<&HashSet<Operation>> {
        self.allowed_operations.as_ref()
    }
}

impl Default for TenantPermissions {
    fn default() -> Self {
        Self::full_access()
    }
}

/// Builder for creating custom tenant permissions.
#[derive(Default)]
pub struct TenantPermissionsBuilder {
    allowed_operations: Option<HashSet<Operation>>,
}

impl TenantPermissionsBuilder {
    /// Creates a new builder. Without further calls it grants everything.
    pub fn new() -> Self {
        Self {
            allowed_operations: None,
        }
    }

    /// Sets the allowed operations.
    pub fn allow_operations(mut self, operations: Vec<Operation>) -> Self {
        self.allowed_operations = Some(operations.into_iter().collect());
        self
    }

    /// Adds a single allowed operation.
    pub fn allow(mut self, operation: Operation) -> Self {
        self.allowed_operations
            .get_or_insert_with(HashSet::new)
            .insert(operation);
        self
    }

    /// Builds the permissions.
    pub fn build(self) -> TenantPermissions {
        TenantPermissions {
            allowed_operations: self.allowed_operations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_access() {
        let perms = TenantPermissions::full_access();
        for op in Operation::ALL {
            assert!(perms.can_perform(op), "{op} should be allowed");
        }
        assert!(perms.allowed_operations().is_none());
    }

    #[test]
    fn test_read_only() {
        let perms = TenantPermissions::read_only();
        assert!(perms.can_perform(Operation::Read));
        assert!(!perms.can_perform(Operation::Resolve));
        assert!(!perms.can_perform(Operation::Assign));
        assert!(!perms.can_perform(Operation::Reconcile));
    }

    #[test]
    fn test_check_in_only() {
        let perms = TenantPermissions::check_in_only();
        assert!(perms.can_perform(Operation::Resolve));
        assert!(perms.can_perform(Operation::Read));
        assert!(!perms.can_perform(Operation::Deactivate));
        assert!(!perms.can_perform(Operation::Replace));
    }

    #[test]
    fn test_builder_allow_accumulates() {
        let perms = TenantPermissions::builder()
            .allow(Operation::Assign)
            .allow(Operation::Replace)
            .build();
        assert!(perms.can_perform(Operation::Assign));
        assert!(perms.can_perform(Operation::Replace));
        assert!(!perms.can_perform(Operation::Read));
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::Resolve.to_string(), "resolve");
        assert_eq!(Operation::Assign.to_string(), "assign");
        assert_eq!(Operation::Reconcile.to_string(), "reconcile");
    }
}
