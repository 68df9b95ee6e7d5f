//! Tenant context for storage operations.
//!
//! This module defines [`TenantContext`], which provides validated tenant
//! information required for ALL storage operations. Operations cannot be
//! performed without a tenant context, so tenant isolation holds at the type
//! level.

use std::sync::Arc;

use super::id::TenantId;
use super::permissions::{Operation, TenantPermissions};
use crate::error::{TenantError, ValidationError};

/// A validated tenant context required for all storage operations.
///
/// `TenantContext` encapsulates the tenant identity and permissions of an
/// already-authenticated caller. The identity layer builds it; the tag store
/// and the lifecycle engine only consume it.
///
/// ```
/// use nfc_persistence::tenant::{TenantContext, TenantId, TenantPermissions};
///
/// let context = TenantContext::new(
///     TenantId::new("org-1"),
///     TenantPermissions::full_access(),
/// )
/// .with_user_id("user-1");
///
/// assert_eq!(context.tenant_id().as_str(), "org-1");
/// assert_eq!(context.user_id(), Some("user-1"));
/// ```
#[derive(Debug, Clone)]
pub struct TenantContext {
    /// The tenant identifier.
    tenant_id: TenantId,
    /// The permissions for this context.
    permissions: Arc<TenantPermissions>,
    /// Optional correlation ID for request tracing.
    correlation_id: Option<String>,
    /// Optional user ID for audit purposes.
    user_id: Option<String>,
}

impl TenantContext {
    /// Creates a new tenant context with the given ID and permissions.
    pub fn new(tenant_id: TenantId, permissions: TenantPermissions) -> Self {
        Self {
            tenant_id,
            permissions: Arc::new(permissions),
            correlation_id: None,
            user_id: None,
        }
    }

    /// Creates a context with the specified correlation ID for tracing.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Creates a context with the specified user ID for auditing.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Returns the tenant ID.
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Returns the permissions for this context.
    pub fn permissions(&self) -> &TenantPermissions {
        &self.permissions
    }

    /// Returns the correlation ID, if set.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Returns the user ID, if set.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Checks if the given operation is permitted.
    ///
    /// ```
    /// use nfc_persistence::tenant::{TenantContext, TenantId, TenantPermissions, Operation};
    ///
    /// let ctx = TenantContext::new(
    ///     TenantId::new("org-1"),
    ///     TenantPermissions::read_only(),
    /// );
    ///
    /// assert!(ctx.check_permission(Operation::Read).is_ok());
    /// assert!(ctx.check_permission(Operation::Assign).is_err());
    /// ```
    pub fn check_permission(&self, operation: Operation) -> Result<(), TenantError> {
        if self.permissions.can_perform(operation) {
            Ok(())
        } else {
            Err(TenantError::OperationNotPermitted {
                tenant_id: self.tenant_id.clone(),
                operation: operation.to_string(),
            })
        }
    }

    /// Checks that data owned by `owner` may be touched from this context.
    ///
    /// Tenants never see each other's partitions.
    pub fn check_access(&self, owner: &TenantId) -> Result<(), TenantError> {
        if &self.tenant_id == owner {
            Ok(())
        } else {
            Err(TenantError::AccessDenied {
                tenant_id: self.tenant_id.clone(),
                target_tenant: owner.clone(),
            })
        }
    }
}

/// Builder for creating tenant contexts with validation.
///
/// Useful when constructing contexts from external input such as identity
/// claims or inbound event payloads.
pub struct TenantContextBuilder {
    tenant_id: Option<String>,
    permissions: Option<TenantPermissions>,
    correlation_id: Option<String>,
    user_id: Option<String>,
}

impl TenantContextBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            tenant_id: None,
            permissions: None,
            correlation_id: None,
            user_id: None,
        }
    }

    /// Sets the tenant ID from raw input; validated on [`build`](Self::build).
    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Sets the permissions.
    pub fn permissions(mut self, permissions: TenantPermissions) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Sets the correlation ID.
    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Sets the user ID.
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Builds the tenant context, returning an error if the tenant ID is
    /// missing or invalid.
    pub fn build(self) -> Result<TenantContext, ValidationError> {
        let raw = self
            .tenant_id
            .ok_or_else(|| ValidationError::MissingRequiredField {
                field: "tenant_id".to_string(),
            })?;
        let tenant_id = TenantId::parse(&raw)?;

        let permissions = self
            .permissions
            .unwrap_or_else(TenantPermissions::full_access);

        let mut ctx = TenantContext::new(tenant_id, permissions);
        ctx.correlation_id = self.correlation_id;
        ctx.user_id = self.user_id;

        Ok(ctx)
    }
}

impl Default for TenantContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
