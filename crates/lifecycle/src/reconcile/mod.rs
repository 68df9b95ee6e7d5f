//! Cross-tenant reconciliation.
//!
//! Other services announce patient and organization lifecycle changes; this
//! module turns them into tag deactivation cascades. Every cascade is
//! idempotent, so duplicate and out-of-order deliveries are harmless.
//!
//! - [`decode`] - payload to [`ReconcileAction`]
//! - [`ReconciliationListener`] - the retrying consume loop
//! - [`TenantResolver`] - organization id to [`TenantContext`](nfc_persistence::tenant::TenantContext)

mod event;
mod listener;

pub use event::{
    IgnoreReason, ORGANIZATION_DELETED, ORGANIZATION_STATUS_CHANGED, PATIENT_CREATED,
    PATIENT_DELETED, PATIENT_STATUS_CHANGED, ROUTING_KEYS, ReconcileAction, decode,
};
pub use listener::{
    DeadLetter, Delivery, Handled, ListenerConfig, ListenerStats, OrganizationTenantResolver,
    Outcome, ReconciliationListener, TenantResolver,
};
