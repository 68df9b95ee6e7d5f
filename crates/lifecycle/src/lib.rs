//! NFC tag lifecycle.
//!
//! This crate resolves NFC tags to patients and manages the tag lifecycle
//! (assign, resolve, deactivate, reactivate, replace) for a multi-tenant care
//! platform. It is built on the tag store contract from `nfc-persistence`.
//!
//! # Architecture
//!
//! - [`engine`] - The lifecycle state machine
//! - [`events`] - Post-commit notifications (`nfc.resolved`, `nfc.assigned`)
//! - [`reconcile`] - Cascading deactivations driven by other services' events
//! - [`keys`] - Signing-key cache for the identity provider
//! - [`config`] - Environment-driven configuration
//! - [`error`] - Caller-facing error taxonomy
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use nfc_lifecycle::{EventBus, LifecycleEngine};
//! use nfc_persistence::backends::sqlite::SqliteBackend;
//! use nfc_persistence::tenant::{TenantContext, TenantId, TenantPermissions};
//! use nfc_persistence::types::PatientId;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(SqliteBackend::open("nfc.db")?);
//! backend.init_schema()?;
//!
//! let ctx = TenantContext::new(TenantId::new("st-mary"), TenantPermissions::full_access())
//!     .with_user_id("admin-1");
//! let patient = PatientId::new("patient-1");
//! backend.register_patient(&ctx, &patient)?;
//!
//! let engine = LifecycleEngine::new(backend, Arc::new(EventBus::new(1024)));
//! engine.assign(&ctx, "tag-1", &patient, "admin-1").await?;
//! let resolution = engine.resolve(&ctx, "tag-1").await?;
//! assert_eq!(resolution.patient_id.as_str(), "patient-1");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod keys;
pub mod reconcile;

pub use config::ServiceConfig;
pub use engine::{
    EngineConfig, LifecycleEngine, ListTagsRequest, Replacement, Resolution, TagListing, TagView,
};
pub use error::{ConflictReason, ErrorKind, LifecycleError, LifecycleResult};
pub use events::{
    EventBus, EventPublisher, NoopPublisher, PublishError, PublishedEvent, RecordingPublisher,
    TOPIC_ASSIGNED, TOPIC_RESOLVED, TagEvent,
};
pub use keys::{JwkSet, JwksConfig, KeySetFetcher, SigningKeyCache};
pub use reconcile::{Delivery, ListenerConfig, OrganizationTenantResolver, ReconciliationListener};

/// Initialize the tracing subscriber for logging.
///
/// This should be called once at application startup.
///
/// # Arguments
///
/// * `level` - The log level (error, warn, info, debug, trace)
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "nfc_lifecycle={level},nfc_persistence={level},nfc_reconciler={level}"
        ))
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}
