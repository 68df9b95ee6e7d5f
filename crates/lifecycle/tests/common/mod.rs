//! Test infrastructure for the lifecycle engine.
//!
//! Builds an engine over an initialised in-memory backend with a recording
//! publisher, plus tenant contexts with various permission sets.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use nfc_lifecycle::events::{EventPublisher, PublishError, RecordingPublisher};
use nfc_lifecycle::{EngineConfig, LifecycleEngine, NoopPublisher};
use nfc_persistence::backends::sqlite::SqliteBackend;
use nfc_persistence::tenant::{TenantContext, TenantId, TenantPermissions};
use nfc_persistence::types::PatientId;

pub struct Harness {
    pub backend: Arc<SqliteBackend>,
    pub publisher: Arc<RecordingPublisher>,
    pub engine: LifecycleEngine<SqliteBackend>,
}

pub fn create_backend() -> Arc<SqliteBackend> {
    let backend = SqliteBackend::in_memory().expect("Failed to create SQLite backend");
    backend.init_schema().expect("Failed to initialize schema");
    Arc::new(backend)
}

pub fn harness() -> Harness {
    harness_with_config(EngineConfig::default())
}

pub fn harness_with_config(config: EngineConfig) -> Harness {
    let backend = create_backend();
    let publisher = Arc::new(RecordingPublisher::new());
    let engine = LifecycleEngine::with_config(Arc::clone(&backend), publisher.clone(), config);
    Harness {
        backend,
        publisher,
        engine,
    }
}

/// An engine whose publisher discards events, sharing `backend`.
pub fn quiet_engine(backend: &Arc<SqliteBackend>) -> LifecycleEngine<SqliteBackend> {
    LifecycleEngine::new(Arc::clone(backend), Arc::new(NoopPublisher))
}

pub fn admin(tenant: &str) -> TenantContext {
    TenantContext::new(TenantId::new(tenant), TenantPermissions::full_access())
        .with_user_id("admin-1")
}

pub fn caregiver(tenant: &str) -> TenantContext {
    TenantContext::new(TenantId::new(tenant), TenantPermissions::check_in_only())
        .with_user_id("nurse-7")
}

pub fn auditor(tenant: &str) -> TenantContext {
    TenantContext::new(TenantId::new(tenant), TenantPermissions::read_only())
}

pub fn register(backend: &SqliteBackend, ctx: &TenantContext, patients: &[&str]) {
    for patient in patients {
        backend
            .register_patient(ctx, &PatientId::new(*patient))
            .expect("Failed to register patient");
    }
}

/// Registers the patient and assigns the tag.
pub async fn assign(h: &Harness, ctx: &TenantContext, tag_id: &str, patient_id: &str) {
    register(&h.backend, ctx, &[patient_id]);
    h.engine
        .assign(ctx, tag_id, &PatientId::new(patient_id), "admin-1")
        .await
        .expect("Failed to assign tag");
}

/// Publisher that rejects every event.
#[derive(Debug, Default)]
pub struct FailingPublisher;

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn publish(&self, _topic: &str, _payload: Value) -> Result<(), PublishError> {
        Err(PublishError::Transport("broker unreachable".to_string()))
    }
}
