//! Test infrastructure for the persistence layer.
//!
//! Shared fixtures for building an initialised in-memory backend, tenant
//! contexts, and pre-assigned tags.

#![allow(dead_code)]

use chrono::Utc;

use nfc_persistence::backends::sqlite::SqliteBackend;
use nfc_persistence::core::{TagStore, TagTransaction};
use nfc_persistence::tenant::{TenantContext, TenantId, TenantPermissions};
use nfc_persistence::types::{PatientId, Tag, TagStatus};

pub fn create_backend() -> SqliteBackend {
    let backend = SqliteBackend::in_memory().expect("Failed to create SQLite backend");
    backend.init_schema().expect("Failed to initialize schema");
    backend
}

pub fn create_tenant(id: &str) -> TenantContext {
    TenantContext::new(TenantId::new(id), TenantPermissions::full_access())
}

/// Assigns `tag_id` to `patient_id` and commits, registering the patient first.
pub async fn seed_tag(
    backend: &SqliteBackend,
    tenant: &TenantContext,
    tag_id: &str,
    patient_id: &str,
) -> Tag {
    let patient = PatientId::new(patient_id);
    backend
        .register_patient(tenant, &patient)
        .expect("Failed to register patient");

    let mut tx = backend.begin(tenant).await.expect("Failed to begin");
    let tag = tx
        .upsert_active(tag_id, &patient, Utc::now())
        .await
        .expect("Failed to upsert tag");
    Box::new(tx).commit().await.expect("Failed to commit");
    tag
}

/// Seeds a tag and then deactivates it.
pub async fn seed_inactive_tag(
    backend: &SqliteBackend,
    tenant: &TenantContext,
    tag_id: &str,
    patient_id: &str,
) {
    seed_tag(backend, tenant, tag_id, patient_id).await;
    let mut tx = backend.begin(tenant).await.expect("Failed to begin");
    tx.set_status(tag_id, TagStatus::Inactive, Utc::now())
        .await
        .expect("Failed to deactivate");
    Box::new(tx).commit().await.expect("Failed to commit");
}
