//! Tests for tenant data isolation.
//!
//! Every store call is scoped to one tenant partition; these tests check
//! that no read or write crosses that boundary.

mod common;

use chrono::Utc;

use nfc_persistence::core::{TagStore, TagTransaction};
use nfc_persistence::types::{PatientId, TagQuery, TagStatus};

use common::{create_backend, create_tenant, seed_tag};

// ============================================================================
// Read Isolation Tests
// ============================================================================

#[tokio::test]
async fn test_tag_visible_only_to_owner() {
    let backend = create_backend();
    let tenant_a = create_tenant("tenant-a");
    let tenant_b = create_tenant("tenant-b");

    seed_tag(&backend, &tenant_a, "tag-1", "patient-1").await;

    assert!(backend.get_tag(&tenant_a, "tag-1").await.unwrap().is_some());
    assert!(backend.get_tag(&tenant_b, "tag-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_patient_table_is_partitioned() {
    let backend = create_backend();
    let tenant_a = create_tenant("tenant-a");
    let tenant_b = create_tenant("tenant-b");
    let patient = PatientId::new("patient-1");

    backend.register_patient(&tenant_a, &patient).unwrap();

    assert!(backend.patient_exists(&tenant_a, &patient).await.unwrap());
    assert!(!backend.patient_exists(&tenant_b, &patient).await.unwrap());
}

#[tokio::test]
async fn test_listing_and_stats_are_partitioned() {
    let backend = create_backend();
    let tenant_a = create_tenant("tenant-a");
    let tenant_b = create_tenant("tenant-b");

    seed_tag(&backend, &tenant_a, "tag-1", "patient-1").await;
    seed_tag(&backend, &tenant_a, "tag-2", "patient-2").await;
    seed_tag(&backend, &tenant_b, "tag-9", "patient-9").await;

    let page_a = backend.list_tags(&tenant_a, &TagQuery::new(10)).await.unwrap();
    let page_b = backend.list_tags(&tenant_b, &TagQuery::new(10)).await.unwrap();

    assert_eq!(page_a.items.len(), 2);
    assert_eq!(page_b.items.len(), 1);
    assert!(page_a
        .items
        .iter()
        .all(|t| t.tenant_id().as_str() == "tenant-a"));

    assert_eq!(backend.stats(&tenant_a).await.unwrap().total, 2);
    assert_eq!(backend.stats(&tenant_b).await.unwrap().total, 1);
}

// ============================================================================
// Write Isolation Tests
// ============================================================================

#[tokio::test]
async fn test_same_tag_id_in_two_tenants() {
    let backend = create_backend();
    let tenant_a = create_tenant("tenant-a");
    let tenant_b = create_tenant("tenant-b");

    seed_tag(&backend, &tenant_a, "tag-1", "patient-a").await;
    seed_tag(&backend, &tenant_b, "tag-1", "patient-b").await;

    let a = backend.get_tag(&tenant_a, "tag-1").await.unwrap().unwrap();
    let b = backend.get_tag(&tenant_b, "tag-1").await.unwrap().unwrap();
    assert_eq!(a.patient_id().as_str(), "patient-a");
    assert_eq!(b.patient_id().as_str(), "patient-b");
    assert_ne!(a.id(), b.id());
}

#[tokio::test]
async fn test_status_change_does_not_leak() {
    let backend = create_backend();
    let tenant_a = create_tenant("tenant-a");
    let tenant_b = create_tenant("tenant-b");

    seed_tag(&backend, &tenant_a, "tag-1", "patient-1").await;

    let mut tx = backend.begin(&tenant_b).await.unwrap();
    let changed = tx
        .set_status("tag-1", TagStatus::Inactive, Utc::now())
        .await
        .unwrap();
    Box::new(tx).commit().await.unwrap();

    assert_eq!(changed, 0);
    let tag = backend.get_tag(&tenant_a, "tag-1").await.unwrap().unwrap();
    assert!(tag.is_active());
}

#[tokio::test]
async fn test_cascade_all_stays_in_partition() {
    let backend = create_backend();
    let tenant_a = create_tenant("tenant-a");
    let tenant_b = create_tenant("tenant-b");

    seed_tag(&backend, &tenant_a, "tag-1", "patient-1").await;
    seed_tag(&backend, &tenant_b, "tag-2", "patient-1").await;

    let mut tx = backend.begin(&tenant_a).await.unwrap();
    assert_eq!(tx.deactivate_all(Utc::now()).await.unwrap(), 1);
    Box::new(tx).commit().await.unwrap();

    let b = backend.get_tag(&tenant_b, "tag-2").await.unwrap().unwrap();
    assert!(b.is_active());
}

#[tokio::test]
async fn test_active_index_is_per_tenant() {
    let backend = create_backend();
    let tenant_a = create_tenant("tenant-a");
    let tenant_b = create_tenant("tenant-b");

    // Same patient id in two tenants is two different patients.
    seed_tag(&backend, &tenant_a, "tag-1", "patient-1").await;
    seed_tag(&backend, &tenant_b, "tag-2", "patient-1").await;

    assert_eq!(backend.stats(&tenant_a).await.unwrap().active, 1);
    assert_eq!(backend.stats(&tenant_b).await.unwrap().active, 1);
}
