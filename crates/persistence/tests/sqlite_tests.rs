//! SQLite backend integration tests.
//!
//! These tests exercise the tag store and its transactions against an
//! in-memory database.

mod common;

use chrono::{Duration, Utc};

use nfc_persistence::backends::sqlite::{SCHEMA_VERSION, SqliteBackend};
use nfc_persistence::core::{TagStore, TagTransaction};
use nfc_persistence::error::{ConstraintError, StorageError};
use nfc_persistence::types::{PatientId, TagQuery, TagStats, TagStatus};

use common::{create_backend, create_tenant, seed_inactive_tag, seed_tag};

// ============================================================================
// Lookup Tests
// ============================================================================

#[tokio::test]
async fn test_get_missing_tag() {
    let backend = create_backend();
    let tenant = create_tenant("org-1");

    assert!(backend.get_tag(&tenant, "nope").await.unwrap().is_none());
}

#[tokio::test]
async fn test_upsert_creates_active_tag() {
    let backend = create_backend();
    let tenant = create_tenant("org-1");

    let created = seed_tag(&backend, &tenant, "tag-1", "patient-a").await;
    let read = backend.get_tag(&tenant, "tag-1").await.unwrap().unwrap();

    assert_eq!(read, created);
    assert_eq!(read.status(), TagStatus::Active);
    assert!(read.issued_at().is_some());
    assert!(read.deactivated_at().is_none());
    assert_eq!(read.tenant_id().as_str(), "org-1");
}

#[tokio::test]
async fn test_active_tag_for_patient() {
    let backend = create_backend();
    let tenant = create_tenant("org-1");
    seed_inactive_tag(&backend, &tenant, "tag-1", "patient-a").await;
    seed_tag(&backend, &tenant, "tag-2", "patient-a").await;

    let active = backend
        .active_tag_for_patient(&tenant, &PatientId::new("patient-a"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.tag_id(), "tag-2");

    let none = backend
        .active_tag_for_patient(&tenant, &PatientId::new("patient-b"))
        .await
        .unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn test_patient_exists() {
    let backend = create_backend();
    let tenant = create_tenant("org-1");
    let patient = PatientId::new("patient-a");

    assert!(!backend.patient_exists(&tenant, &patient).await.unwrap());
    backend.register_patient(&tenant, &patient).unwrap();
    backend.register_patient(&tenant, &patient).unwrap();
    assert!(backend.patient_exists(&tenant, &patient).await.unwrap());
}

// ============================================================================
// Upsert and Status Tests
// ============================================================================

#[tokio::test]
async fn test_upsert_rebinds_and_restamps() {
    let backend = create_backend();
    let tenant = create_tenant("org-1");
    seed_inactive_tag(&backend, &tenant, "tag-1", "patient-a").await;
    let before = backend.get_tag(&tenant, "tag-1").await.unwrap().unwrap();

    let later = Utc::now() + Duration::seconds(5);
    let mut tx = backend.begin(&tenant).await.unwrap();
    let rebound = tx
        .upsert_active("tag-1", &PatientId::new("patient-b"), later)
        .await
        .unwrap();
    Box::new(tx).commit().await.unwrap();

    assert_eq!(rebound.id(), before.id());
    assert_eq!(rebound.patient_id().as_str(), "patient-b");
    assert!(rebound.is_active());
    assert!(rebound.deactivated_at().is_none());
    assert_eq!(
        rebound.issued_at().map(|t| t.timestamp()),
        Some(later.timestamp())
    );
}

#[tokio::test]
async fn test_second_active_tag_is_rejected() {
    let backend = create_backend();
    let tenant = create_tenant("org-1");
    seed_tag(&backend, &tenant, "tag-1", "patient-a").await;

    let mut tx = backend.begin(&tenant).await.unwrap();
    let err = tx
        .upsert_active("tag-2", &PatientId::new("patient-a"), Utc::now())
        .await
        .unwrap_err();

    match err {
        StorageError::Constraint(ConstraintError::ActiveTagExists { patient_id }) => {
            assert_eq!(patient_id.as_str(), "patient-a");
        }
        other => panic!("expected ActiveTagExists, got {:?}", other),
    }
}

#[tokio::test]
async fn test_reactivation_respects_active_index() {
    let backend = create_backend();
    let tenant = create_tenant("org-1");
    seed_inactive_tag(&backend, &tenant, "tag-1", "patient-a").await;
    seed_tag(&backend, &tenant, "tag-2", "patient-a").await;

    let mut tx = backend.begin(&tenant).await.unwrap();
    let err = tx
        .set_status("tag-1", TagStatus::Active, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Constraint(ConstraintError::ActiveTagExists { .. })
    ));
}

#[tokio::test]
async fn test_deactivate_and_reactivate_timestamps() {
    let backend = create_backend();
    let tenant = create_tenant("org-1");
    let seeded = seed_tag(&backend, &tenant, "tag-1", "patient-a").await;

    let mut tx = backend.begin(&tenant).await.unwrap();
    assert_eq!(
        tx.set_status("tag-1", TagStatus::Inactive, Utc::now())
            .await
            .unwrap(),
        1
    );
    Box::new(tx).commit().await.unwrap();

    let inactive = backend.get_tag(&tenant, "tag-1").await.unwrap().unwrap();
    assert_eq!(inactive.status(), TagStatus::Inactive);
    assert!(inactive.deactivated_at().is_some());

    let mut tx = backend.begin(&tenant).await.unwrap();
    assert_eq!(
        tx.set_status("tag-1", TagStatus::Active, Utc::now())
            .await
            .unwrap(),
        1
    );
    Box::new(tx).commit().await.unwrap();

    let active = backend.get_tag(&tenant, "tag-1").await.unwrap().unwrap();
    assert!(active.is_active());
    assert!(active.deactivated_at().is_none());
    assert_eq!(active.issued_at(), seeded.issued_at());
}

#[tokio::test]
async fn test_bulk_deactivation() {
    let backend = create_backend();
    let tenant = create_tenant("org-1");
    seed_tag(&backend, &tenant, "tag-1", "patient-a").await;
    seed_inactive_tag(&backend, &tenant, "tag-2", "patient-a").await;
    seed_tag(&backend, &tenant, "tag-3", "patient-b").await;
    seed_tag(&backend, &tenant, "tag-4", "patient-c").await;

    let mut tx = backend.begin(&tenant).await.unwrap();
    let for_patient = tx
        .deactivate_for_patient(&PatientId::new("patient-a"), Utc::now())
        .await
        .unwrap();
    let rest = tx.deactivate_all(Utc::now()).await.unwrap();
    let again = tx.deactivate_all(Utc::now()).await.unwrap();
    Box::new(tx).commit().await.unwrap();

    assert_eq!((for_patient, rest, again), (1, 2, 0));
    let stats = backend.stats(&tenant).await.unwrap();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.inactive, 4);
}

#[tokio::test]
async fn test_committed_transaction_is_spent() {
    let backend = create_backend();
    let tenant = create_tenant("org-1");

    let tx = backend.begin(&tenant).await.unwrap();
    assert!(tx.is_active());
    assert_eq!(tx.tenant().tenant_id().as_str(), "org-1");
    Box::new(tx).commit().await.unwrap();

    // The single in-memory connection is free again.
    assert!(backend.get_tag(&tenant, "tag-1").await.unwrap().is_none());
}

// ============================================================================
// Listing Tests
// ============================================================================

#[tokio::test]
async fn test_list_first_page() {
    let backend = create_backend();
    let tenant = create_tenant("org-1");
    seed_tag(&backend, &tenant, "tag-1", "patient-a").await;
    seed_inactive_tag(&backend, &tenant, "tag-2", "patient-b").await;
    seed_tag(&backend, &tenant, "tag-3", "patient-c").await;

    let page = backend
        .list_tags(&tenant, &TagQuery::new(2))
        .await
        .unwrap();

    let ids: Vec<&str> = page.items.iter().map(|t| t.tag_id()).collect();
    assert_eq!(ids, vec!["tag-1", "tag-2"]);
    assert_eq!(page.next_cursor.as_deref(), Some("tag-2"));

    let next = backend
        .list_tags(&tenant, &TagQuery::new(2).with_cursor("tag-2"))
        .await
        .unwrap();
    let ids: Vec<&str> = next.items.iter().map(|t| t.tag_id()).collect();
    assert_eq!(ids, vec!["tag-3"]);
    assert!(next.next_cursor.is_none());
}

#[tokio::test]
async fn test_list_status_filter() {
    let backend = create_backend();
    let tenant = create_tenant("org-1");
    seed_tag(&backend, &tenant, "tag-1", "patient-a").await;
    seed_inactive_tag(&backend, &tenant, "tag-2", "patient-b").await;
    seed_tag(&backend, &tenant, "tag-3", "patient-c").await;

    let page = backend
        .list_tags(&tenant, &TagQuery::new(10).with_status(TagStatus::Inactive))
        .await
        .unwrap();

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].tag_id(), "tag-2");
}

#[tokio::test]
async fn test_list_search_is_case_insensitive() {
    let backend = create_backend();
    let tenant = create_tenant("org-1");
    seed_tag(&backend, &tenant, "WARD3-001", "patient-a").await;
    seed_tag(&backend, &tenant, "ward4-001", "patient-b").await;
    seed_tag(&backend, &tenant, "lobby-1", "ward3-visitor").await;

    let page = backend
        .list_tags(&tenant, &TagQuery::new(10).with_search("  Ward3 "))
        .await
        .unwrap();

    let ids: Vec<&str> = page.items.iter().map(|t| t.tag_id()).collect();
    assert_eq!(ids, vec!["WARD3-001", "lobby-1"]);
}

#[tokio::test]
async fn test_list_search_folds_non_ascii_case() {
    let backend = create_backend();
    let tenant = create_tenant("org-1");
    seed_tag(&backend, &tenant, "ÉTIQUETTE-1", "patient-a").await;
    seed_tag(&backend, &tenant, "tag-2", "PATIENT-ÖRN").await;
    seed_tag(&backend, &tenant, "tag-3", "patient-c").await;

    for term in ["étiquette", "ÉTIQUETTE", "Étiquette-1"] {
        let page = backend
            .list_tags(&tenant, &TagQuery::new(10).with_search(term))
            .await
            .unwrap();
        let ids: Vec<&str> = page.items.iter().map(|t| t.tag_id()).collect();
        assert_eq!(ids, vec!["ÉTIQUETTE-1"], "search term {term:?}");
    }

    for term in ["örn", "ÖRN"] {
        let page = backend
            .list_tags(&tenant, &TagQuery::new(10).with_search(term))
            .await
            .unwrap();
        let ids: Vec<&str> = page.items.iter().map(|t| t.tag_id()).collect();
        assert_eq!(ids, vec!["tag-2"], "search term {term:?}");
    }
}

#[tokio::test]
async fn test_list_search_treats_wildcards_literally() {
    let backend = create_backend();
    let tenant = create_tenant("org-1");
    seed_tag(&backend, &tenant, "tag_1", "patient-a").await;
    seed_tag(&backend, &tenant, "tagx1", "patient-b").await;

    let page = backend
        .list_tags(&tenant, &TagQuery::new(10).with_search("g_1"))
        .await
        .unwrap();

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].tag_id(), "tag_1");
}

// ============================================================================
// Stats Tests
// ============================================================================

#[tokio::test]
async fn test_stats_empty_partition() {
    let backend = create_backend();
    let tenant = create_tenant("org-1");

    let stats = backend.stats(&tenant).await.unwrap();
    assert_eq!(stats, TagStats::default());
}

#[tokio::test]
async fn test_stats_counts() {
    let backend = create_backend();
    let tenant = create_tenant("org-1");
    seed_tag(&backend, &tenant, "tag-1", "patient-a").await;
    seed_inactive_tag(&backend, &tenant, "tag-2", "patient-b").await;
    seed_tag(&backend, &tenant, "tag-3", "patient-c").await;

    let stats = backend.stats(&tenant).await.unwrap();
    assert_eq!(
        stats,
        TagStats {
            total: 3,
            active: 2,
            inactive: 1
        }
    );
}

// ============================================================================
// File Database Tests
// ============================================================================

#[tokio::test]
async fn test_file_database_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nfc.db");
    let tenant = create_tenant("org-1");

    {
        let backend = SqliteBackend::open(&path).unwrap();
        backend.init_schema().unwrap();
        seed_tag(&backend, &tenant, "tag-1", "patient-a").await;
    }

    let reopened = SqliteBackend::open(&path).unwrap();
    reopened.init_schema().unwrap();
    assert_eq!(reopened.schema_version().unwrap(), SCHEMA_VERSION);
    let tag = reopened.get_tag(&tenant, "tag-1").await.unwrap().unwrap();
    assert_eq!(tag.patient_id().as_str(), "patient-a");
}
