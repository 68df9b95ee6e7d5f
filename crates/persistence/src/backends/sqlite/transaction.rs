//! Transaction support for SQLite backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;

use crate::core::TagTransaction;
use crate::error::{StorageError, StorageResult, TransactionError};
use crate::tenant::TenantContext;
use crate::types::{PatientId, Tag, TagStatus};

use super::queries;

/// A SQLite write transaction on one tenant partition.
///
/// Opened with `BEGIN IMMEDIATE`, so the write lock is taken before the
/// first read and check-then-write sequences cannot interleave with another
/// writer.
pub struct SqliteTransaction {
    /// The connection used for this transaction.
    conn: Mutex<PooledConnection<SqliteConnectionManager>>,
    /// Whether the transaction is still active.
    active: bool,
    /// The tenant context for this transaction.
    tenant: TenantContext,
}

impl std::fmt::Debug for SqliteTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTransaction")
            .field("active", &self.active)
            .field("tenant", &self.tenant)
            .finish()
    }
}

impl SqliteTransaction {
    /// Create a new transaction.
    pub(crate) fn new(
        conn: PooledConnection<SqliteConnectionManager>,
        tenant: TenantContext,
    ) -> StorageResult<Self> {
        conn.execute("BEGIN IMMEDIATE", []).map_err(|e| {
            StorageError::Transaction(TransactionError::BeginFailed {
                reason: e.to_string(),
            })
        })?;

        Ok(Self {
            conn: Mutex::new(conn),
            active: true,
            tenant,
        })
    }

    fn ensure_active(&self) -> StorageResult<()> {
        if self.active {
            Ok(())
        } else {
            Err(StorageError::Transaction(
                TransactionError::InvalidTransaction,
            ))
        }
    }
}

#[async_trait]
impl TagTransaction for SqliteTransaction {
    async fn get_tag(&self, tag_id: &str) -> StorageResult<Option<Tag>> {
        self.ensure_active()?;
        let conn = self.conn.lock();
        let tag = queries::get_tag(&conn, self.tenant.tenant_id(), tag_id)?;
        if let Some(ref tag) = tag {
            self.tenant.check_access(tag.tenant_id())?;
        }
        Ok(tag)
    }

    async fn patient_exists(&self, patient_id: &PatientId) -> StorageResult<bool> {
        self.ensure_active()?;
        let conn = self.conn.lock();
        queries::patient_exists(&conn, self.tenant.tenant_id(), patient_id)
    }

    async fn active_tag_for_patient(&self, patient_id: &PatientId) -> StorageResult<Option<Tag>> {
        self.ensure_active()?;
        let conn = self.conn.lock();
        queries::active_tag_for_patient(&conn, self.tenant.tenant_id(), patient_id)
    }

    async fn upsert_active(
        &mut self,
        tag_id: &str,
        patient_id: &PatientId,
        issued_at: DateTime<Utc>,
    ) -> StorageResult<Tag> {
        self.ensure_active()?;
        let conn = self.conn.lock();
        queries::upsert_active(&conn, self.tenant.tenant_id(), tag_id, patient_id, issued_at)
    }

    async fn set_status(
        &mut self,
        tag_id: &str,
        status: TagStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<u64> {
        self.ensure_active()?;
        let conn = self.conn.lock();
        queries::set_status(&conn, self.tenant.tenant_id(), tag_id, status, at)
    }

    async fn deactivate_for_patient(
        &mut self,
        patient_id: &PatientId,
        at: DateTime<Utc>,
    ) -> StorageResult<u64> {
        self.ensure_active()?;
        let conn = self.conn.lock();
        queries::deactivate_for_patient(&conn, self.tenant.tenant_id(), patient_id, at)
    }

    async fn deactivate_all(&mut self, at: DateTime<Utc>) -> StorageResult<u64> {
        self.ensure_active()?;
        let conn = self.conn.lock();
        queries::deactivate_all(&conn, self.tenant.tenant_id(), at)
    }

    async fn commit(mut self: Box<Self>) -> StorageResult<()> {
        self.ensure_active()?;

        let conn = self.conn.lock();
        conn.execute("COMMIT", []).map_err(|e| {
            StorageError::Transaction(TransactionError::RolledBack {
                reason: format!("Commit failed: {}", e),
            })
        })?;
        drop(conn);

        self.active = false;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> StorageResult<()> {
        self.ensure_active()?;

        let conn = self.conn.lock();
        conn.execute("ROLLBACK", []).map_err(|e| {
            StorageError::Transaction(TransactionError::RolledBack {
                reason: format!("Rollback failed: {}", e),
            })
        })?;
        drop(conn);

        self.active = false;
        Ok(())
    }

    fn tenant(&self) -> &TenantContext {
        &self.tenant
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        // If transaction wasn't explicitly committed or rolled back, roll it back
        if self.active {
            let conn = self.conn.lock();
            let _ = conn.execute("ROLLBACK", []);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::sqlite::SqliteBackend;
    use crate::core::TagStore;
    use crate::tenant::{TenantId, TenantPermissions};

    fn create_test_backend() -> SqliteBackend {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.init_schema().unwrap();
        backend
    }

    fn create_test_tenant() -> TenantContext {
        TenantContext::new(
            TenantId::new("test-tenant"),
            TenantPermissions::full_access(),
        )
    }

    #[tokio::test]
    async fn test_transaction_commit() {
        let backend = create_test_backend();
        let tenant = create_test_tenant();

        let mut tx = backend.begin(&tenant).await.unwrap();
        tx.upsert_active("tag-1", &PatientId::new("p1"), Utc::now())
            .await
            .unwrap();
        Box::new(tx).commit().await.unwrap();

        let tag = backend.get_tag(&tenant, "tag-1").await.unwrap().unwrap();
        assert_eq!(tag.patient_id().as_str(), "p1");
    }

    #[tokio::test]
    async fn test_transaction_rollback() {
        let backend = create_test_backend();
        let tenant = create_test_tenant();

        let mut tx = backend.begin(&tenant).await.unwrap();
        tx.upsert_active("tag-1", &PatientId::new("p1"), Utc::now())
            .await
            .unwrap();
        Box::new(tx).rollback().await.unwrap();

        assert!(backend.get_tag(&tenant, "tag-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transaction_read_own_writes() {
        let backend = create_test_backend();
        let tenant = create_test_tenant();

        let mut tx = backend.begin(&tenant).await.unwrap();
        tx.upsert_active("tag-1", &PatientId::new("p1"), Utc::now())
            .await
            .unwrap();

        let tag = tx.get_tag("tag-1").await.unwrap().unwrap();
        assert!(tag.is_active());
        let active = tx
            .active_tag_for_patient(&PatientId::new("p1"))
            .await
            .unwrap();
        assert_eq!(active.unwrap().tag_id(), "tag-1");
    }

    #[tokio::test]
    async fn test_transaction_auto_rollback_on_drop() {
        let backend = create_test_backend();
        let tenant = create_test_tenant();

        {
            let mut tx = backend.begin(&tenant).await.unwrap();
            tx.upsert_active("tag-1", &PatientId::new("p1"), Utc::now())
                .await
                .unwrap();
        }

        assert!(backend.get_tag(&tenant, "tag-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_status_reports_rowcount() {
        let backend = create_test_backend();
        let tenant = create_test_tenant();

        let mut tx = backend.begin(&tenant).await.unwrap();
        tx.upsert_active("tag-1", &PatientId::new("p1"), Utc::now())
            .await
            .unwrap();

        let first = tx
            .set_status("tag-1", TagStatus::Inactive, Utc::now())
            .await
            .unwrap();
        let second = tx
            .set_status("tag-1", TagStatus::Inactive, Utc::now())
            .await
            .unwrap();
        let missing = tx
            .set_status("tag-9", TagStatus::Inactive, Utc::now())
            .await
            .unwrap();

        assert_eq!((first, second, missing), (1, 0, 0));
        assert!(tx.is_active());
    }
}
