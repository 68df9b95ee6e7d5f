//! [`TagStore`] implementation for SQLite.

use async_trait::async_trait;

use crate::core::TagStore;
use crate::error::StorageResult;
use crate::tenant::TenantContext;
use crate::types::{PatientId, Tag, TagPage, TagQuery, TagStats};

use super::transaction::SqliteTransaction;
use super::{SqliteBackend, queries};

#[async_trait]
impl TagStore for SqliteBackend {
    type Transaction = SqliteTransaction;

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn begin(&self, tenant: &TenantContext) -> StorageResult<Self::Transaction> {
        let conn = self.get_connection()?;
        SqliteTransaction::new(conn, tenant.clone())
    }

    async fn get_tag(&self, tenant: &TenantContext, tag_id: &str) -> StorageResult<Option<Tag>> {
        let conn = self.get_connection()?;
        let tag = queries::get_tag(&conn, tenant.tenant_id(), tag_id)?;
        if let Some(ref tag) = tag {
            tenant.check_access(tag.tenant_id())?;
        }
        Ok(tag)
    }

    async fn active_tag_for_patient(
        &self,
        tenant: &TenantContext,
        patient_id: &PatientId,
    ) -> StorageResult<Option<Tag>> {
        let conn = self.get_connection()?;
        queries::active_tag_for_patient(&conn, tenant.tenant_id(), patient_id)
    }

    async fn patient_exists(
        &self,
        tenant: &TenantContext,
        patient_id: &PatientId,
    ) -> StorageResult<bool> {
        let conn = self.get_connection()?;
        queries::patient_exists(&conn, tenant.tenant_id(), patient_id)
    }

    async fn list_tags(
        &self,
        tenant: &TenantContext,
        query: &TagQuery,
    ) -> StorageResult<TagPage> {
        let conn = self.get_connection()?;
        let rows = queries::list_tags(&conn, tenant.tenant_id(), query)?;
        Ok(TagPage::from_overfetch(rows, query.limit()))
    }

    async fn stats(&self, tenant: &TenantContext) -> StorageResult<TagStats> {
        let conn = self.get_connection()?;
        queries::stats(&conn, tenant.tenant_id())
    }
}
