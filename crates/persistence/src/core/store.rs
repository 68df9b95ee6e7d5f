//! Tag store traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageResult;
use crate::tenant::TenantContext;
use crate::types::{PatientId, Tag, TagPage, TagQuery, TagStats, TagStatus};

/// Tenant-scoped access to stored tags.
///
/// Every method takes the caller's [`TenantContext`] and only ever sees rows
/// in that tenant's partition. Reads on this trait run outside any
/// transaction; mutations go through [`TagStore::begin`].
#[async_trait]
pub trait TagStore: Send + Sync {
    /// The transaction type handed out by [`TagStore::begin`].
    type Transaction: TagTransaction + 'static;

    /// Returns a short name for the backend, used in logs.
    fn backend_name(&self) -> &'static str;

    /// Opens a write transaction on the tenant's partition.
    ///
    /// The transaction holds the write lock from the start, so reads made
    /// through it see the state its writes will be applied to.
    async fn begin(&self, tenant: &TenantContext) -> StorageResult<Self::Transaction>;

    /// Looks up a tag by its external identifier.
    async fn get_tag(&self, tenant: &TenantContext, tag_id: &str) -> StorageResult<Option<Tag>>;

    /// Returns the patient's active tag, if any.
    async fn active_tag_for_patient(
        &self,
        tenant: &TenantContext,
        patient_id: &PatientId,
    ) -> StorageResult<Option<Tag>>;

    /// Checks the sibling patient table.
    async fn patient_exists(
        &self,
        tenant: &TenantContext,
        patient_id: &PatientId,
    ) -> StorageResult<bool>;

    /// Returns one keyset page ordered ascending by `tag_id`.
    async fn list_tags(&self, tenant: &TenantContext, query: &TagQuery)
        -> StorageResult<TagPage>;

    /// Returns total, active, and inactive counts.
    async fn stats(&self, tenant: &TenantContext) -> StorageResult<TagStats>;
}

/// An open write transaction on one tenant partition.
///
/// Nothing is visible to other callers until [`commit`](Self::commit).
/// Dropping an uncommitted transaction rolls it back.
#[async_trait]
pub trait TagTransaction: Send + Sync {
    /// Looks up a tag inside the transaction.
    async fn get_tag(&self, tag_id: &str) -> StorageResult<Option<Tag>>;

    /// Checks the sibling patient table inside the transaction.
    async fn patient_exists(&self, patient_id: &PatientId) -> StorageResult<bool>;

    /// Returns the patient's active tag inside the transaction.
    async fn active_tag_for_patient(&self, patient_id: &PatientId) -> StorageResult<Option<Tag>>;

    /// Inserts or rebinds `tag_id` as the patient's active tag.
    ///
    /// Sets `issued_at` and clears `deactivated_at`. Fails with
    /// [`ConstraintError::ActiveTagExists`](crate::error::ConstraintError::ActiveTagExists)
    /// if a different tag is already active for the patient.
    async fn upsert_active(
        &mut self,
        tag_id: &str,
        patient_id: &PatientId,
        issued_at: DateTime<Utc>,
    ) -> StorageResult<Tag>;

    /// Moves one tag into `status`, returning the number of rows changed.
    ///
    /// A tag already in `status` is left untouched and reports zero.
    /// Deactivation stamps `deactivated_at = at`; activation clears it.
    async fn set_status(
        &mut self,
        tag_id: &str,
        status: TagStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<u64>;

    /// Deactivates every active tag of the patient.
    async fn deactivate_for_patient(
        &mut self,
        patient_id: &PatientId,
        at: DateTime<Utc>,
    ) -> StorageResult<u64>;

    /// Deactivates every active tag in the partition.
    async fn deactivate_all(&mut self, at: DateTime<Utc>) -> StorageResult<u64>;

    /// Commits the transaction.
    async fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Rolls the transaction back.
    async fn rollback(self: Box<Self>) -> StorageResult<()>;

    /// Returns the tenant this transaction is scoped to.
    fn tenant(&self) -> &TenantContext;

    /// Returns `true` until the transaction is committed or rolled back.
    fn is_active(&self) -> bool;
}
