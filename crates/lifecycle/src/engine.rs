//! The tag lifecycle state machine.
//!
//! [`LifecycleEngine`] enforces one-active-tag-per-patient, idempotent
//! status transitions, and replacement semantics on top of a [`TagStore`].
//! Each mutating operation runs in one store transaction and commits
//! explicitly; events are published only after the commit succeeds.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use nfc_persistence::core::{TagStore, TagTransaction};
use nfc_persistence::tenant::{Operation, TenantContext};
use nfc_persistence::types::{PatientId, Tag, TagQuery, TagStats, TagStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ConflictReason, LifecycleError, LifecycleResult};
use crate::events::{EventPublisher, TagEvent};

/// Paging limits for [`LifecycleEngine::list_tags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Page size when the caller gives none.
    pub default_page_size: usize,
    /// Requests above this are clamped to it.
    pub max_page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// Result of a successful resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// The bound patient.
    pub patient_id: PatientId,
    /// The caller's tenant.
    pub organization_id: String,
}

/// Caller-facing view of a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagView {
    /// External tag identifier.
    pub tag_id: String,
    /// The bound patient.
    pub patient_id: PatientId,
    /// The tag's tenant.
    pub organization_id: String,
    /// Current status.
    pub status: TagStatus,
    /// When the tag was last assigned.
    pub issued_at: Option<DateTime<Utc>>,
    /// When the tag became inactive.
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl From<&Tag> for TagView {
    fn from(tag: &Tag) -> Self {
        Self {
            tag_id: tag.tag_id().to_string(),
            patient_id: tag.patient_id().clone(),
            organization_id: tag.tenant_id().to_string(),
            status: tag.status(),
            issued_at: tag.issued_at(),
            deactivated_at: tag.deactivated_at(),
        }
    }
}

impl From<Tag> for TagView {
    fn from(tag: Tag) -> Self {
        TagView::from(&tag)
    }
}

/// Result of a tag replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replacement {
    /// The retired tag, now inactive.
    pub old_tag: TagView,
    /// The new active tag.
    pub new_tag: TagView,
}

/// Raw listing parameters as they arrive from a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListTagsRequest {
    /// Page size; the engine default when absent.
    pub limit: Option<usize>,
    /// Last `tag_id` of the previous page.
    pub cursor: Option<String>,
    /// `active` or `inactive`.
    pub status: Option<String>,
    /// Substring to match against `tag_id` or `patient_id`.
    pub search: Option<String>,
}

impl ListTagsRequest {
    /// Creates a request with every parameter absent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page size.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the cursor.
    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Sets the status filter.
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Sets the search term.
    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }
}

/// One page of tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagListing {
    /// Tags ascending by `tag_id`.
    pub items: Vec<TagView>,
    /// Pass as `cursor` to fetch the next page.
    pub next_cursor: Option<String>,
}

/// The lifecycle engine.
///
/// Generic over the store so tests and alternative backends plug in without
/// dynamic dispatch; the publisher is a trait object because it is chosen at
/// runtime.
pub struct LifecycleEngine<S: TagStore> {
    store: Arc<S>,
    publisher: Arc<dyn EventPublisher>,
    config: EngineConfig,
}

impl<S: TagStore> Clone for LifecycleEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            publisher: Arc::clone(&self.publisher),
            config: self.config,
        }
    }
}

impl<S: TagStore> std::fmt::Debug for LifecycleEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleEngine")
            .field("backend", &self.store.backend_name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: TagStore> LifecycleEngine<S> {
    /// Creates an engine with default paging limits.
    pub fn new(store: Arc<S>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self::with_config(store, publisher, EngineConfig::default())
    }

    /// Creates an engine with explicit paging limits.
    pub fn with_config(
        store: Arc<S>,
        publisher: Arc<dyn EventPublisher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            config,
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the paging limits.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Looks up the patient bound to an active tag.
    ///
    /// Never writes. Publishes `nfc.resolved` with the caller's user id as
    /// `caregiver_id`.
    pub async fn resolve(&self, ctx: &TenantContext, tag_id: &str) -> LifecycleResult<Resolution> {
        ctx.check_permission(Operation::Resolve)?;

        let tag = self
            .store
            .get_tag(ctx, tag_id)
            .await?
            .ok_or_else(|| not_found(tag_id))?;

        if !tag.is_active() {
            debug!(tenant = %ctx.tenant_id(), tag_id, "Resolve rejected: tag inactive");
            return Err(LifecycleError::Inactive {
                tag_id: tag_id.to_string(),
            });
        }

        let resolution = Resolution {
            patient_id: tag.patient_id().clone(),
            organization_id: ctx.tenant_id().to_string(),
        };

        self.emit(TagEvent::resolved(
            tag_id,
            tag.patient_id().as_str(),
            ctx.tenant_id().as_str(),
            ctx.user_id().map(str::to_string),
        ))
        .await;

        Ok(resolution)
    }

    /// Binds `tag_id` to `patient_id` as the patient's active tag.
    ///
    /// Re-assigning the same pair re-stamps `issued_at`. An existing tag row
    /// is rebound to the new patient.
    pub async fn assign(
        &self,
        ctx: &TenantContext,
        tag_id: &str,
        patient_id: &PatientId,
        actor_id: &str,
    ) -> LifecycleResult<TagView> {
        ctx.check_permission(Operation::Assign)?;

        let mut tx = self.store.begin(ctx).await?;
        let result = assign_in(&mut tx, tag_id, patient_id).await;
        let tag = finish(tx, result).await?;

        info!(tenant = %ctx.tenant_id(), tag_id, patient_id = %patient_id, "Assigned NFC tag");

        self.emit(TagEvent::assigned(
            tag_id,
            patient_id.as_str(),
            ctx.tenant_id().as_str(),
            actor_id,
        ))
        .await;

        Ok(TagView::from(tag))
    }

    /// Moves a tag to inactive. Already-inactive tags are returned unchanged.
    pub async fn deactivate(&self, ctx: &TenantContext, tag_id: &str) -> LifecycleResult<TagView> {
        ctx.check_permission(Operation::Deactivate)?;
        self.transition(ctx, tag_id, TagStatus::Inactive).await
    }

    /// Moves a tag back to active. Already-active tags are returned unchanged.
    ///
    /// No application-level check is made against the patient's other tags;
    /// the store's active-tag index turns a second active tag into
    /// [`LifecycleError::Conflict`].
    pub async fn reactivate(&self, ctx: &TenantContext, tag_id: &str) -> LifecycleResult<TagView> {
        ctx.check_permission(Operation::Reactivate)?;
        self.transition(ctx, tag_id, TagStatus::Active).await
    }

    async fn transition(
        &self,
        ctx: &TenantContext,
        tag_id: &str,
        target: TagStatus,
    ) -> LifecycleResult<TagView> {
        let mut tx = self.store.begin(ctx).await?;

        let current = match tx.get_tag(tag_id).await {
            Ok(Some(tag)) => tag,
            Ok(None) => {
                abandon(tx).await;
                return Err(not_found(tag_id));
            }
            Err(e) => {
                abandon(tx).await;
                return Err(e.into());
            }
        };

        if current.status() == target {
            abandon(tx).await;
            debug!(tenant = %ctx.tenant_id(), tag_id, status = %target, "Status unchanged");
            return Ok(TagView::from(current));
        }

        let result = transition_in(&mut tx, tag_id, target).await;
        let tag = finish(tx, result).await?;

        info!(tenant = %ctx.tenant_id(), tag_id, status = %target, "Changed NFC tag status");
        Ok(TagView::from(tag))
    }

    /// Swaps a patient's tag: `new_tag_id` becomes active for the patient of
    /// `old_tag_id`, which is deactivated. Publishes nothing.
    pub async fn replace(
        &self,
        ctx: &TenantContext,
        old_tag_id: &str,
        new_tag_id: &str,
    ) -> LifecycleResult<Replacement> {
        ctx.check_permission(Operation::Replace)?;

        if old_tag_id == new_tag_id {
            return Err(LifecycleError::invalid_argument(
                "Old and new tag IDs must differ",
            ));
        }

        let mut tx = self.store.begin(ctx).await?;
        let result = replace_in(&mut tx, old_tag_id, new_tag_id).await;
        let replacement = finish(tx, result).await?;

        info!(
            tenant = %ctx.tenant_id(),
            old_tag_id,
            new_tag_id,
            patient_id = %replacement.new_tag.patient_id,
            "Replaced NFC tag"
        );
        Ok(replacement)
    }

    /// Deactivates every active tag of a patient. Returns the number changed.
    pub async fn cascade_deactivate_for_patient(
        &self,
        ctx: &TenantContext,
        patient_id: &PatientId,
    ) -> LifecycleResult<u64> {
        ctx.check_permission(Operation::Reconcile)?;

        let mut tx = self.store.begin(ctx).await?;
        let result = tx
            .deactivate_for_patient(patient_id, Utc::now())
            .await
            .map_err(LifecycleError::from);
        let changed = finish_bulk(tx, result).await?;

        info!(tenant = %ctx.tenant_id(), patient_id = %patient_id, changed, "Cascaded patient deactivation");
        Ok(changed)
    }

    /// Deactivates every active tag in the caller's tenant.
    pub async fn cascade_deactivate_all(&self, ctx: &TenantContext) -> LifecycleResult<u64> {
        ctx.check_permission(Operation::Reconcile)?;

        let mut tx = self.store.begin(ctx).await?;
        let result = tx
            .deactivate_all(Utc::now())
            .await
            .map_err(LifecycleError::from);
        let changed = finish_bulk(tx, result).await?;

        info!(tenant = %ctx.tenant_id(), changed, "Cascaded organization deactivation");
        Ok(changed)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Returns one tag.
    pub async fn get_tag(&self, ctx: &TenantContext, tag_id: &str) -> LifecycleResult<TagView> {
        ctx.check_permission(Operation::Read)?;
        self.store
            .get_tag(ctx, tag_id)
            .await?
            .map(TagView::from)
            .ok_or_else(|| not_found(tag_id))
    }

    /// Returns the patient's active tag.
    pub async fn get_tag_by_patient(
        &self,
        ctx: &TenantContext,
        patient_id: &PatientId,
    ) -> LifecycleResult<TagView> {
        ctx.check_permission(Operation::Read)?;
        self.store
            .active_tag_for_patient(ctx, patient_id)
            .await?
            .map(TagView::from)
            .ok_or_else(|| LifecycleError::NoActiveTag {
                patient_id: patient_id.clone(),
            })
    }

    /// Returns one keyset page of the tenant's tags.
    pub async fn list_tags(
        &self,
        ctx: &TenantContext,
        request: &ListTagsRequest,
    ) -> LifecycleResult<TagListing> {
        ctx.check_permission(Operation::Read)?;

        let query = self.build_query(request)?;
        let page = self.store.list_tags(ctx, &query).await?;

        Ok(TagListing {
            items: page.items.iter().map(TagView::from).collect(),
            next_cursor: page.next_cursor,
        })
    }

    /// Returns total, active, and inactive counts.
    pub async fn stats(&self, ctx: &TenantContext) -> LifecycleResult<TagStats> {
        ctx.check_permission(Operation::Read)?;
        Ok(self.store.stats(ctx).await?)
    }

    fn build_query(&self, request: &ListTagsRequest) -> LifecycleResult<TagQuery> {
        let limit = match request.limit {
            Some(0) => return Err(LifecycleError::invalid_argument("limit must be positive")),
            Some(limit) => limit.min(self.config.max_page_size),
            None => self.config.default_page_size,
        };

        let mut query = TagQuery::new(limit);
        if let Some(cursor) = request.cursor.as_deref().filter(|c| !c.is_empty()) {
            query = query.with_cursor(cursor);
        }
        if let Some(status) = request.status.as_deref() {
            query = query.with_status(status.parse::<TagStatus>()?);
        }
        if let Some(search) = request.search.as_deref() {
            query = query.with_search(search);
        }
        Ok(query)
    }

    async fn emit(&self, event: TagEvent) {
        let topic = event.topic().to_string();
        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(topic = %topic, error = %e, "Failed to serialize event");
                return;
            }
        };
        if let Err(e) = self.publisher.publish(&topic, payload).await {
            warn!(topic = %topic, tag_id = %event.tag_id, error = %e, "Failed to publish event");
        }
    }
}

fn not_found(tag_id: &str) -> LifecycleError {
    LifecycleError::TagNotFound {
        tag_id: tag_id.to_string(),
    }
}

async fn assign_in<T: TagTransaction>(
    tx: &mut T,
    tag_id: &str,
    patient_id: &PatientId,
) -> LifecycleResult<Tag> {
    if !tx.patient_exists(patient_id).await? {
        return Err(LifecycleError::PatientNotFound {
            patient_id: patient_id.clone(),
        });
    }

    if let Some(existing) = tx.active_tag_for_patient(patient_id).await? {
        if existing.tag_id() != tag_id {
            return Err(LifecycleError::Conflict(
                ConflictReason::PatientHasActiveTag {
                    patient_id: patient_id.clone(),
                    active_tag_id: Some(existing.tag_id().to_string()),
                },
            ));
        }
    }

    Ok(tx.upsert_active(tag_id, patient_id, Utc::now()).await?)
}

async fn transition_in<T: TagTransaction>(
    tx: &mut T,
    tag_id: &str,
    target: TagStatus,
) -> LifecycleResult<Tag> {
    tx.set_status(tag_id, target, Utc::now()).await?;
    tx.get_tag(tag_id).await?.ok_or_else(|| not_found(tag_id))
}

async fn replace_in<T: TagTransaction>(
    tx: &mut T,
    old_tag_id: &str,
    new_tag_id: &str,
) -> LifecycleResult<Replacement> {
    let old = tx
        .get_tag(old_tag_id)
        .await?
        .ok_or_else(|| not_found(old_tag_id))?;
    let patient_id = old.patient_id().clone();

    if let Some(existing) = tx.get_tag(new_tag_id).await? {
        if existing.patient_id() != &patient_id {
            return Err(LifecycleError::Conflict(
                ConflictReason::TagAssignedElsewhere {
                    tag_id: new_tag_id.to_string(),
                    patient_id: existing.patient_id().clone(),
                },
            ));
        }
    }

    let now = Utc::now();
    // The old tag goes first so the patient never has two active tags.
    if old.is_active() {
        tx.set_status(old_tag_id, TagStatus::Inactive, now).await?;
    }
    let new_tag = tx.upsert_active(new_tag_id, &patient_id, now).await?;
    let old_tag = tx
        .get_tag(old_tag_id)
        .await?
        .ok_or_else(|| not_found(old_tag_id))?;

    Ok(Replacement {
        old_tag: TagView::from(old_tag),
        new_tag: TagView::from(new_tag),
    })
}

/// Commits on success, rolls back on failure.
async fn finish<T: TagTransaction, R>(tx: T, result: LifecycleResult<R>) -> LifecycleResult<R> {
    match result {
        Ok(value) => {
            Box::new(tx).commit().await?;
            Ok(value)
        }
        Err(e) => {
            abandon(tx).await;
            Err(e)
        }
    }
}

/// Like [`finish`], but a bulk update that matched nothing is rolled back.
async fn finish_bulk<T: TagTransaction>(tx: T, result: LifecycleResult<u64>) -> LifecycleResult<u64> {
    match result {
        Ok(0) => {
            abandon(tx).await;
            Ok(0)
        }
        other => finish(tx, other).await,
    }
}

async fn abandon<T: TagTransaction>(tx: T) {
    let tenant = tx.tenant().tenant_id().clone();
    if let Err(e) = Box::new(tx).rollback().await {
        warn!(tenant = %tenant, error = %e, "Rollback failed");
    }
}
