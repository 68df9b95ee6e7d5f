//! SQL shared by the store and its transactions.
//!
//! Every statement is parameterised on `tenant_id`; nothing here can reach
//! another tenant's rows.

use chrono::{DateTime, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use uuid::Uuid;

use crate::error::{BackendError, ConstraintError, StorageError, StorageResult};
use crate::tenant::TenantId;
use crate::types::{PatientId, Tag, TagQuery, TagStats, TagStatus, fold_case};

const TAG_COLUMNS: &str = "id, tenant_id, tag_id, patient_id, status, issued_at, deactivated_at";

/// SQL name of the [`fold_case`] scalar function.
pub(crate) const FOLD_FUNCTION: &str = "nfc_fold";

/// Registers the scalar functions the queries rely on.
pub(crate) fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        FOLD_FUNCTION,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|v| fold_case(&v)))
        },
    )
}

fn corrupt_row(message: String) -> StorageError {
    StorageError::Backend(BackendError::SerializationError { message })
}

/// A tag row before its text columns are parsed.
struct TagRow {
    id: String,
    tenant_id: String,
    tag_id: String,
    patient_id: String,
    status: String,
    issued_at: Option<String>,
    deactivated_at: Option<String>,
}

impl TagRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            tag_id: row.get(2)?,
            patient_id: row.get(3)?,
            status: row.get(4)?,
            issued_at: row.get(5)?,
            deactivated_at: row.get(6)?,
        })
    }

    fn into_tag(self) -> StorageResult<Tag> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| corrupt_row(format!("invalid row id {}: {}", self.id, e)))?;
        let status: TagStatus = self.status.parse()?;
        Ok(Tag::from_storage(
            id,
            TenantId::new(self.tenant_id),
            self.tag_id,
            PatientId::new(self.patient_id),
            status,
            parse_timestamp(self.issued_at)?,
            parse_timestamp(self.deactivated_at)?,
        ))
    }
}

fn parse_timestamp(value: Option<String>) -> StorageResult<Option<DateTime<Utc>>> {
    value
        .map(|text| {
            DateTime::parse_from_rfc3339(&text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| corrupt_row(format!("invalid timestamp {}: {}", text, e)))
        })
        .transpose()
}

pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

/// Maps a violation of the active-tag index to a constraint error.
fn map_write_error(err: rusqlite::Error, patient_id: &PatientId) -> StorageError {
    if let rusqlite::Error::SqliteFailure(ref failure, Some(ref message)) = err {
        if failure.code == rusqlite::ErrorCode::ConstraintViolation
            && message.contains("nfc_tags.patient_id")
        {
            return StorageError::Constraint(ConstraintError::ActiveTagExists {
                patient_id: patient_id.clone(),
            });
        }
    }
    err.into()
}

pub(crate) fn get_tag(conn: &Connection, tenant: &TenantId, tag_id: &str) -> StorageResult<Option<Tag>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {} FROM nfc_tags WHERE tenant_id = ?1 AND tag_id = ?2",
                TAG_COLUMNS
            ),
            params![tenant.as_str(), tag_id],
            TagRow::read,
        )
        .optional()?;
    row.map(TagRow::into_tag).transpose()
}

pub(crate) fn active_tag_for_patient(
    conn: &Connection,
    tenant: &TenantId,
    patient_id: &PatientId,
) -> StorageResult<Option<Tag>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {} FROM nfc_tags
                 WHERE tenant_id = ?1 AND patient_id = ?2 AND status = 'active'",
                TAG_COLUMNS
            ),
            params![tenant.as_str(), patient_id.as_str()],
            TagRow::read,
        )
        .optional()?;
    row.map(TagRow::into_tag).transpose()
}

pub(crate) fn patient_exists(
    conn: &Connection,
    tenant: &TenantId,
    patient_id: &PatientId,
) -> StorageResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM patients WHERE tenant_id = ?1 AND id = ?2",
            params![tenant.as_str(), patient_id.as_str()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn insert_patient(
    conn: &Connection,
    tenant: &TenantId,
    patient_id: &PatientId,
) -> StorageResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO patients (tenant_id, id) VALUES (?1, ?2)",
        params![tenant.as_str(), patient_id.as_str()],
    )?;
    Ok(())
}

pub(crate) fn list_tags(
    conn: &Connection,
    tenant: &TenantId,
    query: &TagQuery,
) -> StorageResult<Vec<Tag>> {
    let mut sql = format!("SELECT {} FROM nfc_tags WHERE tenant_id = ?", TAG_COLUMNS);
    let mut values: Vec<SqlValue> = vec![SqlValue::Text(tenant.as_str().to_string())];

    if let Some(cursor) = query.cursor() {
        sql.push_str(" AND tag_id > ?");
        values.push(SqlValue::Text(cursor.to_string()));
    }
    if let Some(status) = query.status() {
        sql.push_str(" AND status = ?");
        values.push(SqlValue::Text(status.as_str().to_string()));
    }
    if let Some(pattern) = query.search_pattern() {
        sql.push_str(&format!(
            " AND ({f}(tag_id) LIKE ? ESCAPE '\\' OR {f}(patient_id) LIKE ? ESCAPE '\\')",
            f = FOLD_FUNCTION
        ));
        values.push(SqlValue::Text(pattern.clone()));
        values.push(SqlValue::Text(pattern));
    }
    sql.push_str(" ORDER BY tag_id ASC LIMIT ?");
    values.push(SqlValue::Integer(
        i64::try_from(query.fetch_limit()).unwrap_or(i64::MAX),
    ));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), TagRow::read)?;

    let mut tags = Vec::new();
    for row in rows {
        tags.push(row?.into_tag()?);
    }
    Ok(tags)
}

pub(crate) fn stats(conn: &Connection, tenant: &TenantId) -> StorageResult<TagStats> {
    let (total, active, inactive) = conn.query_row(
        "SELECT COUNT(*),
                SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END),
                SUM(CASE WHEN status = 'inactive' THEN 1 ELSE 0 END)
         FROM nfc_tags WHERE tenant_id = ?1",
        params![tenant.as_str()],
        |row| {
            Ok((
                row.get::<_, Option<i64>>(0)?,
                row.get::<_, Option<i64>>(1)?,
                row.get::<_, Option<i64>>(2)?,
            ))
        },
    )?;
    Ok(TagStats::from_aggregates(total, active, inactive))
}

pub(crate) fn upsert_active(
    conn: &Connection,
    tenant: &TenantId,
    tag_id: &str,
    patient_id: &PatientId,
    issued_at: DateTime<Utc>,
) -> StorageResult<Tag> {
    let row = conn
        .query_row(
            &format!(
                "INSERT INTO nfc_tags (id, tenant_id, tag_id, patient_id, status, issued_at, deactivated_at)
                 VALUES (?1, ?2, ?3, ?4, 'active', ?5, NULL)
                 ON CONFLICT(tenant_id, tag_id) DO UPDATE SET
                     patient_id = excluded.patient_id,
                     status = 'active',
                     issued_at = excluded.issued_at,
                     deactivated_at = NULL
                 RETURNING {}",
                TAG_COLUMNS
            ),
            params![
                Uuid::new_v4().to_string(),
                tenant.as_str(),
                tag_id,
                patient_id.as_str(),
                format_timestamp(issued_at),
            ],
            TagRow::read,
        )
        .map_err(|e| map_write_error(e, patient_id))?;
    row.into_tag()
}

pub(crate) fn set_status(
    conn: &Connection,
    tenant: &TenantId,
    tag_id: &str,
    status: TagStatus,
    at: DateTime<Utc>,
) -> StorageResult<u64> {
    let changed = match status {
        TagStatus::Inactive => conn.execute(
            "UPDATE nfc_tags SET status = 'inactive', deactivated_at = ?3
             WHERE tenant_id = ?1 AND tag_id = ?2 AND status = 'active'",
            params![tenant.as_str(), tag_id, format_timestamp(at)],
        )?,
        TagStatus::Active => conn
            .execute(
                "UPDATE nfc_tags SET status = 'active', deactivated_at = NULL
                 WHERE tenant_id = ?1 AND tag_id = ?2 AND status = 'inactive'",
                params![tenant.as_str(), tag_id],
            )
            .map_err(|e| {
                let patient_id = get_tag(conn, tenant, tag_id)
                    .ok()
                    .flatten()
                    .map(|tag| tag.patient_id().clone())
                    .unwrap_or_else(|| PatientId::new(""));
                map_write_error(e, &patient_id)
            })?,
    };
    Ok(changed as u64)
}

pub(crate) fn deactivate_for_patient(
    conn: &Connection,
    tenant: &TenantId,
    patient_id: &PatientId,
    at: DateTime<Utc>,
) -> StorageResult<u64> {
    let changed = conn.execute(
        "UPDATE nfc_tags SET status = 'inactive', deactivated_at = ?3
         WHERE tenant_id = ?1 AND patient_id = ?2 AND status = 'active'",
        params![tenant.as_str(), patient_id.as_str(), format_timestamp(at)],
    )?;
    Ok(changed as u64)
}

pub(crate) fn deactivate_all(
    conn: &Connection,
    tenant: &TenantId,
    at: DateTime<Utc>,
) -> StorageResult<u64> {
    let changed = conn.execute(
        "UPDATE nfc_tags SET status = 'inactive', deactivated_at = ?2
         WHERE tenant_id = ?1 AND status = 'active'",
        params![tenant.as_str(), format_timestamp(at)],
    )?;
    Ok(changed as u64)
}
