//! SQLite schema definitions and migrations.

use rusqlite::Connection;

use crate::error::{BackendError, StorageError, StorageResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 3;

/// Name of the partial unique index backing one-active-tag-per-patient.
pub const ACTIVE_PATIENT_INDEX: &str = "idx_nfc_tags_active_patient";

fn migration_error(step: &str, e: rusqlite::Error) -> StorageError {
    StorageError::Backend(BackendError::MigrationError {
        message: format!("{}: {}", step, e),
    })
}

/// Initialize the database schema.
///
/// Safe to run on every startup: a fresh database is created at version 1
/// and migrated forward, an up-to-date one is left alone.
pub fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, 1)?;
        migrate_schema(conn, 1)?;
    } else if current_version < SCHEMA_VERSION {
        migrate_schema(conn, current_version)?;
    }

    Ok(())
}

/// Get the current schema version.
pub fn get_schema_version(conn: &Connection) -> StorageResult<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| migration_error("Failed to create schema_version table", e))?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> StorageResult<()> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| migration_error("Failed to clear schema_version", e))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])
        .map_err(|e| migration_error("Failed to set schema_version", e))?;
    Ok(())
}

/// Version 1: the tag table and the sibling patient table.
fn create_schema_v1(conn: &Connection) -> StorageResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS nfc_tags (
            id TEXT NOT NULL UNIQUE,
            tenant_id TEXT NOT NULL,
            tag_id TEXT NOT NULL,
            patient_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active'
                CHECK (status IN ('active', 'inactive')),
            PRIMARY KEY (tenant_id, tag_id)
        )",
        [],
    )
    .map_err(|e| migration_error("Failed to create nfc_tags table", e))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS patients (
            tenant_id TEXT NOT NULL,
            id TEXT NOT NULL,
            PRIMARY KEY (tenant_id, id)
        )",
        [],
    )
    .map_err(|e| migration_error("Failed to create patients table", e))?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_nfc_tags_patient ON nfc_tags(tenant_id, patient_id)",
        [],
    )
    .map_err(|e| migration_error("Failed to create patient index", e))?;

    Ok(())
}

fn migrate_schema(conn: &Connection, from_version: i32) -> StorageResult<()> {
    let mut version = from_version;

    while version < SCHEMA_VERSION {
        match version {
            1 => migrate_v1_to_v2(conn)?,
            2 => migrate_v2_to_v3(conn)?,
            _ => {
                return Err(StorageError::Backend(BackendError::MigrationError {
                    message: format!("Unknown schema version: {}", version),
                }));
            }
        }
        version += 1;
        set_schema_version(conn, version)?;
        tracing::debug!(version, "Migrated nfc_tags schema");
    }

    Ok(())
}

/// Version 2: lifecycle timestamps.
fn migrate_v1_to_v2(conn: &Connection) -> StorageResult<()> {
    for (column, statement) in [
        ("issued_at", "ALTER TABLE nfc_tags ADD COLUMN issued_at TEXT"),
        (
            "deactivated_at",
            "ALTER TABLE nfc_tags ADD COLUMN deactivated_at TEXT",
        ),
    ] {
        if !column_exists(conn, "nfc_tags", column)? {
            conn.execute(statement, [])
                .map_err(|e| migration_error("Failed to add timestamp column", e))?;
        }
    }
    Ok(())
}

/// Version 3: at most one active tag per patient, enforced by the database.
fn migrate_v2_to_v3(conn: &Connection) -> StorageResult<()> {
    conn.execute(
        &format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON nfc_tags(tenant_id, patient_id)
             WHERE status = 'active'",
            ACTIVE_PATIENT_INDEX
        ),
        [],
    )
    .map_err(|e| migration_error("Failed to create active tag index", e))?;
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> StorageResult<bool> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", table))
        .map_err(|e| migration_error("Failed to inspect table", e))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|e| migration_error("Failed to inspect table", e))?;
    for name in names {
        if name.map_err(|e| migration_error("Failed to inspect table", e))? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
        assert!(column_exists(&conn, "nfc_tags", "issued_at").unwrap());
        assert!(column_exists(&conn, "nfc_tags", "deactivated_at").unwrap());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        initialize_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_migrates_from_v1() {
        let conn = Connection::open_in_memory().unwrap();
        get_schema_version(&conn).unwrap();
        create_schema_v1(&conn).unwrap();
        set_schema_version(&conn, 1).unwrap();
        conn.execute(
            "INSERT INTO nfc_tags (id, tenant_id, tag_id, patient_id, status)
             VALUES ('r1', 't1', 'tag-1', 'p1', 'active')",
            [],
        )
        .unwrap();

        initialize_schema(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
        let issued: Option<String> = conn
            .query_row("SELECT issued_at FROM nfc_tags WHERE tag_id = 'tag-1'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert!(issued.is_none());
    }

    #[test]
    fn test_active_index_rejects_second_active_tag() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO nfc_tags (id, tenant_id, tag_id, patient_id, status)
             VALUES ('r1', 't1', 'tag-1', 'p1', 'active')",
            [],
        )
        .unwrap();
        let second = conn.execute(
            "INSERT INTO nfc_tags (id, tenant_id, tag_id, patient_id, status)
             VALUES ('r2', 't1', 'tag-2', 'p1', 'active')",
            [],
        );
        assert!(second.is_err());

        // Inactive rows and other tenants are unconstrained.
        conn.execute(
            "INSERT INTO nfc_tags (id, tenant_id, tag_id, patient_id, status)
             VALUES ('r3', 't1', 'tag-3', 'p1', 'inactive')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO nfc_tags (id, tenant_id, tag_id, patient_id, status)
             VALUES ('r4', 't2', 'tag-1', 'p1', 'active')",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_status_check_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO nfc_tags (id, tenant_id, tag_id, patient_id, status)
             VALUES ('r1', 't1', 'tag-1', 'p1', 'lost')",
            [],
        );
        assert!(result.is_err());
    }
}
