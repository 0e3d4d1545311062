//! Ordered, named schema migrations plus the public id backfill.
//!
//! Every step is idempotent on its own so a database written by any
//! earlier build (including ones that predate `schema_migrations`)
//! converges on the current schema.

use journal_core::time::now_timestamp;
use journal_core::PublicId;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::public_id::assign_unique;
use crate::schema;

pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub apply: fn(&Connection) -> rusqlite::Result<()>,
}

/// Append new steps at the end; never reorder or renumber.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_entries",
        apply: create_entries,
    },
    Migration {
        version: 2,
        name: "add_public_id",
        apply: add_public_id,
    },
];

pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Apply every migration newer than the recorded version.
/// Returns how many steps ran.
pub fn run_migrations(conn: &Connection) -> Result<usize, StoreError> {
    conn.execute_batch(schema::CREATE_MIGRATIONS_TABLE)
        .map_err(|e| StoreError::Database(format!("migrations table: {e}")))?;

    let current = current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let tx = conn.unchecked_transaction()?;
        (migration.apply)(&tx).map_err(|e| {
            StoreError::Database(format!(
                "migration {} ({}): {e}",
                migration.version, migration.name
            ))
        })?;
        tx.execute(
            "INSERT OR IGNORE INTO schema_migrations (version, name, applied_at)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![migration.version, migration.name, now_timestamp()],
        )?;
        tx.commit()?;

        info!(version = migration.version, name = migration.name, "migration applied");
        applied += 1;
    }

    Ok(applied)
}

pub fn current_version(conn: &Connection) -> Result<u32, StoreError> {
    let version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

fn create_entries(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(schema::CREATE_ENTRIES)
}

fn add_public_id(conn: &Connection) -> rusqlite::Result<()> {
    if !has_column(conn, schema::ENTRIES_TABLE, "public_id")? {
        conn.execute_batch(schema::ADD_PUBLIC_ID_COLUMN)?;
    }
    conn.execute_batch(schema::NORMALIZE_EMPTY_PUBLIC_IDS)?;
    conn.execute_batch(schema::CREATE_PUBLIC_ID_INDEX)
}

pub fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let columns: Vec<String> = conn
        .prepare(&format!("PRAGMA table_info({table})"))?
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns.iter().any(|c| c == column))
}

/// Give every entry lacking a public id a fresh unique one.
///
/// Safe to run on every startup and from several processes at once: the
/// `UPDATE` only touches rows that are still unassigned, and the unique
/// index turns a racing duplicate into a retry. Returns the number of rows
/// changed.
pub fn backfill_public_ids(
    conn: &Connection,
    generate: &dyn Fn() -> PublicId,
) -> Result<usize, StoreError> {
    let pending: Vec<i64> = conn
        .prepare(
            "SELECT id FROM entries WHERE public_id IS NULL OR public_id = '' ORDER BY id",
        )?
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;

    if pending.is_empty() {
        return Ok(0);
    }

    let mut changed = 0;
    for id in &pending {
        let (public_id, rows) = assign_unique(generate, |candidate| {
            conn.execute(
                "UPDATE entries SET public_id = ?1
                 WHERE id = ?2 AND (public_id IS NULL OR public_id = '')",
                rusqlite::params![candidate.as_str(), id],
            )
        })?;
        if rows > 0 {
            debug!(entry_id = id, public_id = %public_id, "public id backfilled");
        }
        changed += rows;
    }

    info!(pending = pending.len(), changed, "public id backfill finished");
    Ok(changed)
}
