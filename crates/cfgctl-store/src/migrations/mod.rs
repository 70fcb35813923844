//! Storage schema for the SQLite backend
//!
//! Every migration runs at most once per database file, and its sha256 is
//! stored next to its id. Reopening a file whose recorded checksum differs
//! from the embedded SQL is an error: the row format on disk is no longer
//! what this binary expects.
//!
//! Several cfgctl processes may open a fresh file at the same moment, so
//! pending migrations are applied under one `BEGIN IMMEDIATE` lock and the
//! ledger is re-read after the lock is taken.

use crate::errors::{checksum_mismatch, from_rusqlite, migration_error, Result};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

pub struct Migration {
    pub id: &'static str,
    pub sql: &'static str,
}

/// In application order
pub static MIGRATIONS: &[Migration] = &[
    Migration {
        id: "001_rows",
        sql: include_str!("../../migrations/001_rows.sql"),
    },
    Migration {
        id: "002_commit_history",
        sql: include_str!("../../migrations/002_commit_history.sql"),
    },
];

const LEDGER_DDL: &str = "CREATE TABLE IF NOT EXISTS cfgctl_migrations (
    id TEXT PRIMARY KEY,
    checksum TEXT NOT NULL,
    applied_at TEXT NOT NULL
)";

impl Migration {
    pub fn checksum(&self) -> String {
        hex::encode(Sha256::digest(self.sql.as_bytes()))
    }
}

/// Bring the database up to date; returns the ids applied by this call
///
/// # Errors
///
/// A recorded checksum does not match, or a migration's SQL fails. A
/// failing migration leaves the database as it was.
pub fn apply_migrations(conn: &mut Connection) -> Result<Vec<&'static str>> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(from_rusqlite)?;
    tx.execute(LEDGER_DDL, []).map_err(from_rusqlite)?;

    let mut applied = Vec::new();
    for migration in MIGRATIONS {
        let checksum = migration.checksum();
        let recorded: Option<String> = tx
            .query_row(
                "SELECT checksum FROM cfgctl_migrations WHERE id = ?1",
                [migration.id],
                |row| row.get(0),
            )
            .optional()
            .map_err(from_rusqlite)?;
        match recorded {
            Some(previous) if previous == checksum => {
                debug!(migration = migration.id, "already applied");
                continue;
            }
            Some(previous) => return Err(checksum_mismatch(migration.id, &previous, &checksum)),
            None => {}
        }

        tx.execute_batch(migration.sql)
            .map_err(|e| migration_error(migration.id, &e.to_string()))?;
        tx.execute(
            "INSERT INTO cfgctl_migrations (id, checksum, applied_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![migration.id, checksum, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(from_rusqlite)?;
        applied.push(migration.id);
    }

    tx.commit().map_err(from_rusqlite)?;
    if !applied.is_empty() {
        info!(migrations = ?applied, "database schema updated");
    }
    Ok(applied)
}
