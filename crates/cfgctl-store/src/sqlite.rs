//! SQLite-backed store
//!
//! All rows live in one `rows` table as JSON, keyed by table name and uuid.
//! A single `seqno` in `meta` is bumped by every durable commit; other
//! processes notice commits by polling it.

use crate::connection::{wait_budget, Connection, POLL_INTERVAL};
use crate::datum::Datum;
use crate::db;
use crate::errors::{corrupt_row, from_rusqlite, Result};
use crate::migrations::apply_migrations;
use crate::planner::{plan_commit, CommitPlan, RowDelta};
use crate::schema::Schema;
use crate::snapshot::{Row, RowRecord, Snapshot, TableRows};
use crate::transaction::{CommitStatus, Transaction};
use rusqlite::{params, ErrorCode, TransactionBehavior};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One entry of the commit history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub seqno: u64,
    pub committed_at: String,
    pub comment: String,
    pub changed_rows: usize,
}

pub struct SqliteConnection {
    conn: rusqlite::Connection,
    target: String,
    schema: Arc<Schema>,
    replica: Arc<Snapshot>,
    synced: bool,
    alive: bool,
    last_error: Option<String>,
}

impl SqliteConnection {
    /// Open (creating and migrating if needed) the database at `path`
    ///
    /// # Errors
    ///
    /// The file cannot be opened or the migrations fail.
    pub fn open(path: &str, schema: Arc<Schema>) -> Result<Self> {
        let mut conn = db::open(path)?;
        db::configure(&conn)?;
        apply_migrations(&mut conn)?;
        Ok(Self {
            conn,
            target: path.to_string(),
            replica: Arc::new(Snapshot::empty(schema.clone(), 0)),
            schema,
            synced: false,
            alive: true,
            last_error: None,
        })
    }

    /// Durable commits, newest first
    ///
    /// # Errors
    ///
    /// Database read failures.
    pub fn history(&self, limit: usize) -> Result<Vec<CommitRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT seqno, committed_at, comment, changed_rows FROM commits
                 ORDER BY seqno DESC LIMIT ?",
            )
            .map_err(from_rusqlite)?;
        let records = stmt
            .query_map([limit as i64], |row| {
                Ok(CommitRecord {
                    seqno: row.get::<_, i64>(0)? as u64,
                    committed_at: row.get(1)?,
                    comment: row.get(2)?,
                    changed_rows: row.get::<_, i64>(3)? as usize,
                })
            })
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        Ok(records)
    }

    fn fail(&mut self, reason: String) {
        warn!(target_db = %self.target, %reason, "database connection failed");
        self.alive = false;
        self.last_error = Some(reason);
    }

    fn try_commit(
        &mut self,
        txn: &Transaction,
    ) -> std::result::Result<(CommitPlan, Option<Snapshot>), rusqlite::Error> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored = stored_seqno(&tx)?;
        let loaded = if self.synced && stored == self.replica.seqno() {
            None
        } else {
            Some(load_snapshot(&tx, &self.schema)?)
        };
        let current: &Snapshot = match &loaded {
            Some(snapshot) => snapshot,
            None => &self.replica,
        };
        let plan = plan_commit(current, txn);

        if let Some(next) = &plan.next {
            persist(&tx, &plan.delta, next, txn.comments())?;
            tx.commit()?;
        }
        Ok((plan, loaded))
    }
}

fn stored_seqno(conn: &rusqlite::Connection) -> rusqlite::Result<u64> {
    conn.query_row("SELECT value FROM meta WHERE key = 'seqno'", [], |row| {
        row.get::<_, i64>(0)
    })
    .map(|v| v as u64)
}

/// Read the whole database
fn load_snapshot(conn: &rusqlite::Connection, schema: &Arc<Schema>) -> rusqlite::Result<Snapshot> {
    let seqno = stored_seqno(conn)?;

    let mut tables: BTreeMap<String, TableRows> = BTreeMap::new();
    let mut stmt = conn.prepare("SELECT tbl, uuid, version, data FROM rows")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let table: String = row.get(0)?;
        let uuid_text: String = row.get(1)?;
        let version: i64 = row.get(2)?;
        let data: String = row.get(3)?;
        match decode_row(schema, &table, &uuid_text, &data) {
            Ok(Some((uuid, data))) => {
                tables.entry(table).or_default().insert(
                    uuid,
                    RowRecord {
                        uuid,
                        version: version as u64,
                        data,
                    },
                );
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "skipping undecodable row"),
        }
    }

    let mut table_versions = BTreeMap::new();
    let mut stmt = conn.prepare("SELECT tbl, version FROM table_versions")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let table: String = row.get(0)?;
        let version: i64 = row.get(1)?;
        table_versions.insert(table, version as u64);
    }

    Ok(Snapshot::from_parts(schema.clone(), seqno, tables, table_versions))
}

/// Decode a stored row against the current schema
///
/// Rows of unknown tables yield `None`; unknown columns are dropped and
/// missing ones take their defaults.
fn decode_row(
    schema: &Schema,
    table: &str,
    uuid: &str,
    data: &str,
) -> Result<Option<(Uuid, Row)>> {
    let Some(table_schema) = schema.tables.get(table) else {
        return Ok(None);
    };
    let uuid_value = Uuid::parse_str(uuid).map_err(|e| corrupt_row(table, uuid, &e.to_string()))?;
    let mut stored: Row =
        serde_json::from_str(data).map_err(|e| corrupt_row(table, uuid, &e.to_string()))?;
    let row = table_schema
        .columns
        .values()
        .map(|c| {
            let value = stored
                .remove(&c.name)
                .unwrap_or_else(|| Datum::default_for(c));
            (c.name.clone(), value)
        })
        .collect();
    Ok(Some((uuid_value, row)))
}

fn persist(
    tx: &rusqlite::Transaction<'_>,
    delta: &[RowDelta],
    next: &Snapshot,
    comments: &[String],
) -> rusqlite::Result<()> {
    for change in delta {
        match &change.record {
            Some(record) => {
                let data = serde_json::to_string(&record.data)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                tx.execute(
                    "INSERT OR REPLACE INTO rows (tbl, uuid, version, data) VALUES (?1, ?2, ?3, ?4)",
                    params![change.table, change.uuid.to_string(), record.version as i64, data],
                )?;
            }
            None => {
                tx.execute(
                    "DELETE FROM rows WHERE tbl = ?1 AND uuid = ?2",
                    params![change.table, change.uuid.to_string()],
                )?;
            }
        }
    }
    for (table, version) in next.table_versions() {
        tx.execute(
            "INSERT OR REPLACE INTO table_versions (tbl, version) VALUES (?1, ?2)",
            params![table, *version as i64],
        )?;
    }
    tx.execute(
        "UPDATE meta SET value = ?1 WHERE key = 'seqno'",
        params![next.seqno() as i64],
    )?;
    tx.execute(
        "INSERT INTO commits (seqno, committed_at, comment, changed_rows) VALUES (?1, ?2, ?3, ?4)",
        params![
            next.seqno() as i64,
            chrono::Utc::now().to_rfc3339(),
            comments.join("\n"),
            delta.len() as i64
        ],
    )?;
    Ok(())
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked
    )
}

impl Connection for SqliteConnection {
    fn target(&self) -> &str {
        &self.target
    }

    fn run(&mut self) {
        if !self.alive {
            return;
        }
        let stored = match stored_seqno(&self.conn) {
            Ok(s) => s,
            Err(e) if is_busy(&e) => return,
            Err(e) => return self.fail(e.to_string()),
        };
        if self.synced && stored == self.replica.seqno() {
            return;
        }
        match load_snapshot(&self.conn, &self.schema) {
            Ok(snapshot) => {
                debug!(seqno = snapshot.seqno(), "loaded database");
                self.replica = Arc::new(snapshot);
                self.synced = true;
            }
            Err(e) if is_busy(&e) => {}
            Err(e) => self.fail(e.to_string()),
        }
    }

    fn is_alive(&self) -> bool {
        self.alive
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }

    fn has_ever_connected(&self) -> bool {
        self.synced
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.replica.clone()
    }

    fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    fn commit_block(&mut self, txn: &mut Transaction) -> CommitStatus {
        if txn.is_aborted() {
            txn.finish(CommitStatus::Aborted, None);
            return CommitStatus::Aborted;
        }
        let status = match self.try_commit(txn) {
            Ok((plan, loaded)) => {
                if let Some(next) = plan.next {
                    info!(seqno = next.seqno(), rows = plan.delta.len(), "committed");
                    self.replica = Arc::new(next);
                    self.synced = true;
                } else if let Some(loaded) = loaded {
                    self.replica = Arc::new(loaded);
                    self.synced = true;
                }
                txn.finish(plan.status.clone(), plan.increment_new_value);
                return plan.status;
            }
            Err(e) if is_busy(&e) => CommitStatus::NotLocked,
            Err(e) => CommitStatus::Error(e.to_string()),
        };
        txn.finish(status.clone(), None);
        status
    }

    fn wait(&mut self, deadline: Option<Instant>) {
        std::thread::sleep(wait_budget(deadline, POLL_INTERVAL));
    }
}
