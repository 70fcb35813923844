//! Transaction attempts
//!
//! A [`Transaction`] is bound to the snapshot it was opened on. Reads see the
//! snapshot overlaid with the transaction's own changes; nothing is visible
//! to anyone else until a connection commits it.

use crate::datum::{Atom, Datum};
use crate::schema::{ColumnKind, TableSchema};
use crate::snapshot::{Row, Snapshot};
use cfgctl_core::errors::{CtlError, ExError, ExErrorKind, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of a blocking commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStatus {
    /// Not committed yet
    Uncommitted,
    /// Sent but not answered
    Incomplete,
    /// Committed, but nothing changed
    Unchanged,
    Success,
    /// Someone else changed what this transaction read
    TryAgain,
    /// Aborted by the caller
    Aborted,
    /// Rejected by the store
    Error(String),
    /// The store lock is held elsewhere
    NotLocked,
}

impl fmt::Display for CommitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CommitStatus::Uncommitted => "uncommitted",
            CommitStatus::Incomplete => "incomplete",
            CommitStatus::Unchanged => "unchanged",
            CommitStatus::Success => "success",
            CommitStatus::TryAgain => "try again",
            CommitStatus::Aborted => "aborted",
            CommitStatus::Error(_) => "error",
            CommitStatus::NotLocked => "not locked",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Insert(Row),
    Update(Row),
    Delete,
}

/// Request to bump an integer column when the transaction commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Increment {
    pub table: String,
    pub row: Uuid,
    pub column: String,
    /// Bump even if nothing else changes
    pub force: bool,
}

pub type RowKey = (String, Uuid);

#[derive(Debug)]
pub struct Transaction {
    snapshot: Arc<Snapshot>,
    changes: BTreeMap<RowKey, Change>,
    verified_rows: BTreeSet<RowKey>,
    verified_tables: BTreeSet<String>,
    increment: Option<Increment>,
    comments: Vec<String>,
    dry_run: bool,
    status: CommitStatus,
    increment_new_value: Option<i64>,
}

impl Transaction {
    pub fn new(snapshot: Arc<Snapshot>) -> Self {
        Self {
            snapshot,
            changes: BTreeMap::new(),
            verified_rows: BTreeSet::new(),
            verified_tables: BTreeSet::new(),
            increment: None,
            comments: Vec::new(),
            dry_run: false,
            status: CommitStatus::Uncommitted,
            increment_new_value: None,
        }
    }

    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn add_comment(&mut self, comment: impl Into<String>) {
        self.comments.push(comment.into());
    }

    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    pub fn changes(&self) -> &BTreeMap<RowKey, Change> {
        &self.changes
    }

    pub fn verified_rows(&self) -> &BTreeSet<RowKey> {
        &self.verified_rows
    }

    pub fn verified_tables(&self) -> &BTreeSet<String> {
        &self.verified_tables
    }

    pub fn increment_request(&self) -> Option<&Increment> {
        self.increment.as_ref()
    }

    pub fn status(&self) -> &CommitStatus {
        &self.status
    }

    /// New value of the incremented column after a successful commit
    pub fn increment_new_value(&self) -> Option<i64> {
        self.increment_new_value
    }

    /// Record the result of a commit; called by connections
    pub fn finish(&mut self, status: CommitStatus, increment_new_value: Option<i64>) {
        self.status = status;
        self.increment_new_value = increment_new_value;
    }

    /// Give up on the transaction; a later commit reports `Aborted`
    pub fn abort(&mut self) {
        self.changes.clear();
        self.status = CommitStatus::Aborted;
    }

    pub fn is_aborted(&self) -> bool {
        self.status == CommitStatus::Aborted
    }

    fn table_schema(&self, table: &str) -> Result<&TableSchema> {
        self.snapshot.schema().table(table)
    }

    /// Current contents of a row, including this transaction's changes
    pub fn row(&self, table: &str, uuid: &Uuid) -> Option<&Row> {
        match self.changes.get(&(table.to_string(), *uuid)) {
            Some(Change::Insert(row)) | Some(Change::Update(row)) => Some(row),
            Some(Change::Delete) => None,
            None => self.snapshot.row(table, uuid).map(|r| &r.data),
        }
    }

    /// All rows of a table, including this transaction's changes, by uuid
    pub fn rows(&self, table: &str) -> Vec<(Uuid, &Row)> {
        let mut uuids: BTreeSet<Uuid> = self
            .snapshot
            .table_rows(table)
            .map(|rows| rows.keys().copied().collect())
            .unwrap_or_default();
        uuids.extend(
            self.changes
                .iter()
                .filter(|((t, _), c)| t == table && matches!(c, Change::Insert(_)))
                .map(|((_, u), _)| *u),
        );
        uuids
            .into_iter()
            .filter_map(|u| self.row(table, &u).map(|row| (u, row)))
            .collect()
    }

    /// Insert a row with every column at its default
    ///
    /// # Errors
    ///
    /// Unknown table, or a uuid already in use.
    pub fn insert(&mut self, table: &str, uuid: Option<Uuid>) -> Result<Uuid> {
        let schema = self.table_schema(table)?;
        let name = schema.name.clone();
        let row: Row = schema
            .columns
            .values()
            .map(|c| (c.name.clone(), Datum::default_for(c)))
            .collect();
        let uuid = uuid.unwrap_or_else(Uuid::new_v4);
        if self.row(&name, &uuid).is_some() {
            return Err(ExError::new(ExErrorKind::AlreadyExists)
                .with_op("insert")
                .with_table(name)
                .with_record(uuid.to_string())
                .with_message(format!("row {} already exists", uuid)));
        }
        self.changes.insert((name, uuid), Change::Insert(row));
        Ok(uuid)
    }

    /// Replace one column of a row
    ///
    /// # Errors
    ///
    /// Unknown table or column, missing row, or a value of the wrong shape.
    pub fn set_column(&mut self, table: &str, uuid: &Uuid, column: &str, value: Datum) -> Result<()> {
        let schema = self.table_schema(table)?;
        let name = schema.name.clone();
        let column_schema = schema.column(column)?;
        check_shape(schema, column_schema.name.as_str(), column_schema.kind, column_schema.max, &value)?;
        let column_name = column_schema.name.clone();

        let mut row = self
            .row(&name, uuid)
            .cloned()
            .ok_or_else(|| missing_row(&name, uuid))?;
        row.insert(column_name, value);
        self.update(&name, uuid, row);
        Ok(())
    }

    fn update(&mut self, table: &str, uuid: &Uuid, row: Row) {
        let key = (table.to_string(), *uuid);
        let change = match self.changes.get(&key) {
            Some(Change::Insert(_)) => Change::Insert(row),
            _ => Change::Update(row),
        };
        self.changes.insert(key, change);
    }

    /// Delete a row
    ///
    /// # Errors
    ///
    /// Unknown table or missing row.
    pub fn delete(&mut self, table: &str, uuid: &Uuid) -> Result<()> {
        let name = self.table_schema(table)?.name.clone();
        if self.row(&name, uuid).is_none() {
            return Err(missing_row(&name, uuid));
        }
        let key = (name, *uuid);
        match self.changes.get(&key) {
            Some(Change::Insert(_)) => {
                self.changes.remove(&key);
            }
            _ => {
                self.changes.insert(key, Change::Delete);
            }
        }
        Ok(())
    }

    /// Require that the row is unchanged at commit time
    pub fn verify(&mut self, table: &str, uuid: &Uuid) {
        self.verified_rows.insert((table.to_string(), *uuid));
    }

    /// Require that no row was inserted into or deleted from `table`
    pub fn verify_table(&mut self, table: &str) {
        self.verified_tables.insert(table.to_string());
    }

    /// Ask the commit to bump an integer column of one row
    pub fn increment(&mut self, table: &str, row: Uuid, column: &str, force: bool) {
        self.increment = Some(Increment {
            table: table.to_string(),
            row,
            column: column.to_string(),
            force,
        });
    }

    /// Rewrite every reference to `from` in this transaction's rows as `to`
    pub fn substitute_uuid(&mut self, from: Uuid, to: Uuid) {
        for change in self.changes.values_mut() {
            let row = match change {
                Change::Insert(row) | Change::Update(row) => row,
                Change::Delete => continue,
            };
            for datum in row.values_mut() {
                match datum {
                    Datum::Scalar(atom) if *atom == Atom::Uuid(from) => *atom = Atom::Uuid(to),
                    Datum::Set(set) => {
                        if set.remove(&Atom::Uuid(from)) {
                            set.insert(Atom::Uuid(to));
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

fn missing_row(table: &str, uuid: &Uuid) -> ExError {
    CtlError::RecordNotFound {
        table: table.to_string(),
        record: uuid.to_string(),
    }
    .into()
}

fn check_shape(
    table: &TableSchema,
    column: &str,
    kind: ColumnKind,
    max: Option<usize>,
    value: &Datum,
) -> Result<()> {
    let fits = matches!(
        (kind, value),
        (ColumnKind::Scalar, Datum::Scalar(_))
            | (ColumnKind::Set, Datum::Set(_))
            | (ColumnKind::Map, Datum::Map(_))
    );
    if !fits {
        return Err(CtlError::InvalidValue {
            column: column.to_string(),
            reason: "value does not match the column type".to_string(),
        }
        .into());
    }
    if let (Some(max), Datum::Set(set)) = (max, value) {
        if set.len() > max {
            return Err(CtlError::TooManyValues {
                table: table.name.clone(),
                column: column.to_string(),
                max,
            }
            .into());
        }
    }
    Ok(())
}
