//! Commit planning shared by every backend
//!
//! Given the store's current contents and a transaction opened on some
//! earlier (or the same) snapshot, decide the commit status and compute the
//! next snapshot. Backends only have to load the current state and persist
//! the result.

use crate::datum::{Atom, Datum};
use crate::schema::{RefStrength, Schema};
use crate::snapshot::{RowRecord, Snapshot, TableRows};
use crate::transaction::{Change, CommitStatus, RowKey, Transaction};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use uuid::Uuid;

/// One row to write (or delete, when `record` is `None`)
#[derive(Debug, Clone, PartialEq)]
pub struct RowDelta {
    pub table: String,
    pub uuid: Uuid,
    pub record: Option<RowRecord>,
}

#[derive(Debug)]
pub struct CommitPlan {
    pub status: CommitStatus,
    /// Contents after the commit; only for a durable `Success`
    pub next: Option<Snapshot>,
    pub delta: Vec<RowDelta>,
    pub increment_new_value: Option<i64>,
}

impl CommitPlan {
    fn status(status: CommitStatus) -> Self {
        Self {
            status,
            next: None,
            delta: Vec::new(),
            increment_new_value: None,
        }
    }
}

pub fn plan_commit(current: &Snapshot, txn: &Transaction) -> CommitPlan {
    if txn.is_aborted() {
        return CommitPlan::status(CommitStatus::Aborted);
    }
    if has_conflict(current, txn) {
        debug!(
            base = txn.snapshot().seqno(),
            current = current.seqno(),
            "transaction read stale rows"
        );
        return CommitPlan::status(CommitStatus::TryAgain);
    }

    let schema = current.schema().clone();
    let mut tables = current.tables().clone();
    for ((table, uuid), change) in txn.changes() {
        let rows = tables.entry(table.clone()).or_default();
        match change {
            Change::Insert(row) | Change::Update(row) => {
                let version = rows.get(uuid).map(|r| r.version).unwrap_or(0);
                rows.insert(
                    *uuid,
                    RowRecord {
                        uuid: *uuid,
                        version,
                        data: row.clone(),
                    },
                );
            }
            Change::Delete => {
                rows.remove(uuid);
            }
        }
    }

    collect_garbage(&schema, &mut tables);
    drop_dangling_weak_refs(&schema, &mut tables);
    if let Some(message) = find_dangling_strong_ref(&schema, &tables) {
        return CommitPlan::status(CommitStatus::Error(message));
    }
    if let Some(message) = find_row_limit_overflow(&schema, &tables) {
        return CommitPlan::status(CommitStatus::Error(message));
    }

    let mut changed = diff(current.tables(), &tables);

    let mut increment_new_value = None;
    if let Some(inc) = txn.increment_request() {
        if !changed.is_empty() || inc.force {
            let Some(record) = tables
                .get_mut(&inc.table)
                .and_then(|rows| rows.get_mut(&inc.row))
            else {
                return CommitPlan::status(CommitStatus::Error(format!(
                    "cannot increment {}.{}: row {} does not exist",
                    inc.table, inc.column, inc.row
                )));
            };
            let value = record
                .data
                .get(&inc.column)
                .and_then(Datum::as_integer)
                .unwrap_or(0)
                + 1;
            record
                .data
                .insert(inc.column.clone(), Datum::Scalar(Atom::Integer(value)));
            increment_new_value = Some(value);
            changed.insert((inc.table.clone(), inc.row));
        }
    }

    if changed.is_empty() {
        return CommitPlan::status(CommitStatus::Unchanged);
    }
    if txn.is_dry_run() {
        return CommitPlan::status(CommitStatus::Success);
    }

    let seqno = current.seqno() + 1;
    let mut table_versions = current.table_versions().clone();
    let mut delta = Vec::with_capacity(changed.len());
    for (table, uuid) in &changed {
        let existed = current.row(table, uuid).is_some();
        let record = tables.get_mut(table).and_then(|rows| rows.get_mut(uuid));
        if existed != record.is_some() {
            table_versions.insert(table.clone(), seqno);
        }
        let record = record.map(|r| {
            r.version = seqno;
            r.clone()
        });
        delta.push(RowDelta {
            table: table.clone(),
            uuid: *uuid,
            record,
        });
    }

    CommitPlan {
        status: CommitStatus::Success,
        next: Some(Snapshot::from_parts(schema, seqno, tables, table_versions)),
        delta,
        increment_new_value,
    }
}

/// Did anything this transaction touched or verified move since its snapshot?
fn has_conflict(current: &Snapshot, txn: &Transaction) -> bool {
    let base = txn.snapshot();
    if base.seqno() == current.seqno() {
        return false;
    }
    let stale_row = txn
        .changes()
        .keys()
        .chain(txn.verified_rows())
        .any(|(table, uuid)| base.row_version(table, uuid) != current.row_version(table, uuid));
    let stale_table = txn
        .verified_tables()
        .iter()
        .any(|table| base.table_version(table) != current.table_version(table));
    stale_row || stale_table
}

fn references(
    schema: &Schema,
    tables: &BTreeMap<String, TableRows>,
    strength: RefStrength,
) -> Vec<(String, Uuid, String, Uuid)> {
    let mut refs = Vec::new();
    for (name, table) in &schema.tables {
        let Some(rows) = tables.get(name) else {
            continue;
        };
        for column in table.columns.values() {
            let Some((target, s)) = column.atom.reference() else {
                continue;
            };
            if s != strength {
                continue;
            }
            for record in rows.values() {
                if let Some(datum) = record.data.get(&column.name) {
                    refs.extend(
                        datum
                            .uuids()
                            .map(|u| (name.clone(), record.uuid, target.to_string(), u)),
                    );
                }
            }
        }
    }
    refs
}

/// Remove non-root rows nothing strongly refers to, until none are left
fn collect_garbage(schema: &Schema, tables: &mut BTreeMap<String, TableRows>) {
    loop {
        let referenced: BTreeSet<Uuid> = references(schema, tables, RefStrength::Strong)
            .into_iter()
            .map(|(_, _, _, target)| target)
            .collect();
        let mut removed = 0;
        for (name, table) in &schema.tables {
            if table.is_root {
                continue;
            }
            if let Some(rows) = tables.get_mut(name) {
                let before = rows.len();
                rows.retain(|uuid, _| referenced.contains(uuid));
                removed += before - rows.len();
            }
        }
        if removed == 0 {
            break;
        }
    }
}

fn drop_dangling_weak_refs(schema: &Schema, tables: &mut BTreeMap<String, TableRows>) {
    let existing: BTreeMap<String, BTreeSet<Uuid>> = tables
        .iter()
        .map(|(name, rows)| (name.clone(), rows.keys().copied().collect()))
        .collect();
    for (name, table) in &schema.tables {
        let Some(rows) = tables.get_mut(name) else {
            continue;
        };
        for column in table.columns.values() {
            let Some((target, RefStrength::Weak)) = column.atom.reference() else {
                continue;
            };
            let live = existing.get(target);
            for record in rows.values_mut() {
                if let Some(Datum::Set(set)) = record.data.get_mut(&column.name) {
                    set.retain(|atom| match atom {
                        Atom::Uuid(u) => live.is_some_and(|l| l.contains(u)),
                        _ => true,
                    });
                }
            }
        }
    }
}

fn find_dangling_strong_ref(schema: &Schema, tables: &BTreeMap<String, TableRows>) -> Option<String> {
    references(schema, tables, RefStrength::Strong)
        .into_iter()
        .find(|(_, _, target, uuid)| !tables.get(target).is_some_and(|rows| rows.contains_key(uuid)))
        .map(|(table, row, target, uuid)| {
            format!(
                "referential integrity violation: row {} in table {} refers to nonexistent {} row {}",
                row, table, target, uuid
            )
        })
}

fn find_row_limit_overflow(schema: &Schema, tables: &BTreeMap<String, TableRows>) -> Option<String> {
    schema.tables.values().find_map(|table| {
        let limit = table.max_rows?;
        let count = tables.get(&table.name).map_or(0, |rows| rows.len());
        (count > limit).then(|| {
            format!(
                "constraint violation: transaction causes \"{}\" table to contain {} rows, greater than the schema-defined limit of {} row(s)",
                table.name, count, limit
            )
        })
    })
}

/// Rows whose contents differ between two states
fn diff(
    before: &BTreeMap<String, TableRows>,
    after: &BTreeMap<String, TableRows>,
) -> BTreeSet<RowKey> {
    let mut changed = BTreeSet::new();
    let names: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    let empty = TableRows::new();
    for name in names {
        let old = before.get(name).unwrap_or(&empty);
        let new = after.get(name).unwrap_or(&empty);
        for (uuid, record) in old {
            match new.get(uuid) {
                Some(r) if r.data == record.data => {}
                _ => {
                    changed.insert((name.clone(), *uuid));
                }
            }
        }
        for uuid in new.keys() {
            if !old.contains_key(uuid) {
                changed.insert((name.clone(), *uuid));
            }
        }
    }
    changed
}
