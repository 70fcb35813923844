#![allow(dead_code)]

use cfgctl_core::{InvocationContext, Result};
use cfgctl_engine::{run_batch, Catalogue};
use cfgctl_store::{
    Atom, Connection, Datum, MemoryConnection, MemoryStore, Schema, Snapshot, Transaction,
};
use std::sync::Arc;
use uuid::Uuid;

pub fn setup_store() -> (MemoryStore, MemoryConnection) {
    let schema = Arc::new(Schema::default_schema().unwrap());
    let store = MemoryStore::new(schema);
    let conn = store.connect();
    (store, conn)
}

pub fn words(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

pub fn run(conn: &mut dyn Connection, args: &[&str]) -> Result<String> {
    let mut invocation = InvocationContext::default();
    run_with(conn, &mut invocation, args)
}

pub fn run_with(
    conn: &mut dyn Connection,
    invocation: &mut InvocationContext,
    args: &[&str],
) -> Result<String> {
    run_batch(conn, &Catalogue::generic(), invocation, &words(args))
}

pub fn current(store: &MemoryStore) -> Arc<Snapshot> {
    store.current().unwrap()
}

/// Uuid of the row of `table` whose `name` column is `name`
pub fn row_named(snapshot: &Snapshot, table: &str, name: &str) -> Option<Uuid> {
    snapshot.table_rows(table).and_then(|rows| {
        rows.iter()
            .find(|(_, r)| r.data.get("name").and_then(Datum::as_str) == Some(name))
            .map(|(uuid, _)| *uuid)
    })
}

pub fn count_rows(snapshot: &Snapshot, table: &str) -> usize {
    snapshot.table_rows(table).map(|rows| rows.len()).unwrap_or(0)
}

pub fn column_uuids(snapshot: &Snapshot, table: &str, row: Uuid, column: &str) -> Vec<Uuid> {
    snapshot
        .row(table, &row)
        .and_then(|r| r.data.get(column))
        .map(|d| d.uuids().collect())
        .unwrap_or_default()
}

/// Set integer columns of the Global row, creating the row if needed
pub fn set_global(conn: &mut dyn Connection, values: &[(&str, i64)]) {
    conn.run();
    let mut txn = Transaction::new(conn.snapshot());
    let global = match txn.rows("Global").first() {
        Some((uuid, _)) => *uuid,
        None => txn.insert("Global", None).unwrap(),
    };
    for (column, value) in values {
        txn.set_column("Global", &global, column, Datum::Scalar(Atom::Integer(*value)))
            .unwrap();
    }
    let status = conn.commit_block(&mut txn);
    assert!(
        matches!(status, cfgctl_store::CommitStatus::Success),
        "seeding Global failed: {}",
        status
    );
}
