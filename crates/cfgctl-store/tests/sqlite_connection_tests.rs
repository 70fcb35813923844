// Integration tests for the SQLite backend

use cfgctl_store::{
    Atom, CommitStatus, Connection, Datum, Schema, SqliteConnection, Transaction,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::TempDir;

fn schema() -> Arc<Schema> {
    Arc::new(Schema::default_schema().unwrap())
}

fn setup_db() -> (TempDir, String) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("conf.db");
    (dir, path.to_string_lossy().into_owned())
}

fn open(path: &str) -> SqliteConnection {
    let mut conn = SqliteConnection::open(path, schema()).unwrap();
    conn.run();
    conn
}

fn name(n: &str) -> Datum {
    Datum::Scalar(Atom::String(n.to_string()))
}

#[test]
fn test_commit_survives_reopen() {
    let (_dir, path) = setup_db();

    // Given: a switch with one port committed through one connection
    let mut conn = open(&path);
    let mut txn = Transaction::new(conn.snapshot());
    txn.add_comment("cfgctl: create sw0");
    let sw = txn.insert("Switch", None).unwrap();
    let port = txn.insert("Port", None).unwrap();
    txn.set_column("Switch", &sw, "name", name("sw0")).unwrap();
    txn.set_column("Port", &port, "name", name("p0")).unwrap();
    let ports: BTreeSet<Atom> = [Atom::Uuid(port)].into_iter().collect();
    txn.set_column("Switch", &sw, "ports", Datum::Set(ports)).unwrap();
    assert_eq!(conn.commit_block(&mut txn), CommitStatus::Success);
    drop(conn);

    // When: the file is opened again
    let reopened = open(&path);

    // Then: both rows are back, with the versions they were committed at
    let snapshot = reopened.snapshot();
    assert_eq!(snapshot.seqno(), 2);
    assert_eq!(snapshot.row("Switch", &sw).unwrap().data["name"], name("sw0"));
    assert_eq!(snapshot.row_version("Port", &port), Some(2));
    assert_eq!(snapshot.table_version("Switch"), 2);

    // And: the history records the comment
    let history = reopened.history(10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].seqno, 2);
    assert_eq!(history[0].comment, "cfgctl: create sw0");
    assert_eq!(history[0].changed_rows, 2);
}

#[test]
fn test_second_connection_sees_commit_after_run() {
    let (_dir, path) = setup_db();
    let mut writer = open(&path);
    let mut reader = open(&path);
    assert_eq!(reader.seqno(), 1);

    let mut txn = Transaction::new(writer.snapshot());
    txn.insert("LoadBalancer", None).unwrap();
    assert_eq!(writer.commit_block(&mut txn), CommitStatus::Success);

    assert_eq!(reader.seqno(), 1);
    reader.run();
    assert_eq!(reader.seqno(), 2);
    assert_eq!(reader.snapshot().row_count(), 1);
}

#[test]
fn test_stale_transaction_gets_try_again_and_replica_advances() {
    let (_dir, path) = setup_db();
    let mut a = open(&path);
    let mut setup = Transaction::new(a.snapshot());
    let sw = setup.insert("Switch", None).unwrap();
    a.commit_block(&mut setup);

    let mut b = open(&path);
    let mut t1 = Transaction::new(a.snapshot());
    t1.set_column("Switch", &sw, "name", name("one")).unwrap();
    let mut t2 = Transaction::new(b.snapshot());
    t2.set_column("Switch", &sw, "name", name("two")).unwrap();

    assert_eq!(a.commit_block(&mut t1), CommitStatus::Success);
    assert_eq!(b.commit_block(&mut t2), CommitStatus::TryAgain);

    // The commit attempt loaded the newer state
    assert_eq!(b.seqno(), a.seqno());
}

#[test]
fn test_dry_run_is_not_durable() {
    let (_dir, path) = setup_db();
    let mut conn = open(&path);
    let mut txn = Transaction::new(conn.snapshot());
    txn.set_dry_run(true);
    txn.insert("Switch", None).unwrap();

    assert_eq!(conn.commit_block(&mut txn), CommitStatus::Success);
    assert_eq!(conn.seqno(), 1);
    assert!(open(&path).history(10).unwrap().is_empty());
}

#[test]
fn test_aborted_transaction_reports_aborted() {
    let (_dir, path) = setup_db();
    let mut conn = open(&path);
    let mut txn = Transaction::new(conn.snapshot());
    txn.insert("Switch", None).unwrap();
    txn.abort();
    assert_eq!(conn.commit_block(&mut txn), CommitStatus::Aborted);
}

#[test]
fn test_increment_returns_new_value() {
    let (_dir, path) = setup_db();
    let mut conn = open(&path);
    let mut txn = Transaction::new(conn.snapshot());
    let global = txn.insert("Global", None).unwrap();
    txn.increment("Global", global, "cfg", true);
    assert_eq!(conn.commit_block(&mut txn), CommitStatus::Success);
    assert_eq!(txn.increment_new_value(), Some(1));

    let mut txn = Transaction::new(conn.snapshot());
    txn.increment("Global", global, "cfg", true);
    conn.commit_block(&mut txn);
    assert_eq!(txn.increment_new_value(), Some(2));
    assert_eq!(open(&path).snapshot().singleton_integer("Global", "cfg"), Some(2));
}
