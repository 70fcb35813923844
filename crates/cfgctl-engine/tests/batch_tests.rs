//! End-to-end batch behaviour against the in-memory store

mod common;

use cfgctl_core::logging_facility::test_capture::init_test_capture;
use cfgctl_core::{ExErrorKind, InvocationContext, TableFormat, TableStyle, WaitType};
use cfgctl_engine::{observed_generation, parse_commands, run_attempt, AttemptOutcome, Catalogue};
use cfgctl_store::{CommitStatus, Connection};
use common::*;
use std::time::{Duration, Instant};
use tracing::Level;
use uuid::Uuid;

#[test]
fn test_create_prints_new_uuid() {
    let (store, mut conn) = setup_store();

    let output = run(&mut conn, &["create", "Switch", "name=sw0"]).unwrap();

    let uuid = Uuid::parse_str(output.trim()).unwrap();
    assert_eq!(row_named(&current(&store), "Switch", "sw0"), Some(uuid));
}

#[test]
fn test_symbol_reuse_resolves_to_one_row() {
    let (store, mut conn) = setup_store();

    // Given two switches that reference @p before the command that creates it
    run(
        &mut conn,
        &[
            "create", "Switch", "name=sw0", "ports=@p", "--",
            "create", "Switch", "name=sw1", "ports=@p", "--",
            "--id=@p", "create", "Port", "name=p0",
        ],
    )
    .unwrap();

    // Then both point at the single Port row
    let snapshot = current(&store);
    assert_eq!(count_rows(&snapshot, "Port"), 1);
    let port = row_named(&snapshot, "Port", "p0").unwrap();
    let sw0 = row_named(&snapshot, "Switch", "sw0").unwrap();
    let sw1 = row_named(&snapshot, "Switch", "sw1").unwrap();
    assert_eq!(column_uuids(&snapshot, "Switch", sw0, "ports"), vec![port]);
    assert_eq!(column_uuids(&snapshot, "Switch", sw1, "ports"), vec![port]);
}

#[test]
fn test_failing_command_discards_whole_batch() {
    let (store, mut conn) = setup_store();
    run(&mut conn, &["init"]).unwrap();
    let before = current(&store).seqno();

    // Given five commands where the third names a missing record
    let err = run(
        &mut conn,
        &[
            "create", "Switch", "name=a", "--",
            "create", "Switch", "name=b", "--",
            "set", "Switch", "missing", "external_ids:k=v", "--",
            "create", "Switch", "name=c", "--",
            "create", "Switch", "name=d",
        ],
    )
    .unwrap_err();

    // Then nothing from the first two commands is visible
    assert_eq!(err.kind(), ExErrorKind::NotFound);
    let snapshot = current(&store);
    assert_eq!(snapshot.seqno(), before);
    assert_eq!(count_rows(&snapshot, "Switch"), 0);
}

#[test]
fn test_identical_batch_is_unchanged() {
    let (store, mut conn) = setup_store();
    run(&mut conn, &["create", "Switch", "name=sw0"]).unwrap();
    run(&mut conn, &["set", "Switch", "sw0", "external_ids:owner=ops"]).unwrap();
    let seqno = current(&store).seqno();

    // When the same set is submitted again
    let catalogue = Catalogue::generic();
    let mut commands =
        parse_commands(&catalogue, &words(&["set", "Switch", "sw0", "external_ids:owner=ops"]))
            .unwrap();
    conn.run();
    let outcome = run_attempt(&mut conn, &mut commands, &InvocationContext::default(), "again");

    // Then the commit reports no change and the store does not move
    assert!(matches!(
        outcome,
        AttemptOutcome::Success {
            status: CommitStatus::Unchanged,
            next_cfg: None
        }
    ));
    assert_eq!(current(&store).seqno(), seqno);
}

#[test]
fn test_unchanged_batch_skips_convergence_wait() {
    let (_store, mut conn) = setup_store();
    run(&mut conn, &["create", "Switch", "name=sw0"]).unwrap();

    // Given a wait request on a batch that changes nothing
    let mut invocation = InvocationContext::default()
        .with_wait(WaitType::Dist)
        .with_timeout(Duration::from_secs(5));
    let started = Instant::now();
    run_with(&mut conn, &mut invocation, &["get", "Switch", "sw0", "name"]).unwrap();

    // Then no generation was produced, so nothing was waited for
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_symbol_never_created_fails_and_commits_nothing() {
    let (store, mut conn) = setup_store();
    run(&mut conn, &["create", "Switch", "name=sw0"]).unwrap();
    let seqno = current(&store).seqno();

    let err = run(&mut conn, &["add", "Switch", "sw0", "ports", "@foo"]).unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::SymbolUnresolved);
    assert!(err.message().contains("@foo"), "message: {}", err.message());
    assert_eq!(current(&store).seqno(), seqno);
}

#[test]
fn test_unreferenced_symbol_only_warns() {
    let capture = init_test_capture();
    let (store, mut conn) = setup_store();

    run(&mut conn, &["--id=@orphan_port_7", "create", "Port", "name=p7"]).unwrap();

    let warnings = capture.messages_containing(Level::WARN, "@orphan_port_7");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("no reference to it was inserted"));
    // Unreferenced non-root rows do not survive the commit
    assert_eq!(count_rows(&current(&store), "Port"), 0);
}

#[test]
fn test_root_symbol_with_weak_reference_does_not_warn() {
    let capture = init_test_capture();
    let (store, mut conn) = setup_store();
    run(&mut conn, &["create", "Switch", "name=sw0"]).unwrap();

    run(
        &mut conn,
        &[
            "add", "Switch", "sw0", "load_balancers", "@weak_lb_3", "--",
            "--id=@weak_lb_3", "create", "LoadBalancer", "name=lb3",
        ],
    )
    .unwrap();

    let warnings = capture.messages_containing(Level::WARN, "@weak_lb_3");
    assert!(warnings.is_empty(), "root rows are held strongly: {:?}", warnings);
    assert!(row_named(&current(&store), "LoadBalancer", "lb3").is_some());
}

#[test]
fn test_weak_only_symbol_warns() {
    let capture = init_test_capture();
    let (store, mut conn) = setup_store();
    run(
        &mut conn,
        &[
            "--id=@p", "create", "Port", "name=p0", "--",
            "create", "Switch", "name=sw0", "ports=@p",
        ],
    )
    .unwrap();

    // Given a new Port reached only through the weak peer column
    run(
        &mut conn,
        &[
            "--id=@weak_peer_5", "create", "Port", "name=p5", "--",
            "set", "Port", "p0", "peer=@weak_peer_5",
        ],
    )
    .unwrap();

    let warnings = capture.messages_containing(Level::WARN, "@weak_peer_5");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("only a weak reference to it was inserted"));
    // Then the row is collected and the weak reference dropped
    let snapshot = current(&store);
    assert!(row_named(&snapshot, "Port", "p5").is_none());
    let p0 = row_named(&snapshot, "Port", "p0").unwrap();
    assert!(column_uuids(&snapshot, "Port", p0, "peer").is_empty());
}

#[test]
fn test_get_id_rebinds_earlier_references() {
    let (store, mut conn) = setup_store();
    run(
        &mut conn,
        &[
            "--id=@p", "create", "Port", "name=p0", "--",
            "create", "Switch", "name=sw0", "ports=@p",
        ],
    )
    .unwrap();
    let port = row_named(&current(&store), "Port", "p0").unwrap();

    // When a reference is written before get --id binds the symbol
    run(
        &mut conn,
        &[
            "create", "Switch", "name=sw1", "ports=@p", "--",
            "--id=@p", "get", "Port", "p0",
        ],
    )
    .unwrap();

    // Then the reference points at the existing row
    let snapshot = current(&store);
    let sw1 = row_named(&snapshot, "Switch", "sw1").unwrap();
    assert_eq!(column_uuids(&snapshot, "Switch", sw1, "ports"), vec![port]);
    assert_eq!(count_rows(&snapshot, "Port"), 1);
}

#[test]
fn test_dry_run_commits_nothing() {
    let (store, mut conn) = setup_store();
    let mut invocation = InvocationContext::default().with_dry_run(true);

    let output = run_with(&mut conn, &mut invocation, &["create", "Switch", "name=sw0"]).unwrap();

    assert!(Uuid::parse_str(output.trim()).is_ok());
    let snapshot = current(&store);
    assert_eq!(count_rows(&snapshot, "Switch"), 0);
    assert_eq!(snapshot.seqno(), 1);

    // A following ordinary invocation is not affected
    run(&mut conn, &["create", "Switch", "name=sw0"]).unwrap();
    assert!(row_named(&current(&store), "Switch", "sw0").is_some());
}

#[test]
fn test_destroy_collects_owned_rows() {
    let (store, mut conn) = setup_store();
    run(
        &mut conn,
        &[
            "--id=@p", "create", "Port", "name=p0", "--",
            "create", "Switch", "name=sw0", "ports=@p",
        ],
    )
    .unwrap();
    assert_eq!(count_rows(&current(&store), "Port"), 1);

    run(&mut conn, &["destroy", "Switch", "sw0"]).unwrap();

    let snapshot = current(&store);
    assert_eq!(count_rows(&snapshot, "Switch"), 0);
    assert_eq!(count_rows(&snapshot, "Port"), 0);
}

#[test]
fn test_remove_strong_reference_collects_row() {
    let (store, mut conn) = setup_store();
    run(
        &mut conn,
        &[
            "--id=@p", "create", "Port", "name=p0", "--",
            "create", "Switch", "name=sw0", "ports=@p",
        ],
    )
    .unwrap();
    let port = row_named(&current(&store), "Port", "p0").unwrap();

    run(&mut conn, &["remove", "Switch", "sw0", "ports", &port.to_string()]).unwrap();

    assert_eq!(count_rows(&current(&store), "Port"), 0);
}

#[test]
fn test_destroy_rejects_non_root_table() {
    let (_store, mut conn) = setup_store();
    let err = run(&mut conn, &["destroy", "Port", "p0"]).unwrap_err();
    assert_eq!(
        err.message(),
        "cannot destroy rows of Port because it is not a root table"
    );
}

#[test]
fn test_destroy_if_exists_tolerates_missing_rows() {
    let (_store, mut conn) = setup_store();
    run(&mut conn, &["--if-exists", "destroy", "Switch", "ghost"]).unwrap();
    let err = run(&mut conn, &["destroy", "Switch", "ghost"]).unwrap_err();
    assert_eq!(err.message(), "no row \"ghost\" in table Switch");
}

#[test]
fn test_map_keys_get_add_remove() {
    let (_store, mut conn) = setup_store();
    run(
        &mut conn,
        &["create", "Switch", "name=sw0", "external_ids:owner=ops"],
    )
    .unwrap();

    // add keeps existing keys
    run(
        &mut conn,
        &["add", "Switch", "sw0", "external_ids", "owner=dev", "zone=a"],
    )
    .unwrap();
    let output = run(
        &mut conn,
        &["get", "Switch", "sw0", "external_ids:owner", "external_ids:zone"],
    )
    .unwrap();
    assert_eq!(output, "ops\na\n");

    // remove KEY=VALUE only removes a matching value
    run(
        &mut conn,
        &["remove", "Switch", "sw0", "external_ids", "owner=dev", "zone"],
    )
    .unwrap();
    let output = run(&mut conn, &["get", "Switch", "sw0", "external_ids"]).unwrap();
    assert_eq!(output, "{owner=ops}\n");

    let err = run(&mut conn, &["get", "Switch", "sw0", "external_ids:zone"]).unwrap_err();
    assert!(err.message().contains("no key \"zone\""));
    let output = run(
        &mut conn,
        &["--if-exists", "get", "Switch", "sw0", "external_ids:zone"],
    )
    .unwrap();
    assert_eq!(output, "");
}

#[test]
fn test_clear_empties_set_columns() {
    let (_store, mut conn) = setup_store();
    run(
        &mut conn,
        &["create", "Switch", "name=sw0", "external_ids:a=1", "external_ids:b=2"],
    )
    .unwrap();

    run(&mut conn, &["clear", "Switch", "sw0", "external_ids"]).unwrap();

    let output = run(&mut conn, &["get", "Switch", "sw0", "external_ids"]).unwrap();
    assert_eq!(output, "{}\n");
    let err = run(&mut conn, &["clear", "Switch", "sw0", "name"]).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::InvalidInput);
}

#[test]
fn test_set_max_is_enforced() {
    let (_store, mut conn) = setup_store();
    run(
        &mut conn,
        &[
            "--id=@p", "create", "Port", "name=p0", "--",
            "create", "Switch", "name=sw0", "ports=@p",
        ],
    )
    .unwrap();

    let err = run(&mut conn, &["set", "Port", "p0", "tag=[1,2]"]).unwrap_err();
    assert!(err.message().contains("at most 1"), "message: {}", err.message());
}

#[test]
fn test_list_csv_without_headings() {
    let (_store, mut conn) = setup_store();
    run(&mut conn, &["create", "Switch", "name=sw0"]).unwrap();
    let mut invocation = InvocationContext::default().with_table_style(TableStyle {
        format: TableFormat::Csv,
        headings: false,
    });

    let output =
        run_with(&mut conn, &mut invocation, &["--columns=name", "list", "Switch"]).unwrap();

    assert_eq!(output, "sw0\n");
}

#[test]
fn test_show_nests_owned_rows() {
    let (_store, mut conn) = setup_store();
    run(
        &mut conn,
        &[
            "--id=@p", "create", "Port", "name=p0", "addresses=[\"aa:bb\"]", "--",
            "create", "Switch", "name=sw0", "ports=@p",
        ],
    )
    .unwrap();

    let output = run(&mut conn, &["show", "Switch"]).unwrap();

    let lines: Vec<&str> = output.lines().collect();
    assert!(lines[0].starts_with("Switch sw0 ("));
    assert!(lines.iter().any(|l| l.starts_with("    Port p0 (")));
    assert!(lines.iter().any(|l| l.contains("addresses: [")));
}

#[test]
fn test_oneline_escapes_newlines() {
    let (_store, mut conn) = setup_store();
    run(&mut conn, &["create", "Switch", "name=sw0", "external_ids:a=1"]).unwrap();
    let mut invocation = InvocationContext::default().with_oneline(true);

    let output = run_with(
        &mut conn,
        &mut invocation,
        &["get", "Switch", "sw0", "name", "external_ids:a", "--", "get", "Switch", "sw0", "name"],
    )
    .unwrap();

    // Number-like strings are quoted so they read back as strings
    assert_eq!(output, "sw0\\n\"1\"\nsw0\n");
}

#[test]
fn test_sync_without_wait_is_noop() {
    let capture = init_test_capture();
    let (_store, mut conn) = setup_store();
    run(&mut conn, &["sync"]).unwrap();
    assert!(!capture
        .messages_containing(Level::INFO, "\"sync\" command has no effect without --wait")
        .is_empty());
}

#[test]
fn test_comment_is_recorded_in_sqlite_history() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("conf.db");
    let schema = std::sync::Arc::new(cfgctl_store::Schema::default_schema().unwrap());
    let mut conn =
        cfgctl_store::SqliteConnection::open(path.to_str().unwrap(), schema.clone()).unwrap();

    run(&mut conn, &["create", "Switch", "name=sw0"]).unwrap();

    let history = conn.history(1).unwrap();
    assert_eq!(history[0].comment, "cfgctl: create Switch name=sw0");

    // A fresh connection sees the committed row
    let mut reopened =
        cfgctl_store::SqliteConnection::open(path.to_str().unwrap(), schema).unwrap();
    let output = run(&mut reopened, &["get", "Switch", "sw0", "name"]).unwrap();
    assert_eq!(output, "sw0\n");
    assert!(reopened.is_alive());
}

#[test]
fn test_second_global_row_is_rejected() {
    let (store, mut conn) = setup_store();
    set_global(&mut conn, &[("dist_cfg", 0), ("fleet_cfg", 0)]);

    let err = run(&mut conn, &["create", "Global"]).unwrap_err();

    assert!(
        err.message().contains("\"Global\" table to contain 2 rows, greater than the schema-defined limit of 1 row(s)"),
        "{}",
        err
    );
    let snapshot = current(&store);
    assert_eq!(count_rows(&snapshot, "Global"), 1);
    assert_eq!(observed_generation(&snapshot, WaitType::Dist), Some(0));
}
