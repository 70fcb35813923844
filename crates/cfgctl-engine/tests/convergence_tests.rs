//! Waiting for the distribution and fleet counters

mod common;

use cfgctl_core::{ExErrorKind, InvocationContext, WaitType};
use cfgctl_engine::{observed_generation, run_batch_with_output, wait_for_convergence, Catalogue};
use cfgctl_store::{Connection, MemoryStore};
use common::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn global_integer(store: &MemoryStore, column: &str) -> Option<i64> {
    current(store).singleton_integer("Global", column)
}

/// Copies `cfg` into `dist_cfg` (and `fleet_cfg`) whenever it moves
fn spawn_follower(store: MemoryStore, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut conn = store.connect();
        while !stop.load(Ordering::SeqCst) {
            conn.run();
            let snapshot = conn.snapshot();
            let cfg = snapshot.singleton_integer("Global", "cfg");
            let dist = snapshot.singleton_integer("Global", "dist_cfg");
            if let Some(cfg) = cfg {
                if dist != Some(cfg) {
                    set_global(&mut conn, &[("dist_cfg", cfg), ("fleet_cfg", cfg)]);
                }
            }
            conn.wait(Some(Instant::now() + Duration::from_millis(20)));
        }
    })
}

#[test]
fn test_waiter_succeeds_once_counter_reaches_target() {
    let (store, mut conn) = setup_store();
    set_global(&mut conn, &[("cfg", 42), ("dist_cfg", 41)]);

    let bumper = {
        let mut other = store.connect();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            set_global(&mut other, &[("dist_cfg", 42)]);
        })
    };

    let deadline = Instant::now() + Duration::from_secs(2);
    wait_for_convergence(&mut conn, WaitType::Dist, 42, Some(deadline)).unwrap();
    bumper.join().unwrap();
    assert_eq!(global_integer(&store, "dist_cfg"), Some(42));
}

#[test]
fn test_waiter_times_out_while_counter_lags() {
    let (_store, mut conn) = setup_store();
    set_global(&mut conn, &[("cfg", 42), ("dist_cfg", 41)]);

    let started = Instant::now();
    let err = wait_for_convergence(
        &mut conn,
        WaitType::Dist,
        42,
        Some(started + Duration::from_secs(2)),
    )
    .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Timeout);
    assert_eq!(err.message(), "timeout expired");
    assert!(started.elapsed() >= Duration::from_secs(2));
}

#[test]
fn test_fleet_waits_for_the_slower_counter() {
    let (_store, mut conn) = setup_store();
    set_global(&mut conn, &[("cfg", 42), ("dist_cfg", 42), ("fleet_cfg", 40)]);

    let snapshot = conn.snapshot();
    assert_eq!(observed_generation(&snapshot, WaitType::Dist), Some(42));
    assert_eq!(observed_generation(&snapshot, WaitType::Fleet), Some(40));
    assert_eq!(observed_generation(&snapshot, WaitType::None), None);
}

#[test]
fn test_wait_batch_converges_with_follower() {
    let (store, mut conn) = setup_store();
    set_global(&mut conn, &[("cfg", 41), ("dist_cfg", 41), ("fleet_cfg", 41)]);
    let stop = Arc::new(AtomicBool::new(false));
    let follower = spawn_follower(store.clone(), stop.clone());

    let mut invocation = InvocationContext::default()
        .with_wait(WaitType::Fleet)
        .with_timeout(Duration::from_secs(10));
    let result = run_with(&mut conn, &mut invocation, &["create", "Switch", "name=sw0"]);

    stop.store(true, Ordering::SeqCst);
    follower.join().unwrap();
    result.unwrap();
    assert_eq!(global_integer(&store, "cfg"), Some(42));
    assert_eq!(global_integer(&store, "fleet_cfg"), Some(42));
}

#[test]
fn test_wait_batch_times_out_without_follower() {
    let (store, mut conn) = setup_store();
    set_global(&mut conn, &[("cfg", 41), ("dist_cfg", 41)]);

    let mut invocation = InvocationContext::default()
        .with_wait(WaitType::Dist)
        .with_timeout(Duration::from_secs(2));
    let err = run_with(&mut conn, &mut invocation, &["create", "Switch", "name=sw0"]).unwrap_err();

    // The commit itself stands; only the wait failed
    assert_eq!(err.message(), "timeout expired");
    assert_eq!(global_integer(&store, "cfg"), Some(42));
    assert_eq!(global_integer(&store, "dist_cfg"), Some(41));
    assert!(row_named(&current(&store), "Switch", "sw0").is_some());
}

#[test]
fn test_output_is_emitted_before_the_wait_times_out() {
    let (store, mut conn) = setup_store();
    set_global(&mut conn, &[("cfg", 41), ("dist_cfg", 41)]);

    let mut invocation = InvocationContext::default()
        .with_wait(WaitType::Dist)
        .with_timeout(Duration::from_secs(1));
    let mut emitted = None;
    let err = run_batch_with_output(
        &mut conn,
        &Catalogue::generic(),
        &mut invocation,
        &words(&["create", "Switch", "name=sw0"]),
        |text| {
            emitted = Some((text, Instant::now()));
            Ok(())
        },
    )
    .unwrap_err();
    let failed_at = Instant::now();

    assert_eq!(err.message(), "timeout expired");
    let (text, emitted_at) = emitted.expect("output was never emitted");
    let uuid = row_named(&current(&store), "Switch", "sw0").unwrap();
    assert_eq!(text, format!("{}\n", uuid));
    assert!(failed_at.duration_since(emitted_at) >= Duration::from_millis(500));
}

#[test]
fn test_dry_run_with_wait_returns_without_waiting() {
    let (store, mut conn) = setup_store();
    set_global(&mut conn, &[("cfg", 41), ("dist_cfg", 41)]);

    let mut invocation = InvocationContext::default()
        .with_wait(WaitType::Dist)
        .with_timeout(Duration::from_secs(5))
        .with_dry_run(true);
    let started = Instant::now();
    run_with(&mut conn, &mut invocation, &["create", "Switch", "name=sw0"]).unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(global_integer(&store, "cfg"), Some(41));
    assert!(row_named(&current(&store), "Switch", "sw0").is_none());
}

#[test]
fn test_sync_forces_a_generation_bump() {
    let (store, mut conn) = setup_store();
    set_global(&mut conn, &[("cfg", 7), ("dist_cfg", 7)]);
    let stop = Arc::new(AtomicBool::new(false));
    let follower = spawn_follower(store.clone(), stop.clone());

    let mut invocation = InvocationContext::default()
        .with_wait(WaitType::Dist)
        .with_timeout(Duration::from_secs(10));
    let result = run_with(&mut conn, &mut invocation, &["sync"]);

    stop.store(true, Ordering::SeqCst);
    follower.join().unwrap();
    result.unwrap();
    assert!(invocation.force_wait);
    assert_eq!(global_integer(&store, "cfg"), Some(8));
}
