#![allow(clippy::unwrap_used, clippy::expect_used)]

use cfgctl_core::errors::CtlError;
use cfgctl_core::logging_facility::test_capture::init_test_capture;
use cfgctl_core::{log_op_end, log_op_error, log_op_retry, log_op_start};
use cfgctl_core_types::schema::{EVENT_END, EVENT_END_ERROR, EVENT_RETRY, EVENT_START};
use tracing::Level;

#[test]
fn test_attempt_lifecycle_events() {
    let capture = init_test_capture();
    let op = "lifecycle_op_1";

    log_op_start!(op, seqno = 7u64);
    log_op_retry!(op, seqno = 7u64, duration_ms = 3u64);
    log_op_start!(op, seqno = 8u64);
    log_op_end!(op, duration_ms = 5u64, status = "success");

    let events = capture.events_for_op(op);
    let names: Vec<_> = events.iter().map(|e| e.event().unwrap()).collect();
    assert_eq!(names, [EVENT_START, EVENT_RETRY, EVENT_START, EVENT_END]);
    assert_eq!(events[1].field("seqno"), Some("7"));
    assert_eq!(events[3].field("status"), Some("success"));
    assert!(events.iter().all(|e| e.level == Level::DEBUG));
}

#[test]
fn test_log_op_end_records_duration() {
    let capture = init_test_capture();
    let op = "end_op_2";

    log_op_end!(op, duration_ms = 42u64);

    let events = capture.events_for_op(op);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event(), Some(EVENT_END));
    assert_eq!(events[0].field("duration_ms"), Some("42"));
}

#[test]
fn test_log_op_error_is_info_with_code_and_class() {
    let capture = init_test_capture();
    let op = "error_op_3";

    log_op_error!(op, CtlError::TimeoutExpired, duration_ms = 2000u64, next_cfg = 9i64);

    let events = capture.events_for_op(op);
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.level, Level::INFO);
    assert_eq!(event.event(), Some(EVENT_END_ERROR));
    assert_eq!(event.field("err.code"), Some("ERR_TIMEOUT"));
    assert_eq!(event.field("err.class"), Some("Timeout"));
    assert_eq!(event.field("next_cfg"), Some("9"));
}

#[test]
fn test_component_is_module_path() {
    let capture = init_test_capture();
    let op = "component_op_4";

    log_op_start!(op);

    let count = capture.count_events(|e| {
        e.op() == Some(op) && e.component() == Some("logging_facility_tests")
    });
    assert_eq!(count, 1);
}

#[test]
fn test_assert_event_exists_finds_retry() {
    let capture = init_test_capture();
    let op = "retry_op_5";

    log_op_retry!(op, seqno = 1u64, duration_ms = 0u64);

    capture.assert_event_exists(op, EVENT_RETRY);
}
