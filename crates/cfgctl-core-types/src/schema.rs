//! Canonical schema constants for structured logging and events
//!
//! These constants keep field names consistent between the engine, the
//! daemon and the test capture layer.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_REQUEST_ID: &str = "request_id";
pub const FIELD_TRACE_ID: &str = "trace_id";

// Transaction identifiers
pub const FIELD_SEQNO: &str = "seqno";
pub const FIELD_ATTEMPT: &str = "attempt";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_SYMBOL: &str = "symbol";
pub const FIELD_NEXT_CFG: &str = "next_cfg";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
pub const EVENT_RETRY: &str = "retry";

// Operation names
pub const OP_ATTEMPT: &str = "txn_attempt";
pub const OP_MAIN_LOOP: &str = "main_loop";
pub const OP_CONVERGE: &str = "converge";
pub const OP_SERVER_RUN: &str = "server_run";
