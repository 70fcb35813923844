//! Canonical logging macros
//!
//! Every engine operation logs a `start` event and then exactly one of
//! `end`, `end_error` or `retry`. All four land at debug level except
//! `end_error`, which is info: the CLI already prints the error itself, so
//! it only shows up with `-v` or in daemon logs. The calling crate needs
//! `cfgctl_core_types` in scope for the event names.

/// Log the start of an operation
///
/// ```
/// # use cfgctl_core::log_op_start;
/// log_op_start!("txn_attempt");
/// log_op_start!("txn_attempt", seqno = 7u64);
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr $(, $($field:tt)*)?) => {
        tracing::debug!(
            component = module_path!(),
            op = $op,
            event = cfgctl_core_types::schema::EVENT_START,
            $($($field)*)?
        );
    };
}

/// Log the successful end of an operation
///
/// ```
/// # use cfgctl_core::log_op_end;
/// log_op_end!("txn_attempt", duration_ms = 42u64);
/// log_op_end!("txn_attempt", duration_ms = 42u64, status = "success");
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {
        tracing::debug!(
            component = module_path!(),
            op = $op,
            event = cfgctl_core_types::schema::EVENT_END,
            duration_ms = $duration,
            $($($field)*)?
        );
    };
}

/// Log that an operation gave up on its snapshot and will run again
///
/// `seqno` is the sequence number the attempt read; the next run waits for
/// the store to move past it.
///
/// ```
/// # use cfgctl_core::log_op_retry;
/// log_op_retry!("txn_attempt", seqno = 3u64, duration_ms = 1u64);
/// ```
#[macro_export]
macro_rules! log_op_retry {
    ($op:expr, seqno = $seqno:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {
        tracing::debug!(
            component = module_path!(),
            op = $op,
            event = cfgctl_core_types::schema::EVENT_RETRY,
            seqno = $seqno,
            duration_ms = $duration,
            $($($field)*)?
        );
    };
}

/// Log an operation error with its kind, code and class
///
/// ```
/// # use cfgctl_core::{log_op_error, errors::CtlError};
/// log_op_error!("converge", CtlError::TimeoutExpired, duration_ms = 2000u64);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {{
        let ex_err: $crate::errors::ExError = $err.into();
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = cfgctl_core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err.kind = ?ex_err.kind(),
            err.code = ex_err.code(),
            err.class = ?ex_err.class(),
            $($($field)*)?
        );
    }};
}
