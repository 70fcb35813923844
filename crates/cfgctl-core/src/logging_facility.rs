//! Logging for cfgctl processes
//!
//! Call [`init`] once with the [`Profile`] matching how the process runs:
//! a one-shot CLI, a daemon, or JSON for log collectors. Stdout carries
//! command output only, so every profile writes to stderr.
//!
//! Engine operations use the `log_op_*` macros so that a transaction's
//! start, retries and end can be followed by `op` and `seqno`. Tests read
//! the same events back through [`init_test_capture`].
//!
//! ```rust
//! use cfgctl_core::logging_facility::{init, Profile};
//!
//! init(Profile::Cli { verbosity: 1 });
//! ```

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
