//! The invocation reactor
//!
//! Drives one batch from its first attempt to a commit or a failure:
//! attempts run only against snapshots not tried before, and waiting
//! happens only at the connection. Waiting for the committed generation to
//! converge is left to the caller, after the batch's output is out.

use crate::attempt::{run_attempt, AttemptOutcome};
use crate::command::Command;
use cfgctl_core::{log_op_end, log_op_error, log_op_start, CtlError, InvocationContext, Result};
use cfgctl_core_types::schema::OP_MAIN_LOOP;
use cfgctl_store::Connection;
use std::time::Instant;
use tracing::debug;

#[derive(Debug)]
enum LoopState {
    Init,
    WaitForChange { last_seqno: u64 },
    RunAttempt,
    Done(Result<Option<i64>>),
}

/// Run `commands` until they commit or fail
///
/// On success returns the generation to wait for, if the invocation asked
/// to wait and the commit requested one.
///
/// # Errors
///
/// Handler, validation and commit errors; a dead connection; the invocation
/// deadline passing while waiting.
pub fn main_loop(
    conn: &mut dyn Connection,
    commands: &mut [Command],
    invocation: &InvocationContext,
    args_text: &str,
) -> Result<Option<i64>> {
    let started = Instant::now();
    let deadline = invocation.deadline();
    log_op_start!(OP_MAIN_LOOP, commands = commands.len());

    let mut attempts = 0u32;
    let mut state = LoopState::Init;
    let result = loop {
        state = match state {
            LoopState::Init => {
                let seqno = conn.seqno();
                if conn.has_ever_connected() {
                    LoopState::RunAttempt
                } else {
                    LoopState::WaitForChange { last_seqno: seqno }
                }
            }

            LoopState::WaitForChange { last_seqno } => {
                conn.run();
                if !conn.is_alive() {
                    LoopState::Done(Err(CtlError::ConnectionFailed {
                        target: conn.target().to_string(),
                        reason: conn
                            .last_error()
                            .unwrap_or_else(|| "connection lost".to_string()),
                    }
                    .into()))
                } else if conn.seqno() != last_seqno {
                    LoopState::RunAttempt
                } else if deadline.is_some_and(|d| Instant::now() >= d) {
                    LoopState::Done(Err(CtlError::TimeoutExpired.into()))
                } else {
                    conn.wait(deadline);
                    LoopState::WaitForChange { last_seqno }
                }
            }

            LoopState::RunAttempt => {
                attempts += 1;
                let seqno = conn.seqno();
                match run_attempt(conn, commands, invocation, args_text) {
                    AttemptOutcome::Success { next_cfg, .. } => {
                        let waiting = invocation.wait_spec().is_waiting();
                        LoopState::Done(Ok(next_cfg.filter(|_| waiting)))
                    }
                    AttemptOutcome::Retry => {
                        debug!(seqno, attempts, "waiting for a newer snapshot");
                        LoopState::WaitForChange { last_seqno: seqno }
                    }
                    AttemptOutcome::Fatal(err) => LoopState::Done(Err(err)),
                }
            }

            LoopState::Done(result) => break result,
        };
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(next_cfg) => {
            log_op_end!(
                OP_MAIN_LOOP,
                duration_ms = duration_ms,
                attempts = attempts,
                next_cfg = ?next_cfg
            );
        }
        Err(err) => {
            log_op_error!(OP_MAIN_LOOP, err.clone(), duration_ms = duration_ms, attempts = attempts);
        }
    }
    result
}
