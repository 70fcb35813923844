//! One transaction attempt
//!
//! Runs a parsed batch against the connection's current snapshot and commits
//! it. The outcome tells the main loop whether to stop, or to wait for a
//! newer snapshot and run the whole batch again.

use crate::command::{Command, CommandContext, HandlerSignal};
use cfgctl_core::{log_op_end, log_op_error, log_op_retry, log_op_start, CtlError, ExError, InvocationContext, SymbolTable};
use cfgctl_core_types::schema::OP_ATTEMPT;
use cfgctl_store::{CommitStatus, Connection, Transaction};
use std::time::Instant;
use tracing::warn;

#[derive(Debug)]
pub enum AttemptOutcome {
    /// Committed, or nothing to commit
    Success {
        status: CommitStatus,
        /// Generation value to wait for, when an increment was applied
        next_cfg: Option<i64>,
    },
    /// The snapshot went stale; run again once it changes
    Retry,
    Fatal(ExError),
}

/// Run every command of `commands` in one transaction and commit it
///
/// `args_text` is recorded as the transaction comment.
pub fn run_attempt(
    conn: &mut dyn Connection,
    commands: &mut [Command],
    invocation: &InvocationContext,
    args_text: &str,
) -> AttemptOutcome {
    let started = Instant::now();
    let snapshot = conn.snapshot();
    let seqno = snapshot.seqno();
    log_op_start!(OP_ATTEMPT, seqno = seqno);

    let mut txn = Transaction::new(snapshot);
    txn.set_dry_run(invocation.dry_run);

    let outcome = match prepare_and_run(&mut txn, commands, invocation, args_text) {
        Ok(()) => commit(conn, &mut txn, commands),
        Err(HandlerSignal::TryAgain) => AttemptOutcome::Retry,
        Err(HandlerSignal::Fatal(err)) => AttemptOutcome::Fatal(err),
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    match &outcome {
        AttemptOutcome::Success { status, next_cfg } => {
            log_op_end!(
                OP_ATTEMPT,
                duration_ms = duration_ms,
                seqno = seqno,
                status = %status,
                next_cfg = ?next_cfg
            );
        }
        AttemptOutcome::Retry => {
            txn.abort();
            clear_outputs(commands);
            log_op_retry!(OP_ATTEMPT, seqno = seqno, duration_ms = duration_ms);
        }
        AttemptOutcome::Fatal(err) => {
            txn.abort();
            clear_outputs(commands);
            log_op_error!(OP_ATTEMPT, err.clone(), duration_ms = duration_ms, seqno = seqno);
        }
    }
    outcome
}

fn prepare_and_run(
    txn: &mut Transaction,
    commands: &mut [Command],
    invocation: &InvocationContext,
    args_text: &str,
) -> Result<(), HandlerSignal> {
    txn.add_comment(format!("cfgctl: {}", args_text));

    let schema = txn.snapshot().schema().clone();
    let generation = &schema.generation;
    let existing = txn.rows(&generation.table).first().map(|(uuid, _)| *uuid);
    let generation_row = match existing {
        Some(uuid) => uuid,
        None => {
            // Concurrent first writers must conflict instead of both
            // inserting a row.
            txn.verify_table(&generation.table);
            txn.insert(&generation.table, None)?
        }
    };

    let wait = invocation.wait_spec();
    if wait.is_waiting() {
        txn.increment(&generation.table, generation_row, &generation.target, wait.force);
    }

    let mut symtab = SymbolTable::new();
    for cmd in commands.iter_mut() {
        cmd.reset();
        let run = cmd.syntax.run;
        let mut ctx = CommandContext {
            args: &cmd.args,
            options: &cmd.options,
            output: &mut cmd.output,
            table: &mut cmd.table,
            created: &mut cmd.created,
            txn: &mut *txn,
            symtab: &mut symtab,
            invocation,
        };
        run(&mut ctx)?;
    }

    for rebinding in symtab.rebindings() {
        txn.substitute_uuid(rebinding.reserved, rebinding.bound);
    }
    for warning in symtab.validate()? {
        warn!(symbol = %warning.name, "{}", warning);
    }
    Ok(())
}

fn commit(conn: &mut dyn Connection, txn: &mut Transaction, commands: &mut [Command]) -> AttemptOutcome {
    let status = conn.commit_block(txn);
    match status {
        CommitStatus::Unchanged | CommitStatus::Success => {
            for cmd in commands.iter_mut() {
                if let Some(postprocess) = cmd.syntax.postprocess {
                    if let Err(err) = postprocess(cmd) {
                        return AttemptOutcome::Fatal(err);
                    }
                }
            }
            let next_cfg = match status {
                CommitStatus::Success => txn.increment_new_value(),
                _ => None,
            };
            AttemptOutcome::Success { status, next_cfg }
        }
        CommitStatus::TryAgain => AttemptOutcome::Retry,
        CommitStatus::Aborted => AttemptOutcome::Fatal(CtlError::TransactionAborted.into()),
        CommitStatus::Error(message) => {
            AttemptOutcome::Fatal(CtlError::TransactionError { message }.into())
        }
        CommitStatus::NotLocked => AttemptOutcome::Fatal(CtlError::NotLocked.into()),
        CommitStatus::Uncommitted | CommitStatus::Incomplete => {
            unreachable!("commit_block returned {}", status)
        }
    }
}

fn clear_outputs(commands: &mut [Command]) {
    for cmd in commands {
        cmd.reset();
    }
}
