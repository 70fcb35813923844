//! Whole invocations: parse, check, run, format

use crate::command::{Catalogue, Command, Mode, PrereqContext};
use crate::main_loop::main_loop;
use crate::parse::parse_commands;
use crate::waiter::wait_for_convergence;
use cfgctl_core::{render_command, InvocationContext, Result};
use cfgctl_core_types::TraceId;
use cfgctl_store::Connection;
use tracing::{debug, info};

/// Run the batch spelled by `words` and return its formatted output
///
/// Output committed before a failed convergence wait is dropped here; use
/// [`run_batch_with_output`] to keep it.
///
/// # Errors
///
/// Any parse, validation, handler, commit, connection or timeout error.
pub fn run_batch(
    conn: &mut dyn Connection,
    catalogue: &Catalogue,
    invocation: &mut InvocationContext,
    words: &[String],
) -> Result<String> {
    let mut output = String::new();
    run_batch_with_output(conn, catalogue, invocation, words, |text| {
        output = text;
        Ok(())
    })?;
    Ok(output)
}

/// Run the batch spelled by `words`, handing its formatted output to
/// `emit` as soon as the batch commits
///
/// Prerequisites may adjust `invocation` (for example `sync` forcing a
/// wait) before the first attempt. `emit` runs before any convergence
/// wait, so a wait that times out still leaves the output delivered.
///
/// # Errors
///
/// Any parse, validation, handler, commit, connection or timeout error,
/// or whatever `emit` returns.
pub fn run_batch_with_output<F>(
    conn: &mut dyn Connection,
    catalogue: &Catalogue,
    invocation: &mut InvocationContext,
    words: &[String],
    emit: F,
) -> Result<()>
where
    F: FnOnce(String) -> Result<()>,
{
    let mut commands = parse_commands(catalogue, words)?;
    let schema = conn.schema();
    for cmd in &commands {
        if let Some(prereq) = cmd.syntax.prerequisites {
            prereq(&mut PrereqContext {
                schema: &schema,
                args: &cmd.args,
                options: &cmd.options,
                invocation: &mut *invocation,
            })?;
        }
    }

    let args_text = shell_join(words);
    let request = &invocation.request;
    let request_id = request.request_id.as_str();
    let trace_id = request.trace_id.as_ref().map(TraceId::as_str).unwrap_or("-");
    let origin = request.origin.as_str();
    if commands.iter().any(|c| c.syntax.mode == Mode::ReadWrite) {
        info!(request_id, trace_id, origin, "Called as {}", args_text);
    } else {
        debug!(request_id, trace_id, origin, "Called as {}", args_text);
    }

    let pending = main_loop(conn, &mut commands, invocation, &args_text)?;
    emit(format_output(&commands, invocation))?;
    match pending {
        Some(next_cfg) => {
            wait_for_convergence(conn, invocation.wait, next_cfg, invocation.deadline())
        }
        None => Ok(()),
    }
}

/// Concatenate every command's rendered output, in batch order
pub fn format_output(commands: &[Command], invocation: &InvocationContext) -> String {
    commands
        .iter()
        .map(|cmd| {
            render_command(
                &cmd.output,
                cmd.table.as_ref(),
                invocation.table_style,
                invocation.oneline,
            )
        })
        .collect()
}

/// Join words so that the result reads back as the same words in a shell
pub fn shell_join(words: &[String]) -> String {
    words
        .iter()
        .map(|w| {
            let plain = !w.is_empty()
                && w.chars()
                    .all(|c| c.is_ascii_alphanumeric() || "-_=:@./,[]{}".contains(c));
            if plain {
                w.clone()
            } else {
                format!("'{}'", w.replace('\'', "'\\''"))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
