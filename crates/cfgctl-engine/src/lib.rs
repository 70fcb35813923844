//! cfgctl Engine - transactional command execution
//!
//! Takes a batch of commands, runs it against a connection under optimistic
//! concurrency control, and retries on stale snapshots until it commits.
//!
//! - [`command`]: the command model and catalogue
//! - [`parse`]: batch parsing
//! - [`commands`]: the generic, schema-driven commands
//! - [`attempt`]: one transaction attempt
//! - [`waiter`]: waiting for downstream convergence
//! - [`main_loop`]: the per-invocation reactor
//! - [`batch`]: whole invocations

pub mod attempt;
pub mod batch;
pub mod command;
pub mod commands;
pub mod main_loop;
pub mod parse;
pub mod waiter;

pub use attempt::{run_attempt, AttemptOutcome};
pub use batch::{format_output, run_batch, run_batch_with_output, shell_join};
pub use command::{
    Catalogue, Command, CommandContext, CommandOptions, CommandSyntax, HandlerResult, HandlerSignal,
    Mode, PrereqContext,
};
pub use main_loop::main_loop;
pub use parse::parse_commands;
pub use waiter::{observed_generation, wait_for_convergence};
