//! Option grammar
//!
//! Global options come first; the first word that is not an option (or the
//! first `--`) starts the command batch. The per-invocation part of the
//! grammar lives in [`RunArgs`] so the daemon can parse forwarded requests
//! exactly as direct mode does.

use clap::{Args, CommandFactory, Parser};
use cfgctl_core::{
    parse_timeout, ExError, ExErrorKind, InvocationContext, Result, TableFormat, TableStyle,
    WaitType,
};
use cfgctl_core_types::RequestContext;
use std::path::PathBuf;

pub const DEFAULT_DB: &str = ".cfgctl/conf.db";

#[derive(Debug, Parser)]
#[command(name = "cfgctl")]
#[command(about = "cfgctl - transactional configuration database control", long_about = None)]
#[command(override_usage = "cfgctl [OPTIONS] COMMAND [ARG...] [-- [OPTIONS] COMMAND [ARG...]]...")]
pub struct Cli {
    /// Database to use: a SQLite file or "memory:" [env: CFGCTL_DB]
    #[arg(long)]
    pub db: Option<String>,

    /// Daemon control socket (defaults to CFGCTL_DAEMON when forwarding)
    #[arg(long)]
    pub unixctl: Option<PathBuf>,

    /// Start a daemon in the background and print its socket path
    #[arg(long)]
    pub detach: bool,

    /// Run a daemon in the foreground
    #[arg(long)]
    pub server: bool,

    /// Write the daemon's pid to this file
    #[arg(long)]
    pub pidfile: Option<PathBuf>,

    /// Database schema (JSON); the built-in schema is used otherwise
    #[arg(long, env = "CFGCTL_SCHEMA")]
    pub schema: Option<PathBuf>,

    /// Ask a running daemon to exit
    #[arg(long)]
    pub stop_daemon: bool,

    /// List the available commands
    #[arg(long)]
    pub commands: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Options that shape one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct RunArgs {
    /// Wait for the change to reach "dist" or the whole "fleet" ("none" to not wait)
    #[arg(long)]
    pub wait: Option<String>,

    /// Do not wait (same as --wait=none)
    #[arg(long)]
    pub no_wait: bool,

    /// Run the commands but do not commit
    #[arg(long)]
    pub dry_run: bool,

    /// Print each command's output on a single line
    #[arg(long)]
    pub oneline: bool,

    /// Give up after SECS seconds
    #[arg(short = 't', long, value_name = "SECS")]
    pub timeout: Option<String>,

    /// Table output format: table, list, csv, json
    #[arg(long, short = 'f')]
    pub format: Option<String>,

    /// Omit table headings
    #[arg(long)]
    pub no_headings: bool,
}

/// Just the per-invocation grammar, as parsed by the daemon
#[derive(Debug, Parser)]
#[command(name = "cfgctl")]
pub struct RunCli {
    #[command(flatten)]
    pub run: RunArgs,
}

impl RunArgs {
    /// Build a fresh invocation context from these options
    ///
    /// # Errors
    ///
    /// Bad `--wait`, `--timeout` or `--format` values.
    pub fn invocation(&self, request: RequestContext) -> Result<InvocationContext> {
        let mut invocation = InvocationContext::new(request);
        invocation.wait = match (&self.wait, self.no_wait) {
            (_, true) => WaitType::None,
            (Some(value), false) => value.parse()?,
            (None, false) => WaitType::None,
        };
        invocation.dry_run = self.dry_run;
        invocation.oneline = self.oneline;
        invocation.timeout = self.timeout.as_deref().map(parse_timeout).transpose()?;
        invocation.table_style = TableStyle {
            format: match &self.format {
                Some(format) => format.parse::<TableFormat>()?,
                None => TableFormat::Table,
            },
            headings: !self.no_headings,
        };
        Ok(invocation)
    }

    /// These options spelled back as arguments, for forwarding to a daemon
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(wait) = &self.wait {
            args.push(format!("--wait={}", wait));
        }
        if self.no_wait {
            args.push("--no-wait".to_string());
        }
        if self.dry_run {
            args.push("--dry-run".to_string());
        }
        if self.oneline {
            args.push("--oneline".to_string());
        }
        if let Some(timeout) = &self.timeout {
            args.push(format!("--timeout={}", timeout));
        }
        if let Some(format) = &self.format {
            args.push(format!("--format={}", format));
        }
        if self.no_headings {
            args.push("--no-headings".to_string());
        }
        args
    }
}

/// Split argv (without the program name) into global options and commands
///
/// Options that take a separate value (`-t 5`, `--db path`) keep it.
pub fn split_argv<C: CommandFactory>(args: &[String]) -> (Vec<String>, Vec<String>) {
    let command = C::command();
    let takes_value = |word: &str| -> bool {
        if word.contains('=') {
            return false;
        }
        command.get_arguments().any(|arg| {
            let named = match word.strip_prefix("--") {
                Some(long) => arg.get_long() == Some(long),
                None => word.len() == 2 && word.strip_prefix('-').and_then(|s| s.chars().next()) == arg.get_short(),
            };
            named && arg.get_action().takes_values()
        })
    };

    let mut global = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let word = &args[i];
        if word == "--" {
            return (global, args[i + 1..].to_vec());
        }
        if !word.starts_with('-') || word == "-" {
            return (global, args[i..].to_vec());
        }
        global.push(word.clone());
        if takes_value(word) && i + 1 < args.len() {
            global.push(args[i + 1].clone());
            i += 1;
        }
        i += 1;
    }
    (global, Vec::new())
}

/// Words of `CFGCTL_OPTIONS`, placed before the command line's own options
pub fn env_options(value: Option<String>) -> Vec<String> {
    value
        .map(|v| v.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Parse the per-invocation options of a forwarded request
///
/// # Errors
///
/// Unknown options, or values [`RunArgs::invocation`] rejects.
pub fn parse_forwarded(argv: &[String]) -> Result<(RunArgs, Vec<String>)> {
    let (global, commands) = split_argv::<RunCli>(argv);
    let parsed = RunCli::try_parse_from(std::iter::once("cfgctl".to_string()).chain(global))
        .map_err(|e| {
            let text = e.to_string();
            let first = text.lines().next().unwrap_or_default();
            ExError::new(ExErrorKind::InvalidInput)
                .with_op("run")
                .with_message(first.trim_start_matches("error: ").to_string())
        })?;
    Ok((parsed.run, commands))
}
