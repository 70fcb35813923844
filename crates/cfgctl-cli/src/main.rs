//! cfgctl CLI
//!
//! Runs batches of configuration database commands, either directly against
//! the database or through a long-running daemon.

use cfgctl_core::logging_facility::{init, Profile};
use cfgctl_core::{CtlError, Result};
use cfgctl_core_types::{InvocationOrigin, RequestContext};
use cfgctl_engine::{run_batch_with_output, Catalogue};
use cfgctl_store::{connect, Connection, Schema};
use clap::Parser;
use client::SocketSource;
use options::{Cli, DEFAULT_DB};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

mod client;
mod daemon;
mod ipc;
mod options;

fn main() {
    let mut words = options::env_options(std::env::var("CFGCTL_OPTIONS").ok());
    words.extend(std::env::args().skip(1));
    let (global, commands) = options::split_argv::<Cli>(&words);
    let cli = Cli::try_parse_from(std::iter::once("cfgctl".to_string()).chain(global.iter().cloned()))
        .unwrap_or_else(|e| e.exit());

    init(if cli.log_json {
        Profile::Production
    } else if cli.server {
        Profile::Daemon
    } else {
        Profile::Cli {
            verbosity: cli.verbose,
        }
    });

    match execute(cli, &global, commands) {
        Ok(output) => print!("{}", output),
        Err(err) => {
            eprintln!("cfgctl: {}", err.message());
            std::process::exit(1);
        }
    }
}

fn execute(cli: Cli, global: &[String], commands: Vec<String>) -> Result<String> {
    if cli.commands {
        return Ok(Catalogue::generic().usage());
    }

    if cli.detach {
        let server_args: Vec<String> = global.iter().filter(|w| *w != "--detach").cloned().collect();
        let socket = daemon::detach(&server_args)?;
        return Ok(format!("{}\n", socket));
    }

    if cli.server {
        let conn = open_connection(&cli)?;
        let socket = cli.unixctl.clone().unwrap_or_else(daemon::default_socket_path);
        daemon::Daemon::new(conn, socket, cli.pidfile.clone()).serve()?;
        return Ok(String::new());
    }

    let socket = match cli.unixctl.clone() {
        Some(path) => Some((path, SocketSource::Flag)),
        None => std::env::var("CFGCTL_DAEMON")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| (PathBuf::from(s), SocketSource::Environment)),
    };

    if cli.stop_daemon {
        let (socket, source) = socket.ok_or_else(|| CtlError::Ipc {
            message: "no daemon to stop (use --unixctl or set CFGCTL_DAEMON)".to_string(),
        })?;
        client::stop(&socket, source)?;
        return Ok(String::new());
    }

    if commands.is_empty() {
        return Err(CtlError::MissingCommandName.into());
    }

    if let Some((socket, source)) = socket {
        if cli.db.is_some() {
            warn!("not using cfgctl daemon because of --db option");
        } else {
            let local_only = [
                ("--pidfile", cli.pidfile.is_some()),
                ("--schema", cli.schema.is_some()),
                ("--verbose", cli.verbose > 0),
                ("--log-json", cli.log_json),
            ];
            for (option, given) in local_only {
                if given {
                    info!("{} has no effect on the cfgctl daemon; ignoring it", option);
                }
            }
            let mut argv = cli.run.to_args();
            argv.push("--".to_string());
            argv.extend(commands);
            client::run(&socket, source, argv, print_output)?;
            return Ok(String::new());
        }
    }

    let mut conn = open_connection(&cli)?;
    let mut invocation = cli
        .run
        .invocation(RequestContext::new(InvocationOrigin::Direct))?;
    run_batch_with_output(
        conn.as_mut(),
        &Catalogue::generic(),
        &mut invocation,
        &commands,
        print_output,
    )?;
    Ok(String::new())
}

/// Command output goes out as soon as it exists, ahead of any wait
fn print_output(text: String) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

fn open_connection(cli: &Cli) -> Result<Box<dyn Connection + Send>> {
    let schema = match &cli.schema {
        Some(path) => Schema::load(path)?,
        None => Schema::default_schema()?,
    };
    let target = cli
        .db
        .clone()
        .or_else(|| std::env::var("CFGCTL_DB").ok().filter(|s| !s.is_empty()))
        .unwrap_or_else(|| DEFAULT_DB.to_string());
    connect(&target, Arc::new(schema))
}
