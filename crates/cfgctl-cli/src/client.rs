//! Forwarding invocations to a running daemon

use crate::ipc::{read_message, write_message, Request, Response, METHOD_EXIT, METHOD_RUN};
use cfgctl_core::{CtlError, ExError, Result};
use cfgctl_core_types::TraceId;
use std::io::BufReader;
use std::os::unix::net::UnixStream;
use std::path::Path;
use tracing::debug;

/// Where the daemon socket path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketSource {
    /// `--unixctl`
    Flag,
    /// `CFGCTL_DAEMON`
    Environment,
}

impl SocketSource {
    fn hint(self) -> &'static str {
        match self {
            SocketSource::Flag => "check the --unixctl path or start a daemon with --detach",
            SocketSource::Environment => "unset CFGCTL_DAEMON to avoid using daemon",
        }
    }
}

fn unreachable_daemon(socket: &Path, source: SocketSource, reason: impl ToString) -> ExError {
    CtlError::DaemonUnreachable {
        socket: socket.display().to_string(),
        reason: reason.to_string(),
        hint: source.hint().to_string(),
    }
    .into()
}

/// Send one request and wait for its response
///
/// # Errors
///
/// The daemon cannot be reached or answers garbage.
pub fn call(socket: &Path, source: SocketSource, method: &str, params: Vec<String>) -> Result<Response> {
    let mut stream =
        UnixStream::connect(socket).map_err(|e| unreachable_daemon(socket, source, e))?;
    let trace_id = TraceId::new();
    let request = Request::new(u64::from(std::process::id()), method, params)
        .with_trace_id(trace_id.clone());
    debug!(socket = %socket.display(), method, trace_id = %trace_id, "forwarding to daemon");
    write_message(&mut stream, &request)?;

    let mut reader = BufReader::new(stream);
    let response: Response = read_message(&mut reader)?
        .ok_or_else(|| unreachable_daemon(socket, source, "connection closed by daemon"))?;
    if response.id != request.id {
        return Err(CtlError::Ipc {
            message: format!("response id {} does not match request {}", response.id, request.id),
        }
        .into());
    }
    Ok(response)
}

fn into_result(response: Response) -> Result<()> {
    match response.error {
        Some(error) => Err(CtlError::Ipc { message: error }.into()),
        None => Ok(()),
    }
}

/// Forward an invocation, handing any output to `emit` before reporting
/// the daemon's error
///
/// # Errors
///
/// See [`call`]; also the daemon's own error reply.
pub fn run<F>(socket: &Path, source: SocketSource, argv: Vec<String>, emit: F) -> Result<()>
where
    F: FnOnce(String) -> Result<()>,
{
    let mut response = call(socket, source, METHOD_RUN, argv)?;
    if let Some(output) = response.result.take() {
        emit(output)?;
    }
    into_result(response)
}

/// Ask the daemon to exit
///
/// # Errors
///
/// See [`call`].
pub fn stop(socket: &Path, source: SocketSource) -> Result<()> {
    into_result(call(socket, source, METHOD_EXIT, Vec::new())?)
}
