//! The cfgctl daemon
//!
//! Keeps one database connection open and serves `run` and `exit` requests
//! on a Unix socket. Every `run` gets a fresh invocation context, so nothing
//! one request sets (dry-run, waiting, formats) carries over to the next.

use crate::ipc::{parse_message, write_message, Request, Response, METHOD_EXIT, METHOD_RUN};
use crate::options::parse_forwarded;
use cfgctl_core::{log_op_end, log_op_start, CtlError, ExError, Result};
use cfgctl_core_types::schema::OP_SERVER_RUN;
use cfgctl_core_types::{InvocationOrigin, RequestContext, TraceId};
use cfgctl_engine::{run_batch_with_output, Catalogue};
use cfgctl_store::{Connection, POLL_INTERVAL};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How long a connected client may stay silent before it is dropped
pub const CLIENT_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Socket used when `--unixctl` is not given
pub fn default_socket_path() -> PathBuf {
    std::env::temp_dir().join(format!("cfgctl.{}.ctl", std::process::id()))
}

pub struct Daemon {
    conn: Box<dyn Connection + Send>,
    catalogue: Catalogue,
    socket: PathBuf,
    pidfile: Option<PathBuf>,
    shutdown: bool,
}

impl Daemon {
    pub fn new(conn: Box<dyn Connection + Send>, socket: PathBuf, pidfile: Option<PathBuf>) -> Self {
        Self {
            conn,
            catalogue: Catalogue::generic(),
            socket,
            pidfile,
            shutdown: false,
        }
    }

    /// Sync, bind, announce the socket on stdout, then serve until `exit`
    ///
    /// # Errors
    ///
    /// The connection fails before its first sync, or the socket or pidfile
    /// cannot be created.
    pub fn serve(mut self) -> Result<()> {
        self.wait_for_sync()?;

        if self.socket.exists() {
            warn!(socket = %self.socket.display(), "removing stale socket");
            std::fs::remove_file(&self.socket)?;
        }
        let listener = UnixListener::bind(&self.socket)?;
        listener.set_nonblocking(true)?;
        if let Some(pidfile) = &self.pidfile {
            std::fs::write(pidfile, format!("{}\n", std::process::id()))?;
        }

        let mut stdout = std::io::stdout();
        writeln!(stdout, "{}", self.socket.display())?;
        stdout.flush()?;
        info!(socket = %self.socket.display(), target_db = self.conn.target(), "daemon ready");

        let result = self.serve_loop(&listener);
        self.cleanup();
        result
    }

    fn wait_for_sync(&mut self) -> Result<()> {
        while !self.conn.has_ever_connected() {
            self.conn.run();
            if !self.conn.is_alive() {
                return Err(self.connection_failed());
            }
            if !self.conn.has_ever_connected() {
                self.conn.wait(None);
            }
        }
        Ok(())
    }

    fn connection_failed(&self) -> ExError {
        CtlError::ConnectionFailed {
            target: self.conn.target().to_string(),
            reason: self
                .conn
                .last_error()
                .unwrap_or_else(|| "connection lost".to_string()),
        }
        .into()
    }

    fn serve_loop(&mut self, listener: &UnixListener) -> Result<()> {
        while !self.shutdown {
            self.conn.run();
            if !self.conn.is_alive() {
                return Err(self.connection_failed());
            }
            match listener.accept() {
                Ok((stream, _)) => {
                    if let Err(err) = self.handle_client(stream) {
                        warn!(error = %err, "client connection failed");
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    self.conn.wait(Some(Instant::now() + POLL_INTERVAL));
                }
                Err(e) => return Err(e.into()),
            }
        }
        info!("daemon exiting");
        Ok(())
    }

    fn handle_client(&mut self, stream: UnixStream) -> Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(CLIENT_IDLE_TIMEOUT))?;
        let mut writer = stream.try_clone()?;
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    debug!(timeout_ms = CLIENT_IDLE_TIMEOUT.as_millis() as u64, "dropping idle client");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
            let request: Request = parse_message(&line)?;
            let response = self.handle_request(request);
            write_message(&mut writer, &response)?;
            if self.shutdown {
                break;
            }
        }
        Ok(())
    }

    /// Answer one request
    pub fn handle_request(&mut self, request: Request) -> Response {
        match request.method.as_str() {
            METHOD_EXIT => {
                self.shutdown = true;
                Response::ok(request.id, "")
            }
            METHOD_RUN => {
                let mut output = String::new();
                match self.run(&request.params, request.trace_id, &mut output) {
                    Ok(()) => Response::ok(request.id, output),
                    Err(err) => Response::error_with_output(request.id, output, err.message()),
                }
            }
            other => Response::error(request.id, format!("unknown method \"{}\"", other)),
        }
    }

    fn run(&mut self, argv: &[String], trace_id: Option<TraceId>, output: &mut String) -> Result<()> {
        let started = Instant::now();
        let mut request = RequestContext::new(InvocationOrigin::Daemon);
        if let Some(trace_id) = trace_id {
            request = request.with_trace_id(trace_id);
        }
        log_op_start!(
            OP_SERVER_RUN,
            words = argv.len(),
            request_id = request.request_id.as_str(),
            trace_id = request.trace_id.as_ref().map(TraceId::as_str).unwrap_or("-")
        );
        let (args, commands) = parse_forwarded(argv)?;
        let mut invocation = args.invocation(request)?;
        run_batch_with_output(
            self.conn.as_mut(),
            &self.catalogue,
            &mut invocation,
            &commands,
            |text| {
                *output = text;
                Ok(())
            },
        )?;
        log_op_end!(
            OP_SERVER_RUN,
            duration_ms = started.elapsed().as_millis() as u64,
            request_id = invocation.request.request_id.as_str()
        );
        Ok(())
    }

    fn cleanup(&self) {
        for path in std::iter::once(&self.socket).chain(self.pidfile.as_ref()) {
            if let Err(e) = std::fs::remove_file(path) {
                debug!(path = %path.display(), error = %e, "could not remove file");
            }
        }
    }
}

/// Start a daemon in the background and return the socket path it printed
///
/// `server_args` are the global options the daemon should run with; the
/// child is this same binary with `--server` added.
///
/// # Errors
///
/// The binary cannot be spawned, or the child exits before announcing its
/// socket.
pub fn detach(server_args: &[String]) -> Result<String> {
    let exe = std::env::current_exe()?;
    let mut child = Command::new(exe)
        .arg("--server")
        .args(server_args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()?;

    let stdout = child.stdout.take().ok_or_else(|| CtlError::Internal {
        message: "daemon stdout was not captured".to_string(),
    })?;
    let mut line = String::new();
    BufReader::new(stdout).read_line(&mut line)?;
    let socket = line.trim_end().to_string();
    if socket.is_empty() {
        let status = child.wait()?;
        return Err(CtlError::Ipc {
            message: format!("daemon failed to start ({})", status),
        }
        .into());
    }
    info!(pid = child.id(), socket = %socket, "daemon started");
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfgctl_store::{MemoryStore, Schema};
    use std::sync::Arc;

    fn daemon() -> (MemoryStore, Daemon) {
        let store = MemoryStore::new(Arc::new(Schema::default_schema().unwrap()));
        let mut conn = store.connect();
        conn.run();
        let daemon = Daemon::new(Box::new(conn), PathBuf::from("unused.ctl"), None);
        (store, daemon)
    }

    fn run_request(daemon: &mut Daemon, id: u64, words: &[&str]) -> Response {
        daemon.handle_request(Request::new(
            id,
            METHOD_RUN,
            words.iter().map(|s| s.to_string()).collect(),
        ))
    }

    #[test]
    fn test_dry_run_does_not_leak_into_next_request() {
        let (store, mut daemon) = daemon();

        let first = run_request(&mut daemon, 1, &["--dry-run", "create", "Switch", "name=sw0"]);
        assert!(first.error.is_none(), "{:?}", first.error);
        let second = run_request(&mut daemon, 2, &["create", "Switch", "name=sw1"]);
        assert!(second.error.is_none(), "{:?}", second.error);

        let snapshot = store.current().unwrap();
        let names: Vec<String> = snapshot
            .table_rows("Switch")
            .map(|rows| {
                rows.values()
                    .filter_map(|r| r.data.get("name").and_then(|d| d.as_str()).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        assert_eq!(names, vec!["sw1".to_string()]);
    }

    #[test]
    fn test_errors_become_error_replies() {
        let (_store, mut daemon) = daemon();
        let response = run_request(&mut daemon, 3, &["frobnicate"]);
        assert_eq!(response.id, 3);
        assert_eq!(
            response.error.as_deref(),
            Some("unknown command 'frobnicate'; use --help for help")
        );
        let response = run_request(&mut daemon, 4, &["--timeout=abc", "list", "Switch"]);
        assert_eq!(
            response.error.as_deref(),
            Some("value abc on -t or --timeout is invalid")
        );
    }

    #[test]
    fn test_wait_timeout_reply_keeps_output() {
        let (store, mut daemon) = daemon();
        let seeded = run_request(&mut daemon, 5, &["create", "Global", "cfg=1", "dist_cfg=1"]);
        assert!(seeded.error.is_none(), "{:?}", seeded.error);

        let response = run_request(
            &mut daemon,
            6,
            &["--wait=dist", "--timeout=1", "create", "Switch", "name=sw0"],
        );

        assert_eq!(response.error.as_deref(), Some("timeout expired"));
        let snapshot = store.current().unwrap();
        let uuid = snapshot
            .table_rows("Switch")
            .and_then(|rows| rows.keys().next().copied())
            .unwrap();
        assert_eq!(response.result, Some(format!("{}\n", uuid)));
    }

    #[test]
    fn test_exit_sets_shutdown() {
        let (_store, mut daemon) = daemon();
        let response = daemon.handle_request(Request::new(9, METHOD_EXIT, Vec::new()));
        assert_eq!(response.result.as_deref(), Some(""));
        assert!(daemon.shutdown);

        let response = daemon.handle_request(Request::new(10, "reload", Vec::new()));
        assert_eq!(response.error.as_deref(), Some("unknown method \"reload\""));
    }

    #[test]
    fn test_idle_client_is_dropped() {
        let (_store, mut daemon) = daemon();
        let (server_side, _idle_peer) = UnixStream::pair().unwrap();

        let started = Instant::now();
        daemon.handle_client(server_side).unwrap();

        assert!(started.elapsed() >= CLIENT_IDLE_TIMEOUT);
        assert!(!daemon.shutdown);
    }

    #[test]
    fn test_client_requests_are_answered_in_order() {
        let (_store, mut daemon) = daemon();
        let (server_side, mut peer) = UnixStream::pair().unwrap();
        let words = ["--dry-run", "create", "Switch", "name=sw9"];
        let run = Request::new(1, METHOD_RUN, words.iter().map(|s| s.to_string()).collect());
        write_message(&mut peer, &run).unwrap();
        write_message(&mut peer, &Request::new(2, METHOD_EXIT, Vec::new())).unwrap();

        daemon.handle_client(server_side).unwrap();

        let mut reader = BufReader::new(peer);
        let first: Response = crate::ipc::read_message(&mut reader).unwrap().unwrap();
        let second: Response = crate::ipc::read_message(&mut reader).unwrap().unwrap();
        assert_eq!((first.id, second.id), (1, 2));
        assert!(first.error.is_none(), "{:?}", first.error);
        assert!(daemon.shutdown);
    }
}
