//! The connection abstraction the engine drives
//!
//! A connection keeps a local replica of the database (the latest
//! [`Snapshot`] it has seen) and commits transactions against the live
//! store. All calls are blocking; nothing runs in the background.

use crate::memory::MemoryStore;
use crate::schema::Schema;
use crate::snapshot::Snapshot;
use crate::sqlite::SqliteConnection;
use crate::transaction::{CommitStatus, Transaction};
use cfgctl_core::errors::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often backends without change notification look for new commits
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Target name that selects an in-process store
pub const MEMORY_TARGET: &str = "memory:";

pub trait Connection {
    /// What this connection talks to, for messages
    fn target(&self) -> &str;

    /// Process pending work: pick up any commit made since the last call
    ///
    /// Failures are recorded (see [`Connection::is_alive`]) rather than
    /// returned.
    fn run(&mut self);

    fn is_alive(&self) -> bool;

    /// Why the connection died, if it did
    fn last_error(&self) -> Option<String>;

    /// Whether the replica has been filled from the store at least once
    fn has_ever_connected(&self) -> bool;

    /// Sequence number of the local replica; 0 before the first sync
    fn seqno(&self) -> u64 {
        self.snapshot().seqno()
    }

    fn snapshot(&self) -> Arc<Snapshot>;

    fn schema(&self) -> Arc<Schema>;

    /// Commit `txn`, blocking until the store answers
    ///
    /// Also records the status on the transaction. On a durable `Success`
    /// the replica moves to the committed state.
    fn commit_block(&mut self, txn: &mut Transaction) -> CommitStatus;

    /// Block until the store may have changed, a poll tick passes, or
    /// `deadline` is reached
    fn wait(&mut self, deadline: Option<Instant>);
}

/// Time left before `deadline`, capped at `cap`
pub fn wait_budget(deadline: Option<Instant>, cap: Duration) -> Duration {
    match deadline {
        Some(d) => d.saturating_duration_since(Instant::now()).min(cap),
        None => cap,
    }
}

/// Open a connection to `target`: `memory:` or a SQLite file path
///
/// # Errors
///
/// The database cannot be opened or migrated.
pub fn connect(target: &str, schema: Arc<Schema>) -> Result<Box<dyn Connection + Send>> {
    if target == MEMORY_TARGET {
        return Ok(Box::new(MemoryStore::new(schema).connect()));
    }
    Ok(Box::new(SqliteConnection::open(target, schema)?))
}
