//! In-process store
//!
//! Several [`MemoryConnection`]s can share one [`MemoryStore`]; commits wake
//! waiting connections through a condition variable. Used for tests and the
//! `memory:` target.

use crate::connection::{wait_budget, Connection, MEMORY_TARGET, POLL_INTERVAL};
use crate::planner::plan_commit;
use crate::schema::Schema;
use crate::snapshot::Snapshot;
use crate::transaction::{CommitStatus, Transaction};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;
use tracing::debug;

struct Shared {
    state: Mutex<Arc<Snapshot>>,
    changed: Condvar,
    closed: AtomicBool,
}

#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    schema: Arc<Schema>,
}

impl MemoryStore {
    /// An empty store at sequence number 1
    pub fn new(schema: Arc<Schema>) -> Self {
        let initial = Arc::new(Snapshot::empty(schema.clone(), 1));
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(initial),
                changed: Condvar::new(),
                closed: AtomicBool::new(false),
            }),
            schema,
        }
    }

    pub fn connect(&self) -> MemoryConnection {
        MemoryConnection {
            store: self.clone(),
            replica: Arc::new(Snapshot::empty(self.schema.clone(), 0)),
            synced: false,
            alive: true,
            last_error: None,
        }
    }

    /// Latest committed contents
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.shared.state.lock().ok().map(|s| s.clone())
    }

    /// Make every connection to this store fail
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.changed.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

pub struct MemoryConnection {
    store: MemoryStore,
    replica: Arc<Snapshot>,
    synced: bool,
    alive: bool,
    last_error: Option<String>,
}

impl MemoryConnection {
    fn fail(&mut self, reason: &str) {
        self.alive = false;
        self.last_error = Some(reason.to_string());
    }
}

impl Connection for MemoryConnection {
    fn target(&self) -> &str {
        MEMORY_TARGET
    }

    fn run(&mut self) {
        if !self.alive {
            return;
        }
        if self.store.is_closed() {
            self.fail("connection closed");
            return;
        }
        match self.store.current() {
            Some(current) => {
                self.replica = current;
                self.synced = true;
            }
            None => self.fail("store lock poisoned"),
        }
    }

    fn is_alive(&self) -> bool {
        self.alive
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }

    fn has_ever_connected(&self) -> bool {
        self.synced
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.replica.clone()
    }

    fn schema(&self) -> Arc<Schema> {
        self.store.schema.clone()
    }

    fn commit_block(&mut self, txn: &mut Transaction) -> CommitStatus {
        if self.store.is_closed() {
            self.fail("connection closed");
        }
        if !self.alive {
            let status = CommitStatus::Error(
                self.last_error
                    .clone()
                    .unwrap_or_else(|| "connection closed".to_string()),
            );
            txn.finish(status.clone(), None);
            return status;
        }

        let shared = self.store.shared.clone();
        let Ok(mut state) = shared.state.lock() else {
            self.fail("store lock poisoned");
            let status = CommitStatus::Error("store lock poisoned".to_string());
            txn.finish(status.clone(), None);
            return status;
        };
        let plan = plan_commit(&state, txn);
        if let Some(next) = plan.next {
            let next = Arc::new(next);
            *state = next.clone();
            self.replica = next;
            shared.changed.notify_all();
        }
        debug!(status = %plan.status, seqno = state.seqno(), "memory commit");
        txn.finish(plan.status.clone(), plan.increment_new_value);
        plan.status
    }

    fn wait(&mut self, deadline: Option<Instant>) {
        let budget = wait_budget(deadline, POLL_INTERVAL);
        let seen = self.replica.seqno();
        let shared = self.store.shared.clone();
        let Ok(state) = shared.state.lock() else {
            self.fail("store lock poisoned");
            return;
        };
        if shared
            .changed
            .wait_timeout_while(state, budget, |s| {
                s.seqno() == seen && !shared.closed.load(Ordering::SeqCst)
            })
            .is_err()
        {
            self.fail("store lock poisoned");
        }
    }
}
