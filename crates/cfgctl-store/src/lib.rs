//! cfgctl Store - versioned configuration database
//!
//! Provides:
//! - JSON schemas with typed, optionally referencing columns
//! - Snapshots with per-row and per-table versions
//! - Transactions with optimistic concurrency control
//! - A commit planner shared by the SQLite and in-memory backends
//! - SQLite migrations with checksums

pub mod connection;
pub mod datum;
pub mod db;
pub mod errors;
pub mod memory;
pub mod migrations;
pub mod planner;
pub mod schema;
pub mod snapshot;
pub mod sqlite;
pub mod transaction;

// Re-export key types
pub use connection::{connect, Connection, MEMORY_TARGET, POLL_INTERVAL};
pub use datum::{Atom, Datum};
pub use errors::Result;
pub use memory::{MemoryConnection, MemoryStore};
pub use schema::{AtomType, ColumnKind, ColumnSchema, RefStrength, Schema, TableSchema};
pub use snapshot::{Row, RowRecord, Snapshot};
pub use sqlite::{CommitRecord, SqliteConnection};
pub use transaction::{CommitStatus, Transaction};
