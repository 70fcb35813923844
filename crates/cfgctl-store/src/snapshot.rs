//! Point-in-time views of the database

use crate::datum::Datum;
use crate::schema::Schema;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Column values of one row, keyed by column name
pub type Row = BTreeMap<String, Datum>;

#[derive(Debug, Clone, PartialEq)]
pub struct RowRecord {
    pub uuid: Uuid,
    /// Sequence number of the commit that last changed the row
    pub version: u64,
    pub data: Row,
}

pub type TableRows = BTreeMap<Uuid, RowRecord>;

/// Read-only database contents at one sequence number
#[derive(Debug, Clone)]
pub struct Snapshot {
    seqno: u64,
    schema: Arc<Schema>,
    tables: BTreeMap<String, TableRows>,
    /// Sequence number of the last insert or delete per table
    table_versions: BTreeMap<String, u64>,
}

impl Snapshot {
    /// An empty database at `seqno`
    pub fn empty(schema: Arc<Schema>, seqno: u64) -> Self {
        let tables = schema
            .tables
            .keys()
            .map(|name| (name.clone(), TableRows::new()))
            .collect();
        Self {
            seqno,
            schema,
            tables,
            table_versions: BTreeMap::new(),
        }
    }

    pub fn from_parts(
        schema: Arc<Schema>,
        seqno: u64,
        tables: BTreeMap<String, TableRows>,
        table_versions: BTreeMap<String, u64>,
    ) -> Self {
        let mut snapshot = Self::empty(schema, seqno);
        snapshot.tables.extend(tables);
        snapshot.table_versions = table_versions;
        snapshot
    }

    pub fn seqno(&self) -> u64 {
        self.seqno
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn tables(&self) -> &BTreeMap<String, TableRows> {
        &self.tables
    }

    pub fn table_rows(&self, table: &str) -> Option<&TableRows> {
        self.tables.get(table)
    }

    pub fn row(&self, table: &str, uuid: &Uuid) -> Option<&RowRecord> {
        self.tables.get(table).and_then(|rows| rows.get(uuid))
    }

    pub fn row_version(&self, table: &str, uuid: &Uuid) -> Option<u64> {
        self.row(table, uuid).map(|r| r.version)
    }

    pub fn table_version(&self, table: &str) -> u64 {
        self.table_versions.get(table).copied().unwrap_or(0)
    }

    pub fn table_versions(&self) -> &BTreeMap<String, u64> {
        &self.table_versions
    }

    /// Value of an integer column in the only row of a singleton table
    pub fn singleton_integer(&self, table: &str, column: &str) -> Option<i64> {
        let rows = self.tables.get(table)?;
        if rows.len() != 1 {
            return None;
        }
        rows.values()
            .next()
            .and_then(|r| r.data.get(column))
            .and_then(Datum::as_integer)
    }

    pub fn row_count(&self) -> usize {
        self.tables.values().map(BTreeMap::len).sum()
    }
}
