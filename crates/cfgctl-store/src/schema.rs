//! Database schema
//!
//! A schema names the tables, their columns and column types, and which
//! table holds the generation counters. Schemas are JSON documents; the
//! default one is compiled into the binary.

use crate::errors::{schema_error, Result};
use cfgctl_core::errors::CtlError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const DEFAULT_SCHEMA: &str = include_str!("../schema/default.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefStrength {
    #[default]
    Strong,
    Weak,
}

/// Type of a single value in a column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AtomType {
    Integer,
    Boolean,
    String,
    Uuid {
        #[serde(rename = "refTable")]
        ref_table: String,
        #[serde(rename = "refType", default)]
        strength: RefStrength,
    },
}

impl AtomType {
    pub fn reference(&self) -> Option<(&str, RefStrength)> {
        match self {
            AtomType::Uuid {
                ref_table,
                strength,
            } => Some((ref_table.as_str(), *strength)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    #[default]
    Scalar,
    Set,
    /// String keys to string values
    Map,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    #[serde(skip)]
    pub name: String,
    #[serde(rename = "type")]
    pub atom: AtomType,
    #[serde(default)]
    pub kind: ColumnKind,
    /// Upper bound on set size
    #[serde(default)]
    pub max: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(skip)]
    pub name: String,
    #[serde(rename = "isRoot", default)]
    pub is_root: bool,
    #[serde(rename = "maxRows", default)]
    pub max_rows: Option<usize>,
    /// Column whose value names a record on the command line
    #[serde(default)]
    pub index: Option<String>,
    pub columns: BTreeMap<String, ColumnSchema>,
}

impl TableSchema {
    /// Look up a column by exact name, then case-insensitively
    ///
    /// # Errors
    ///
    /// Unknown column names are a validation error.
    pub fn column(&self, name: &str) -> Result<&ColumnSchema> {
        self.columns
            .get(name)
            .or_else(|| {
                self.columns
                    .values()
                    .find(|c| c.name.eq_ignore_ascii_case(name))
            })
            .ok_or_else(|| {
                CtlError::UnknownColumn {
                    table: self.name.clone(),
                    column: name.to_string(),
                }
                .into()
            })
    }

    pub fn is_singleton(&self) -> bool {
        self.max_rows == Some(1)
    }
}

/// Where the generation counters live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationColumns {
    pub table: String,
    /// Bumped by writers that want to wait
    pub target: String,
    /// Copied forward once the distribution tier has the change
    pub dist: String,
    /// Copied forward once every fleet member has applied the change
    pub fleet: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    pub version: String,
    pub generation: GenerationColumns,
    pub tables: BTreeMap<String, TableSchema>,
}

impl Schema {
    /// The schema compiled into the binary
    ///
    /// # Errors
    ///
    /// Only fails if the embedded document is broken.
    pub fn default_schema() -> Result<Self> {
        Self::from_json(DEFAULT_SCHEMA)
    }

    /// Parse and check a JSON schema document
    ///
    /// # Errors
    ///
    /// Malformed JSON or an inconsistent schema.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut schema: Schema =
            serde_json::from_str(text).map_err(|e| schema_error(&e.to_string()))?;
        for (table_name, table) in schema.tables.iter_mut() {
            table.name = table_name.clone();
            for (column_name, column) in table.columns.iter_mut() {
                column.name = column_name.clone();
            }
        }
        schema.check()?;
        Ok(schema)
    }

    /// Read a schema file
    ///
    /// # Errors
    ///
    /// IO failures or an invalid document.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| crate::errors::io_error("read_schema", e))?;
        Self::from_json(&text)
    }

    /// Look up a table by exact name, then case-insensitively
    ///
    /// # Errors
    ///
    /// Unknown table names are a validation error.
    pub fn table(&self, name: &str) -> Result<&TableSchema> {
        self.tables
            .get(name)
            .or_else(|| {
                self.tables
                    .values()
                    .find(|t| t.name.eq_ignore_ascii_case(name))
            })
            .ok_or_else(|| {
                CtlError::UnknownTable {
                    name: name.to_string(),
                }
                .into()
            })
    }

    fn check(&self) -> Result<()> {
        for table in self.tables.values() {
            if let Some(index) = &table.index {
                match table.columns.get(index) {
                    Some(c) if c.atom == AtomType::String && c.kind == ColumnKind::Scalar => {}
                    _ => {
                        return Err(schema_error(&format!(
                            "index of table {} must be a scalar string column",
                            table.name
                        )))
                    }
                }
            }
            for column in table.columns.values() {
                if column.name.starts_with('_') {
                    return Err(schema_error(&format!(
                        "column {}.{} uses a reserved name",
                        table.name, column.name
                    )));
                }
                if let Some((ref_table, _)) = column.atom.reference() {
                    if !self.tables.contains_key(ref_table) {
                        return Err(schema_error(&format!(
                            "column {}.{} refers to unknown table {}",
                            table.name, column.name, ref_table
                        )));
                    }
                    if column.kind != ColumnKind::Set {
                        return Err(schema_error(&format!(
                            "reference column {}.{} must be a set",
                            table.name, column.name
                        )));
                    }
                }
                if column.kind == ColumnKind::Map && column.atom != AtomType::String {
                    return Err(schema_error(&format!(
                        "map column {}.{} must have string values",
                        table.name, column.name
                    )));
                }
            }
        }

        let generation = &self.generation;
        let table = self.tables.get(&generation.table).ok_or_else(|| {
            schema_error(&format!(
                "generation table {} is not defined",
                generation.table
            ))
        })?;
        if !table.is_singleton() {
            return Err(schema_error(&format!(
                "generation table {} must have maxRows 1",
                generation.table
            )));
        }
        for counter in [&generation.target, &generation.dist, &generation.fleet] {
            match table.columns.get(counter) {
                Some(c) if c.atom == AtomType::Integer && c.kind == ColumnKind::Scalar => {}
                _ => {
                    return Err(schema_error(&format!(
                        "generation counter {}.{} must be a scalar integer",
                        generation.table, counter
                    )))
                }
            }
        }
        Ok(())
    }
}
