//! Store-side constructors for [`ExError`]
//!
//! Everything the store returns is an `ExError`; these helpers keep the op
//! names and messages for storage failures in one place.

use cfgctl_core::errors::{ExError, ExErrorKind};

pub type Result<T> = std::result::Result<T, ExError>;

pub fn migration_error(migration_id: &str, reason: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("migrate")
        .with_message(format!("migration {} failed: {}", migration_id, reason))
}

/// The file was migrated by a binary with different storage SQL
pub fn checksum_mismatch(migration_id: &str, recorded: &str, embedded: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("migrate")
        .with_message(format!(
            "migration {} checksum mismatch: database has {}, binary has {}",
            migration_id, recorded, embedded
        ))
}

pub fn schema_error(reason: &str) -> ExError {
    ExError::new(ExErrorKind::InvalidInput)
        .with_op("schema")
        .with_message(format!("invalid schema: {}", reason))
}

/// A stored row that no longer decodes
pub fn corrupt_row(table: &str, uuid: &str, reason: &str) -> ExError {
    ExError::new(ExErrorKind::Serialization)
        .with_op("load_row")
        .with_table(table)
        .with_record(uuid)
        .with_message(format!("cannot decode row {} of {}: {}", uuid, table, reason))
}

pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("sqlite")
        .with_message(err.to_string())
}

pub fn io_error(operation: &str, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op(operation.to_string())
        .with_message(err.to_string())
}
