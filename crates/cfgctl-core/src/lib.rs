//! cfgctl Core - invocation-scoped building blocks
//!
//! This crate provides what every other cfgctl crate shares:
//! - The error facility (`CtlError`, `ExError`, `ExErrorKind`)
//! - The logging facility (profiles, canonical macros, test capture)
//! - The forward-reference symbol table used by one transaction attempt
//! - The per-invocation context (output mode, dry-run, waiting, timeout)
//! - Result tables and per-command output rendering

pub mod context;
pub mod errors;
pub mod logging_facility;
pub mod output;
pub mod symtab;
pub mod table;

// Re-export commonly used types
pub use context::{parse_timeout, InvocationContext, WaitSpec, WaitType};
pub use errors::{CtlError, ErrorClass, ExError, ExErrorKind, Result};
pub use output::{escape_oneline, render_command};
pub use symtab::{Reachability, SymbolId, SymbolState, SymbolTable, SymbolWarning};
pub use table::{Table, TableFormat, TableStyle};
