use cfgctl_core_types::RequestId;
use thiserror::Error;

/// Result type alias used by every cfgctl crate
pub type Result<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that tests and the daemon's error
/// replies can rely on, and to one of the coarse [`ErrorClass`] buckets that
/// decide how an invocation ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Parsing/Validation
    InvalidInput,
    UnknownCommand,
    UnknownTable,
    UnknownColumn,

    // Handler failures
    NotFound,
    AlreadyExists,
    Ambiguous,
    ConstraintViolation,
    SymbolUnresolved,

    // Commit
    CommitFailed,
    NotLocked,

    // Waiting
    Timeout,

    // Integration/IO
    ConnectionFailed,
    Ipc,
    Io,
    Persistence,
    Serialization,

    // Internal
    Internal,
}

/// How an error ends an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rejected before any handler ran
    Validation,
    /// Raised by a command body; the attempt is discarded
    Handler,
    /// The store refused the commit
    Commit,
    /// A deadline expired while waiting
    Timeout,
    /// The database, socket or filesystem failed underneath us
    Environment,
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::UnknownCommand => "ERR_UNKNOWN_COMMAND",
            ExErrorKind::UnknownTable => "ERR_UNKNOWN_TABLE",
            ExErrorKind::UnknownColumn => "ERR_UNKNOWN_COLUMN",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::AlreadyExists => "ERR_ALREADY_EXISTS",
            ExErrorKind::Ambiguous => "ERR_AMBIGUOUS",
            ExErrorKind::ConstraintViolation => "ERR_CONSTRAINT_VIOLATION",
            ExErrorKind::SymbolUnresolved => "ERR_SYMBOL_UNRESOLVED",
            ExErrorKind::CommitFailed => "ERR_COMMIT_FAILED",
            ExErrorKind::NotLocked => "ERR_NOT_LOCKED",
            ExErrorKind::Timeout => "ERR_TIMEOUT",
            ExErrorKind::ConnectionFailed => "ERR_CONNECTION_FAILED",
            ExErrorKind::Ipc => "ERR_IPC",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Map the kind onto its error class
    pub fn class(&self) -> ErrorClass {
        match self {
            ExErrorKind::InvalidInput
            | ExErrorKind::UnknownCommand
            | ExErrorKind::UnknownTable
            | ExErrorKind::UnknownColumn => ErrorClass::Validation,
            ExErrorKind::NotFound
            | ExErrorKind::AlreadyExists
            | ExErrorKind::Ambiguous
            | ExErrorKind::ConstraintViolation
            | ExErrorKind::SymbolUnresolved => ErrorClass::Handler,
            ExErrorKind::CommitFailed | ExErrorKind::NotLocked => ErrorClass::Commit,
            ExErrorKind::Timeout => ErrorClass::Timeout,
            ExErrorKind::ConnectionFailed
            | ExErrorKind::Ipc
            | ExErrorKind::Io
            | ExErrorKind::Persistence
            | ExErrorKind::Serialization => ErrorClass::Environment,
            ExErrorKind::Internal => ErrorClass::Internal,
        }
    }
}

/// Canonical structured error type
///
/// `message` is the text a user sees (`cfgctl: <message>`); the remaining
/// fields are context for logs and tests.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    table: Option<String>,
    record: Option<String>,
    request_id: Option<RequestId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            table: None,
            record: None,
            request_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add table context
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Add record context (uuid, symbol or index value)
    pub fn with_record(mut self, record: impl Into<String>) -> Self {
        self.record = Some(record.into());
        self
    }

    /// Add request ID context
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the error class
    pub fn class(&self) -> ErrorClass {
        self.kind.class()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn record(&self) -> Option<&str> {
        self.record.as_deref()
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Get the user-facing message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(table) = &self.table {
            write!(f, " (table: {})", table)?;
        }
        if let Some(record) = &self.record {
            write!(f, " (record: {})", record)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// User-facing failures of a cfgctl invocation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CtlError {
    // ===== Batch parsing =====
    #[error("missing command name (use --help for help)")]
    MissingCommandName,

    #[error("unknown command '{name}'; use --help for help")]
    UnknownCommand { name: String },

    #[error("'{command}' command has no '{option}' option")]
    UnknownOption { command: String, option: String },

    #[error("'{option}' option on '{command}' does not accept an argument")]
    OptionTakesNoArgument { command: String, option: String },

    #[error("missing argument to '{option}' option on '{command}' command")]
    OptionRequiresArgument { command: String, option: String },

    #[error("'{option}' option specified multiple times")]
    DuplicateOption { option: String },

    #[error("'{command}' command requires at least {min} arguments")]
    TooFewArguments { command: String, min: usize },

    #[error("'{command}' command takes at most {max} arguments")]
    TooManyArguments { command: String, max: usize },

    // ===== Invocation options =====
    #[error("value {value} on -t or --timeout is invalid")]
    InvalidTimeout { value: String },

    #[error("argument to --wait must be \"none\", \"dist\", or \"fleet\"")]
    InvalidWaitType { value: String },

    #[error("unknown output format \"{value}\"")]
    InvalidFormat { value: String },

    // ===== Schema lookups =====
    #[error("unknown table \"{name}\"")]
    UnknownTable { name: String },

    #[error("{table} does not contain a column whose name matches \"{column}\"")]
    UnknownColumn { table: String, column: String },

    #[error("{column}: {reason}")]
    InvalidValue { column: String, reason: String },

    #[error("cannot specify key to set for non-map column {column}")]
    KeyOnNonMap { column: String },

    #[error("\"{column}\" column in {table} may hold at most {max} values")]
    TooManyValues {
        table: String,
        column: String,
        max: usize,
    },

    // ===== Records =====
    #[error("no row \"{record}\" in table {table}")]
    RecordNotFound { table: String, record: String },

    #[error("multiple rows in {table} match \"{record}\"")]
    AmbiguousRecord { table: String, record: String },

    #[error("\".\" is only valid for tables with exactly one row, and {table} has {count}")]
    NotSingleton { table: String, count: usize },

    #[error("cannot destroy rows of {table} because it is not a root table")]
    NotRootTable { table: String },

    #[error("--all and records argument should not be specified together")]
    AllWithRecords,

    // ===== Symbols =====
    #[error("row id \"{name}\" does not begin with \"@\"")]
    InvalidSymbolName { name: String },

    #[error("row id \"{name}\" may only be specified on one --id option")]
    SymbolAlreadyCreated { name: String },

    #[error("row id \"{name}\" is referenced but never created (e.g. with \"-- --id={name} create ...\")")]
    SymbolNeverCreated { name: String },

    // ===== Commit =====
    #[error("transaction aborted")]
    TransactionAborted,

    #[error("transaction error: {message}")]
    TransactionError { message: String },

    #[error("database not locked")]
    NotLocked,

    #[error("timeout expired")]
    TimeoutExpired,

    // ===== Environment =====
    #[error("{target}: database connection failed ({reason})")]
    ConnectionFailed { target: String, reason: String },

    #[error("{socket}: could not connect to cfgctl daemon ({reason}); {hint}")]
    DaemonUnreachable {
        socket: String,
        reason: String,
        hint: String,
    },

    #[error("{message}")]
    Ipc { message: String },

    #[error("{message}")]
    Io { message: String },

    #[error("{message}")]
    Serialization { message: String },

    #[error("{message}")]
    Internal { message: String },
}

/// Convert the domain error into the structured facility error
impl From<CtlError> for ExError {
    fn from(err: CtlError) -> Self {
        let message = err.to_string();
        let base = match &err {
            CtlError::MissingCommandName
            | CtlError::UnknownOption { .. }
            | CtlError::OptionTakesNoArgument { .. }
            | CtlError::OptionRequiresArgument { .. }
            | CtlError::DuplicateOption { .. }
            | CtlError::TooFewArguments { .. }
            | CtlError::TooManyArguments { .. }
            | CtlError::InvalidTimeout { .. }
            | CtlError::InvalidWaitType { .. }
            | CtlError::InvalidFormat { .. }
            | CtlError::InvalidValue { .. }
            | CtlError::KeyOnNonMap { .. }
            | CtlError::InvalidSymbolName { .. }
            | CtlError::AllWithRecords => ExError::new(ExErrorKind::InvalidInput),

            CtlError::UnknownCommand { name } => {
                ExError::new(ExErrorKind::UnknownCommand).with_op(name.clone())
            }

            CtlError::UnknownTable { name } => {
                ExError::new(ExErrorKind::UnknownTable).with_table(name.clone())
            }

            CtlError::UnknownColumn { table, .. } => {
                ExError::new(ExErrorKind::UnknownColumn).with_table(table.clone())
            }

            CtlError::TooManyValues { table, .. } | CtlError::NotRootTable { table } => {
                ExError::new(ExErrorKind::ConstraintViolation).with_table(table.clone())
            }

            CtlError::RecordNotFound { table, record } => ExError::new(ExErrorKind::NotFound)
                .with_table(table.clone())
                .with_record(record.clone()),

            CtlError::AmbiguousRecord { table, record } => ExError::new(ExErrorKind::Ambiguous)
                .with_table(table.clone())
                .with_record(record.clone()),

            CtlError::NotSingleton { table, .. } => {
                ExError::new(ExErrorKind::Ambiguous).with_table(table.clone())
            }

            CtlError::SymbolAlreadyCreated { name } => {
                ExError::new(ExErrorKind::AlreadyExists).with_record(name.clone())
            }

            CtlError::SymbolNeverCreated { name } => {
                ExError::new(ExErrorKind::SymbolUnresolved).with_record(name.clone())
            }

            CtlError::TransactionAborted | CtlError::TransactionError { .. } => {
                ExError::new(ExErrorKind::CommitFailed).with_op("commit")
            }

            CtlError::NotLocked => ExError::new(ExErrorKind::NotLocked).with_op("commit"),

            CtlError::TimeoutExpired => ExError::new(ExErrorKind::Timeout),

            CtlError::ConnectionFailed { .. } | CtlError::DaemonUnreachable { .. } => {
                ExError::new(ExErrorKind::ConnectionFailed)
            }

            CtlError::Ipc { .. } => ExError::new(ExErrorKind::Ipc),
            CtlError::Io { .. } => ExError::new(ExErrorKind::Io),
            CtlError::Serialization { .. } => ExError::new(ExErrorKind::Serialization),
            CtlError::Internal { .. } => ExError::new(ExErrorKind::Internal),
        };
        base.with_message(message)
    }
}

/// Conversion from serde_json::Error to CtlError
impl From<serde_json::Error> for CtlError {
    fn from(err: serde_json::Error) -> Self {
        CtlError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ExError {
    fn from(err: serde_json::Error) -> Self {
        CtlError::from(err).into()
    }
}

impl From<std::io::Error> for ExError {
    fn from(err: std::io::Error) -> Self {
        CtlError::Io {
            message: err.to_string(),
        }
        .into()
    }
}
