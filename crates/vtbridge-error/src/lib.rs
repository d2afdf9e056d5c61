use thiserror::Error;

/// Primary error type for virtual-table bridge operations.
///
/// Every error raised by a table, cursor or module implementation is carried
/// as one of these variants until it reaches the host boundary, where it is
/// flattened into an [`ErrorCode`] plus message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VtabError {
    // === Registration Errors ===
    /// No module is registered under this name.
    #[error("no such module: {name}")]
    NoSuchModule { name: String },

    /// A module with this name is already registered on the connection.
    #[error("module {name} already exists")]
    ModuleExists { name: String },

    /// The column list returned by `declaration_schema()` is not usable.
    #[error("vtable constructor failed: {detail}")]
    InvalidDeclaration { detail: String },

    // === Negotiation Errors ===
    /// The table declared the proposed constraint set unsatisfiable.
    #[error("no query solution")]
    NoQuerySolution,

    /// A plan id handed to `filter` is no longer cached by the table.
    #[error("query plan {plan} is no longer cached")]
    StalePlan { plan: i32 },

    /// `filter` was called with a different number of arguments than the
    /// chosen index consumes.
    #[error("filter expects {expected} arguments, got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    // === Handle Errors ===
    /// A host handle does not name a live object.
    #[error("invalid {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u64 },

    /// The table behind a cursor has already been released.
    #[error("virtual table {name} is no longer available")]
    TableGone { name: String },

    /// Too many cursors are open on the bridge.
    #[error("too many open cursors (max {max})")]
    TooManyCursors { max: usize },

    // === Row Production ===
    /// A cursor failed to advance.
    #[error("cursor failed to produce a row: {detail}")]
    RowProduction { detail: String },

    /// Column index is outside the declared column range.
    #[error("column index {index} out of range")]
    ColumnRange { index: i32 },

    // === Mutation Errors ===
    /// Attempt to write a read-only virtual table.
    #[error("attempt to write a readonly database")]
    ReadOnly,

    /// PRIMARY KEY constraint violation.
    #[error("PRIMARY KEY constraint failed: {key}")]
    PrimaryKeyViolation { key: String },

    /// NOT NULL constraint violation.
    #[error("NOT NULL constraint failed: {column}")]
    NotNullViolation { column: String },

    /// No row with the given key exists.
    #[error("no row with key {key}")]
    NoSuchRow { key: String },

    /// Value cannot be used where it was supplied.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Domain error raised by a table implementation; displayed verbatim.
    #[error("{0}")]
    Domain(String),

    // === Internal Errors ===
    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),

    /// Library used incorrectly.
    #[error("bad parameter or other API misuse: {0}")]
    Misuse(String),

    /// Operation is not supported by this table kind.
    #[error("unsupported operation")]
    Unsupported,

    /// Feature not yet implemented.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Callback requested the statement be aborted.
    #[error("callback requested query abort")]
    Abort,
}

/// Host result codes.
///
/// These match the numeric values the host engine uses on its callback
/// boundary, so a code can be handed back without translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// Successful result.
    Ok = 0,
    /// Generic error.
    Error = 1,
    /// Internal logic error.
    Internal = 2,
    /// Access permission denied.
    Perm = 3,
    /// Callback requested abort.
    Abort = 4,
    /// Database file is locked.
    Busy = 5,
    /// Out of memory.
    NoMem = 7,
    /// Attempt to write a read-only database.
    ReadOnly = 8,
    /// Not found (internal).
    NotFound = 12,
    /// Database schema has changed; the statement must be re-planned.
    Schema = 17,
    /// Constraint violation.
    Constraint = 19,
    /// Data type mismatch.
    Mismatch = 20,
    /// Library used incorrectly.
    Misuse = 21,
    /// OS feature not available.
    NoLfs = 22,
    /// Bind parameter or column out of range.
    Range = 25,
    /// A row is ready.
    Row = 100,
    /// Execution has finished.
    Done = 101,
}

impl ErrorCode {
    /// Whether this code reports success.
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::Row | Self::Done)
    }
}

impl VtabError {
    /// Map this error to the host's result code.
    #[allow(clippy::match_same_arms)]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NoSuchModule { .. }
            | Self::ModuleExists { .. }
            | Self::InvalidDeclaration { .. }
            | Self::RowProduction { .. }
            | Self::Domain(_)
            | Self::NotImplemented(_) => ErrorCode::Error,
            Self::NoQuerySolution
            | Self::PrimaryKeyViolation { .. }
            | Self::NotNullViolation { .. } => ErrorCode::Constraint,
            Self::StalePlan { .. } => ErrorCode::Schema,
            Self::ArgumentCount { .. } | Self::InvalidHandle { .. } | Self::Misuse(_) => {
                ErrorCode::Misuse
            }
            Self::TableGone { .. } | Self::NoSuchRow { .. } => ErrorCode::NotFound,
            Self::TooManyCursors { .. } => ErrorCode::Busy,
            Self::ColumnRange { .. } => ErrorCode::Range,
            Self::ReadOnly => ErrorCode::ReadOnly,
            Self::TypeMismatch { .. } => ErrorCode::Mismatch,
            Self::Internal(_) => ErrorCode::Internal,
            Self::Unsupported => ErrorCode::NoLfs,
            Self::Abort => ErrorCode::Abort,
        }
    }

    /// Whether a host should re-plan and retry the statement.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::StalePlan { .. } | Self::TooManyCursors { .. })
    }

    /// Human-friendly suggestion for fixing this error.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NoSuchModule { .. } => {
                Some("Register the module before preparing SQL that references it")
            }
            Self::StalePlan { .. } => Some("Re-prepare the statement to obtain a fresh plan"),
            Self::NoQuerySolution => {
                Some("Relax the WHERE clause or make the table accept more constraints")
            }
            Self::TooManyCursors { .. } => Some("Close finished statements before opening more"),
            Self::ReadOnly => Some("Implement insert/update/delete on the table kind"),
            _ => None,
        }
    }

    /// Create a domain error whose message reaches the caller unchanged.
    pub fn domain(msg: impl Into<String>) -> Self {
        Self::Domain(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an API misuse error.
    pub fn misuse(msg: impl Into<String>) -> Self {
        Self::Misuse(msg.into())
    }

    /// Create a not-implemented error.
    pub fn not_implemented(feature: impl Into<String>) -> Self {
        Self::NotImplemented(feature.into())
    }

    /// Create a declaration error.
    pub fn declaration(detail: impl Into<String>) -> Self {
        Self::InvalidDeclaration {
            detail: detail.into(),
        }
    }

    /// Create a row-production error.
    pub fn row_production(detail: impl Into<String>) -> Self {
        Self::RowProduction {
            detail: detail.into(),
        }
    }
}

/// Result type alias using `VtabError`.
pub type Result<T> = std::result::Result<T, VtabError>;
