//! Database error types.
//!
//! Each failure the query layer can report is its own variant so callers can
//! map them to distinct outcomes (`NoEntry` to "not found", driver errors to
//! internal failures, and so on).

use thiserror::Error;

/// Database error type.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Value could not be encoded, decoded, encrypted or decrypted.
    #[error("Codec error: {0}")]
    Codec(String),

    /// An encrypted value reached the codec while encryption is disabled.
    #[error("Encrypted value found while encryption is disabled")]
    EncryptedWhileDisabled,

    /// An UPDATE filter matched no row.
    #[error("No entry matches the filter on table {0}")]
    NoEntry(String),

    /// The affected table could not be determined from the statement.
    #[error("Could not determine the table affected by: {0}")]
    TableIdentification(String),

    /// No record id could be found for an audited statement.
    #[error("Could not determine the record id for {action} on {table}")]
    RecordIdentification { action: String, table: String },

    /// SET or WHERE clause missing or out of order.
    #[error("Malformed statement: {0}")]
    MalformedClause(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The audit record could not be written.
    #[error("Audit error: {0}")]
    Audit(String),

    /// Table or column name uses a reserved prefix.
    #[error("Reserved name: {0}")]
    ReservedName(String),

    /// Column type is not in the supported set.
    #[error("Invalid column type '{column_type}' for column {column}")]
    InvalidColumnType { column: String, column_type: String },

    /// Database initialization failed.
    #[error("Bootstrap error: {0}")]
    Bootstrap(String),

    /// Configuration or key material error
    #[error(transparent)]
    Core(#[from] sqlvault_config_and_utils::CoreError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatabaseError {
    /// Whether this error represents a missing row rather than a failure.
    pub fn is_no_entry(&self) -> bool {
        matches!(self, DatabaseError::NoEntry(_))
    }
}

/// Result type alias using DatabaseError.
pub type DatabaseResult<T> = Result<T, DatabaseError>;
