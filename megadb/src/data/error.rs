//! Error types for the data layer
//!
//! Every public operation returns `Result<T, DbError>`. The most recent
//! failure on a connection is also kept as an [`ErrorRecord`] so callers that
//! only check for failure can fetch diagnostics afterwards.

use std::panic::Location;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use super::catalog::ColumnType;

#[derive(Error, Debug)]
pub enum DbError {
    /// Opening the connection failed
    #[error("Connection error: {0}")]
    Connection(sqlx::Error),

    /// Column metadata could not be resolved
    #[error("Error getting table fields for {table}: {reason}")]
    Schema { table: String, reason: String },

    /// A filter, field list, select list or sort key names a column the table lacks
    #[error("Unknown column: {column}")]
    UnknownColumn { column: String },

    /// The engine rejected the SQL text
    #[error("Failed to prepare request: {source}")]
    Prepare { sql: String, source: sqlx::Error },

    /// Value, type-code and placeholder counts disagree
    #[error(
        "Failed to bind variables to query parameters: {expected} placeholders, {values} values, {types} type codes"
    )]
    BindArity {
        expected: usize,
        values: usize,
        types: usize,
    },

    /// A value cannot be converted to the bind type of its column
    #[error("Invalid {expected} value for parameter {index}: {value:?}")]
    InvalidValue {
        index: usize,
        value: String,
        expected: ColumnType,
    },

    /// The engine rejected the statement at execution time
    #[error("Failed to execute prepared request: {0}")]
    Exec(sqlx::Error),

    #[error("Statement timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Caller input rejected before any SQL was sent
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl DbError {
    /// Stable numeric code for this error kind
    pub fn code(&self) -> u16 {
        match self {
            Self::Connection(_) => 1,
            Self::Schema { .. } => 2,
            Self::UnknownColumn { .. } => 3,
            Self::Prepare { .. } => 4,
            Self::BindArity { .. } => 5,
            Self::InvalidValue { .. } => 6,
            Self::Exec(_) => 7,
            Self::Timeout { .. } => 8,
            Self::InvalidInput(_) => 9,
        }
    }

    /// Short name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Schema { .. } => "schema",
            Self::UnknownColumn { .. } => "unknown_column",
            Self::Prepare { .. } => "prepare",
            Self::BindArity { .. } => "bind_arity",
            Self::InvalidValue { .. } => "invalid_value",
            Self::Exec(_) => "exec",
            Self::Timeout { .. } => "timeout",
            Self::InvalidInput(_) => "invalid_input",
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub(crate) fn unknown_column(column: &str) -> Self {
        Self::UnknownColumn {
            column: column.to_string(),
        }
    }
}

/// Structured diagnostics for the most recent failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    pub code: u16,
    pub kind: &'static str,
    /// Source file of the call that failed
    pub file: &'static str,
    pub line: u32,
}

impl ErrorRecord {
    pub fn new(error: &DbError, location: &'static Location<'static>) -> Self {
        Self {
            message: error.to_string(),
            code: error.code(),
            kind: error.kind(),
            file: location.file(),
            line: location.line(),
        }
    }
}

/// Last-error slot for one connection (only the newest failure is kept)
#[derive(Debug, Default)]
pub(crate) struct LastError {
    slot: Mutex<Option<ErrorRecord>>,
}

impl LastError {
    pub fn record(&self, error: &DbError, location: &'static Location<'static>) {
        *self.slot.lock() = Some(ErrorRecord::new(error, location));
    }

    pub fn get(&self) -> Option<ErrorRecord> {
        self.slot.lock().clone()
    }

    pub fn clear(&self) {
        self.slot.lock().take();
    }
}
