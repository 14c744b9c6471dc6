//! Service Response Types
//!
//! This module defines the two response shapes handed back to service callers.
//!
//! # Output Contract
//! - Full (`execute`): `{"succeeded": ..., "elapsed_ms": ..., "statement": "...",
//!   "column_names": [...], "results": [...], "rows_affected": ..., "generated_id": ...,
//!   "error": {"message": ..., "errno": ..., "sqlstate": ...}}`
//! - Legacy (`query`): `{"result": [...]}`

use serde::Serialize;

use crate::engine::ResultRow;
use crate::error::MysqlQueryError;

/// Error details of a failed statement; all fields are null on success
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    /// Engine error message
    pub message: Option<String>,

    /// Engine-specific numeric error code
    pub errno: Option<u16>,

    /// Engine-specific SQL state
    pub sqlstate: Option<String>,
}

impl ErrorRecord {
    /// Whether no error is recorded
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.message.is_none() && self.errno.is_none() && self.sqlstate.is_none()
    }
}

impl From<&MysqlQueryError> for ErrorRecord {
    fn from(err: &MysqlQueryError) -> Self {
        match err {
            MysqlQueryError::Engine { message, code, state } => Self {
                message: Some(message.clone()),
                errno: *code,
                sqlstate: state.clone(),
            },
            other => Self { message: Some(other.message()), errno: None, sqlstate: None },
        }
    }
}

/// Full response of the `execute` service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    /// Whether the statement completed without error
    pub succeeded: bool,

    /// Elapsed time in milliseconds, two decimals
    pub elapsed_ms: f64,

    /// Echoed statement text
    pub statement: String,

    /// Result-set column names (empty for statements without rows)
    pub column_names: Vec<String>,

    /// Result rows
    pub results: Vec<ResultRow>,

    /// Affected row count
    pub rows_affected: u64,

    /// Auto-increment value generated by the statement, if any
    pub generated_id: Option<u64>,

    /// Error details (populated only on failure)
    pub error: ErrorRecord,
}

/// Response of the legacy `query` service
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LegacyResponse {
    /// Result rows
    pub result: Vec<ResultRow>,
}
