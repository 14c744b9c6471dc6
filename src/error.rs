//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout mysql-query.
//! All errors are structured and map to stable error codes for service responses.
//!
//! # Error Categories
//! - `Connect`: A connection could not be established or re-established
//! - `InstanceNotFound`: The requested target instance is not configured
//! - `NoInstanceAvailable`: No instance is configured at all
//! - `EmptyQuery`: No SQL text was supplied
//! - `Engine`: The database engine rejected or failed the statement
//! - `Config`: Entry store or legacy configuration errors
//! - `InvalidInput`: Malformed service call data

use thiserror::Error;

/// Main error type for mysql-query operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MysqlQueryError {
    /// Connection could not be opened or re-opened
    #[error("Could not connect to MySQL server: {0}")]
    Connect(String),

    /// Requested target instance does not exist
    #[error("No MySQL instance configured with id '{0}'")]
    InstanceNotFound(String),

    /// No instance configured at all
    #[error("No MySQL instance is configured")]
    NoInstanceAvailable,

    /// No SQL text supplied
    #[error("No query was provided")]
    EmptyQuery,

    /// Statement failed inside the database engine
    #[error("{message}")]
    Engine {
        message: String,
        code: Option<u16>,
        state: Option<String>,
    },

    /// Configuration error (entry store, legacy file, invalid field values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid service call data
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl MysqlQueryError {
    /// Convert error to error code string for service responses
    ///
    /// Error codes are stable and suitable for programmatic handling by automations.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Connect(_) => "CONNECT_ERROR",
            Self::InstanceNotFound(_) => "INSTANCE_NOT_FOUND",
            Self::NoInstanceAvailable => "NO_INSTANCE_AVAILABLE",
            Self::EmptyQuery => "EMPTY_QUERY",
            Self::Engine { .. } => "ENGINE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::InvalidInput(_) => "INVALID_INPUT",
        }
    }

    /// Get human-readable error message
    ///
    /// Never contains credentials.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a connect error
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect(message.into())
    }

    /// Create an instance-not-found error
    pub fn instance_not_found(id: impl Into<String>) -> Self {
        Self::InstanceNotFound(id.into())
    }

    /// Create an engine error
    pub fn engine(message: impl Into<String>, code: Option<u16>, state: Option<String>) -> Self {
        Self::Engine { message: message.into(), code, state }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

/// Result type alias for mysql-query operations
pub type Result<T> = std::result::Result<T, MysqlQueryError>;
