//! Database Engine Traits and Core Types
//!
//! This module defines the seam between the service layer and the database client.
//! A [`Connector`] opens [`Session`]s; a `Session` runs single statements and reports
//! what the engine produced as a [`StatementOutcome`].
//!
//! # Value Model
//! Cell values are a closed set of variants ([`CellValue`]). Binary payloads are never
//! forwarded to callers; they are replaced by fixed placeholder tokens when a row is
//! shaped for the response.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::future::Future;

use crate::error::{MysqlQueryError, Result};

pub mod mysql;

/// Default MySQL port
pub const DEFAULT_PORT: u16 = 3306;

/// Default connect timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default autocommit mode
pub const DEFAULT_AUTOCOMMIT: bool = true;

/// Placeholder for fixed-size binary values
pub const BLOB_PLACEHOLDER: &str = "BLOB";

/// Placeholder for streamed large-object values
pub const LARGE_OBJECT_PLACEHOLDER: &str = "LARGE OBJECT";

const fn default_port() -> u16 {
    DEFAULT_PORT
}

const fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

const fn default_autocommit() -> bool {
    DEFAULT_AUTOCOMMIT
}

/// Connection configuration for one database instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Hostname or IP address
    pub host: String,

    /// TCP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username
    pub username: String,

    /// Password
    /// WARNING: Sensitive data, do not log or include in error messages
    #[serde(default)]
    pub password: String,

    /// Default database of the instance
    pub database: String,

    /// Connect timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Connection character set (`SET NAMES`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,

    /// Connection collation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,

    /// Autocommit mode; when false every successful mutation is committed explicitly
    #[serde(default = "default_autocommit")]
    pub autocommit: bool,
}

impl ConnectionConfig {
    /// Create a config with default port, timeout and autocommit
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            password: password.into(),
            database: database.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            charset: None,
            collation: None,
            autocommit: DEFAULT_AUTOCOMMIT,
        }
    }

    /// Same host and credentials, different database
    #[must_use]
    pub fn with_database(&self, database: impl Into<String>) -> Self {
        Self { database: database.into(), ..self.clone() }
    }

    /// Unique identifier of the instance (`host_database`)
    #[must_use]
    pub fn unique_id(&self) -> String {
        format!("{}_{}", self.host, self.database)
    }

    /// Human-readable title of the instance
    #[must_use]
    pub fn title(&self) -> String {
        format!("MySQL: {}/{}", self.host, self.database)
    }

    /// Treat empty charset/collation strings as unset
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.host = self.host.trim().to_string();
        self.charset = self.charset.filter(|c| !c.trim().is_empty());
        self.collation = self.collation.filter(|c| !c.trim().is_empty());
        self
    }

    /// Check that all required fields carry usable values
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(MysqlQueryError::config("'host' must not be empty"));
        }
        if self.username.is_empty() {
            return Err(MysqlQueryError::config("'username' must not be empty"));
        }
        if self.database.trim().is_empty() {
            return Err(MysqlQueryError::config("'database' must not be empty"));
        }
        if self.port == 0 {
            return Err(MysqlQueryError::config("'port' must be between 1 and 65535"));
        }
        if self.timeout_secs == 0 {
            return Err(MysqlQueryError::config("'timeout_secs' must be greater than zero"));
        }
        Ok(())
    }
}

/// A single cell as produced by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Anything representable in the response as-is
    Scalar(serde_json::Value),
    /// Fixed-size binary value (BINARY, VARBINARY, BLOB up to MEDIUMBLOB)
    FixedBinary(Vec<u8>),
    /// Large-object stream value (LONGBLOB)
    StreamedBinary(Vec<u8>),
}

impl CellValue {
    /// Shape the cell for the response, redacting binary payloads
    #[must_use]
    pub fn into_response_value(self) -> serde_json::Value {
        match self {
            Self::Scalar(value) => value,
            Self::FixedBinary(_) => serde_json::Value::String(BLOB_PLACEHOLDER.to_string()),
            Self::StreamedBinary(_) => {
                serde_json::Value::String(LARGE_OBJECT_PLACEHOLDER.to_string())
            }
        }
    }
}

impl From<serde_json::Value> for CellValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Scalar(value)
    }
}

/// One response row: column name → value, in result-set column order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRow {
    entries: Vec<(String, serde_json::Value)>,
}

impl ResultRow {
    /// Build a row from the column list captured at description time
    ///
    /// A repeated column name keeps its first position and takes the last value.
    #[must_use]
    pub fn from_cells(columns: &[String], cells: Vec<CellValue>) -> Self {
        if has_duplicate_names(columns) {
            Self::merge_duplicates(columns, cells)
        } else {
            Self::zip_unique(columns, cells)
        }
    }

    /// Shape every row of a result set, checking the column list for duplicates once
    #[must_use]
    pub fn shape_all(columns: &[String], rows: Vec<Vec<CellValue>>) -> Vec<Self> {
        let shape: fn(&[String], Vec<CellValue>) -> Self = if has_duplicate_names(columns) {
            Self::merge_duplicates
        } else {
            Self::zip_unique
        };
        rows.into_iter().map(|cells| shape(columns, cells)).collect()
    }

    fn zip_unique(columns: &[String], cells: Vec<CellValue>) -> Self {
        let entries = columns
            .iter()
            .zip(cells)
            .map(|(name, cell)| (name.clone(), cell.into_response_value()))
            .collect();
        Self { entries }
    }

    fn merge_duplicates(columns: &[String], cells: Vec<CellValue>) -> Self {
        let mut entries: Vec<(String, serde_json::Value)> = Vec::with_capacity(columns.len());
        let mut positions: HashMap<&str, usize> = HashMap::with_capacity(columns.len());
        for (name, cell) in columns.iter().zip(cells) {
            let value = cell.into_response_value();
            match positions.get(name.as_str()) {
                Some(&idx) => entries[idx].1 = value,
                None => {
                    positions.insert(name.as_str(), entries.len());
                    entries.push((name.clone(), value));
                }
            }
        }
        Self { entries }
    }

    /// Look up a value by column name
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&serde_json::Value> {
        self.entries.iter().find(|(name, _)| name == column).map(|(_, value)| value)
    }

    /// Column names in order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn has_duplicate_names(columns: &[String]) -> bool {
    let mut seen = HashSet::with_capacity(columns.len());
    !columns.iter().all(|name| seen.insert(name.as_str()))
}

impl Serialize for ResultRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Materialized result set of a statement that produced rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Column names in order
    pub columns: Vec<String>,

    /// Raw rows, one `CellValue` per column
    pub rows: Vec<Vec<CellValue>>,
}

/// What the engine reported for one executed statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementOutcome {
    /// Present only if the statement produced a result set ("has rows")
    pub result_set: Option<ResultSet>,

    /// Engine-reported affected row count
    pub rows_affected: u64,

    /// Engine-reported last insert id (zero means none was generated)
    pub last_insert_id: u64,
}

impl StatementOutcome {
    /// Outcome of a statement with a result set
    #[must_use]
    pub fn rows(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self { result_set: Some(ResultSet { columns, rows }), rows_affected: 0, last_insert_id: 0 }
    }

    /// Outcome of a statement that only changed rows
    #[must_use]
    pub const fn mutation(rows_affected: u64, last_insert_id: u64) -> Self {
        Self { result_set: None, rows_affected, last_insert_id }
    }

    /// Whether the engine reported an associated result set
    #[must_use]
    pub const fn has_rows(&self) -> bool {
        self.result_set.is_some()
    }
}

/// A live connection to one database
///
/// Engine failures are reported as [`MysqlQueryError::Engine`]; transport failures as
/// [`MysqlQueryError::Connect`].
pub trait Session: Send + 'static {
    /// Database this session was opened against
    fn database(&self) -> &str;

    /// Database the session currently uses (changes with `USE`); empty if none is selected
    fn current_database(&mut self) -> impl Future<Output = Result<String>> + Send;

    /// Check that the transport is still usable
    fn ping(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Execute one SQL statement verbatim and fetch its full result
    fn run(&mut self, sql: &str) -> impl Future<Output = Result<StatementOutcome>> + Send;

    /// Commit the current transaction
    fn commit(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Release the connection
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

/// Opens sessions for a connection config
pub trait Connector: Send + Sync + 'static {
    /// Session type produced by this connector
    type Session: Session;

    /// Open a new session; must honour `config.timeout_secs`
    fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> impl Future<Output = Result<Self::Session>> + Send;
}
