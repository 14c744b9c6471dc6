//! MySQL Database Engine Implementation
//!
//! This module implements the [`Connector`] and [`Session`] traits for MySQL servers
//! (including MariaDB).
//!
//! # Implementation Notes
//! - Uses `mysql_async` (async driver, requires tokio runtime)
//! - Statements run over the text protocol, verbatim, one statement per call; a batch
//!   is reported as an engine error
//! - The connect timeout is enforced via `tokio::time::timeout`; statements carry none
//! - Charset/collation and disabled autocommit are applied as connection init statements
//! - Text-protocol cells are typed from the column definition (integers, floats, JSON, BIT)
//! - Binary string and BLOB columns become `FixedBinary`; LONGBLOB becomes `StreamedBinary`
//! - Server errors keep their numeric code and SQL state; transport errors are connect errors

use mysql_async::consts::ColumnType;
use mysql_async::prelude::*;
use mysql_async::{Column, Conn, OptsBuilder, Row, Value};
use std::time::Duration;

use crate::engine::{CellValue, ConnectionConfig, Connector, ResultSet, Session, StatementOutcome};
use crate::error::{MysqlQueryError, Result};

/// Character set id MySQL reports for binary data
const BINARY_CHARSET: u16 = 63;

/// Largest declared length of a MEDIUMBLOB column
const MEDIUM_BLOB_MAX_LENGTH: u32 = 16_777_215;

/// Reported when a call carries more than one statement
const MULTI_STATEMENT_MESSAGE: &str = "Only a single statement per call is supported; \
     the statements after the first may already have run on the server";

/// MySQL connector backed by `mysql_async`
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

/// An open `mysql_async` connection
pub struct MySqlSession {
    conn: Conn,
    database: String,
}

impl Connector for MySqlConnector {
    type Session = MySqlSession;

    async fn connect(&self, config: &ConnectionConfig) -> Result<MySqlSession> {
        config.validate()?;

        let opts = build_mysql_opts(config);
        let timeout = Duration::from_secs(config.timeout_secs);

        let conn = tokio::time::timeout(timeout, Conn::new(opts))
            .await
            .map_err(|_| {
                MysqlQueryError::connect(format!(
                    "timed out after {}s connecting to {}:{}",
                    config.timeout_secs, config.host, config.port
                ))
            })?
            .map_err(|e| {
                MysqlQueryError::connect(format!("{}:{}: {e}", config.host, config.port))
            })?;

        tracing::debug!(host = %config.host, database = %config.database, "MySQL connection opened");

        Ok(MySqlSession { conn, database: config.database.clone() })
    }
}

impl Session for MySqlSession {
    fn database(&self) -> &str {
        &self.database
    }

    async fn current_database(&mut self) -> Result<String> {
        let current: Option<Option<String>> =
            self.conn.query_first("SELECT DATABASE()").await.map_err(classify_error)?;
        Ok(current.flatten().unwrap_or_default())
    }

    async fn ping(&mut self) -> Result<()> {
        self.conn
            .ping()
            .await
            .map_err(|e| MysqlQueryError::connect(format!("ping failed: {e}")))
    }

    async fn run(&mut self, sql: &str) -> Result<StatementOutcome> {
        let mut result = self.conn.query_iter(sql).await.map_err(classify_error)?;

        let columns = result.columns().filter(|columns| !columns.is_empty());
        let last_insert_id = result.last_insert_id().unwrap_or(0);

        let outcome = match columns {
            Some(columns) => {
                let rows: Vec<Row> = result.collect().await.map_err(classify_error)?;
                let kinds: Vec<ColumnKind> = columns.iter().map(ColumnKind::from_column).collect();
                let names: Vec<String> =
                    columns.iter().map(|column| column.name_str().into_owned()).collect();
                let rows = rows.into_iter().map(|row| convert_row(row, &kinds)).collect();

                StatementOutcome {
                    result_set: Some(ResultSet { columns: names, rows }),
                    rows_affected: result.affected_rows(),
                    last_insert_id,
                }
            }
            None => StatementOutcome::mutation(result.affected_rows(), last_insert_id),
        };

        // The driver always negotiates multi-statement support, so a batch has already
        // run on the server by now. Drain it to keep the connection usable and refuse it.
        let batch = !result.is_empty();
        let drained = result.drop_result().await;
        if batch {
            if let Err(e) = drained {
                tracing::debug!("Error in trailing statement of a batch: {e}");
            }
            return Err(MysqlQueryError::engine(MULTI_STATEMENT_MESSAGE, None, None));
        }
        drained.map_err(classify_error)?;

        Ok(outcome)
    }

    async fn commit(&mut self) -> Result<()> {
        self.conn.query_drop("COMMIT").await.map_err(classify_error)
    }

    async fn close(self) -> Result<()> {
        self.conn
            .disconnect()
            .await
            .map_err(|e| MysqlQueryError::connect(format!("Failed to disconnect: {e}")))
    }
}

/// Build MySQL connection options from ConnectionConfig
fn build_mysql_opts(config: &ConnectionConfig) -> OptsBuilder {
    OptsBuilder::default()
        .ip_or_hostname(config.host.clone())
        .tcp_port(config.port)
        .user(Some(config.username.clone()))
        .pass(Some(config.password.clone()))
        .db_name(Some(config.database.clone()))
        .init(init_statements(config))
}

/// Statements run on every new connection
fn init_statements(config: &ConnectionConfig) -> Vec<String> {
    let mut statements = Vec::new();

    match (config.charset.as_deref(), config.collation.as_deref()) {
        (Some(charset), Some(collation)) => {
            statements.push(format!("SET NAMES '{charset}' COLLATE '{collation}'"));
        }
        (Some(charset), None) => statements.push(format!("SET NAMES '{charset}'")),
        (None, Some(collation)) => {
            statements.push(format!("SET collation_connection = '{collation}'"));
        }
        (None, None) => {}
    }

    if !config.autocommit {
        statements.push("SET autocommit = 0".to_string());
    }

    statements
}

/// Map a driver error onto the crate taxonomy
fn classify_error(err: mysql_async::Error) -> MysqlQueryError {
    match err {
        mysql_async::Error::Server(server) => {
            MysqlQueryError::engine(server.message, Some(server.code), Some(server.state))
        }
        mysql_async::Error::Io(e) => MysqlQueryError::connect(e.to_string()),
        mysql_async::Error::Driver(e) => MysqlQueryError::connect(e.to_string()),
        other => MysqlQueryError::engine(other.to_string(), None, None),
    }
}

/// The parts of a column definition that decide how a cell is typed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnKind {
    column_type: ColumnType,
    character_set: u16,
    column_length: u32,
}

impl ColumnKind {
    fn from_column(column: &Column) -> Self {
        Self {
            column_type: column.column_type(),
            character_set: column.character_set(),
            column_length: column.column_length(),
        }
    }

    /// Binary string or BLOB column (numeric and temporal columns also report charset 63)
    fn is_binary_string(&self) -> bool {
        self.character_set == BINARY_CHARSET
            && matches!(
                self.column_type,
                ColumnType::MYSQL_TYPE_STRING
                    | ColumnType::MYSQL_TYPE_VAR_STRING
                    | ColumnType::MYSQL_TYPE_VARCHAR
                    | ColumnType::MYSQL_TYPE_TINY_BLOB
                    | ColumnType::MYSQL_TYPE_BLOB
                    | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
                    | ColumnType::MYSQL_TYPE_LONG_BLOB
                    | ColumnType::MYSQL_TYPE_GEOMETRY
            )
    }

    fn is_large_object(&self) -> bool {
        self.column_type == ColumnType::MYSQL_TYPE_LONG_BLOB
            || (matches!(self.column_type, ColumnType::MYSQL_TYPE_BLOB)
                && self.column_length > MEDIUM_BLOB_MAX_LENGTH)
    }
}

/// Convert a MySQL row to cells in column order
fn convert_row(row: Row, kinds: &[ColumnKind]) -> Vec<CellValue> {
    row.unwrap_raw()
        .into_iter()
        .zip(kinds)
        .map(|(value, kind)| convert_value(value.unwrap_or(Value::NULL), kind))
        .collect()
}

/// Convert a MySQL value to a cell
fn convert_value(value: Value, kind: &ColumnKind) -> CellValue {
    match value {
        Value::NULL => CellValue::Scalar(serde_json::Value::Null),

        Value::Bytes(bytes) => convert_text_cell(bytes, kind),

        Value::Int(i) => CellValue::Scalar(i.into()),

        Value::UInt(u) => CellValue::Scalar(u.into()),

        Value::Float(f) => CellValue::Scalar(float_to_json(f64::from(f))),

        Value::Double(d) => CellValue::Scalar(float_to_json(d)),

        Value::Date(year, month, day, hour, minute, second, micro) => {
            let text = if kind.column_type == ColumnType::MYSQL_TYPE_DATE {
                format!("{year:04}-{month:02}-{day:02}")
            } else if micro == 0 {
                format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}")
            } else {
                format!(
                    "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{micro:06}"
                )
            };
            CellValue::Scalar(serde_json::Value::String(text))
        }

        Value::Time(is_negative, days, hours, minutes, seconds, micro) => {
            let sign = if is_negative { "-" } else { "" };
            let total_hours = days * 24 + u32::from(hours);
            let text = if micro == 0 {
                format!("{sign}{total_hours}:{minutes:02}:{seconds:02}")
            } else {
                format!("{sign}{total_hours}:{minutes:02}:{seconds:02}.{micro:06}")
            };
            CellValue::Scalar(serde_json::Value::String(text))
        }
    }
}

/// Type a text-protocol cell using its column definition
fn convert_text_cell(bytes: Vec<u8>, kind: &ColumnKind) -> CellValue {
    match kind.column_type {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_YEAR => {
            let text = String::from_utf8_lossy(&bytes);
            if let Ok(i) = text.parse::<i64>() {
                CellValue::Scalar(i.into())
            } else if let Ok(u) = text.parse::<u64>() {
                CellValue::Scalar(u.into())
            } else {
                CellValue::Scalar(serde_json::Value::String(text.into_owned()))
            }
        }

        ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => {
            let text = String::from_utf8_lossy(&bytes);
            match text.parse::<f64>() {
                Ok(f) => CellValue::Scalar(float_to_json(f)),
                Err(_) => CellValue::Scalar(serde_json::Value::String(text.into_owned())),
            }
        }

        ColumnType::MYSQL_TYPE_BIT if bytes.len() <= 8 => {
            let value = bytes.iter().fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
            CellValue::Scalar(value.into())
        }

        ColumnType::MYSQL_TYPE_JSON => match serde_json::from_slice(&bytes) {
            Ok(json) => CellValue::Scalar(json),
            Err(_) => text_or_binary(bytes),
        },

        ColumnType::MYSQL_TYPE_DATETIME
        | ColumnType::MYSQL_TYPE_DATETIME2
        | ColumnType::MYSQL_TYPE_TIMESTAMP
        | ColumnType::MYSQL_TYPE_TIMESTAMP2 => {
            let text = String::from_utf8_lossy(&bytes).replacen(' ', "T", 1);
            CellValue::Scalar(serde_json::Value::String(text))
        }

        _ if kind.is_binary_string() => {
            if kind.is_large_object() {
                CellValue::StreamedBinary(bytes)
            } else {
                CellValue::FixedBinary(bytes)
            }
        }

        _ => text_or_binary(bytes),
    }
}

/// UTF-8 text as a string, anything else as fixed binary
fn text_or_binary(bytes: Vec<u8>) -> CellValue {
    match String::from_utf8(bytes) {
        Ok(text) => CellValue::Scalar(serde_json::Value::String(text)),
        Err(e) => CellValue::FixedBinary(e.into_bytes()),
    }
}

/// NaN and infinities have no JSON representation
fn float_to_json(f: f64) -> serde_json::Value {
    serde_json::Number::from_f64(f).map_or(serde_json::Value::Null, serde_json::Value::Number)
}
