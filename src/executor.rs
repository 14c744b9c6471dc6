//! Query Executor
//!
//! Runs one SQL statement against an instance and captures the outcome as an
//! [`Execution`]. Both service entry points share this path; they differ only in how
//! the `Execution` is turned into a response:
//! - [`Execution::into_full`] embeds failures in the response's error record
//! - [`Execution::into_legacy`] returns the rows or fails the call

use std::time::{Duration, Instant};

use crate::engine::{Connector, ResultRow, Session};
use crate::error::{MysqlQueryError, Result};
use crate::manager::{ConnectionManager, Instance};
use crate::output::{ErrorRecord, LegacyResponse, QueryResponse};

/// Data produced by a successful statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementReport {
    /// Result-set column names (empty without a result set)
    pub column_names: Vec<String>,

    /// Shaped result rows
    pub results: Vec<ResultRow>,

    /// Affected rows, or the number of rows returned for a result set
    pub rows_affected: u64,

    /// Generated auto-increment id, never zero
    pub generated_id: Option<u64>,
}

/// One executed statement, successful or not
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// Statement text as supplied
    pub statement: String,

    /// Milliseconds from start to completion or failure, two decimals
    pub elapsed_ms: f64,

    /// Statement data or the failure that stopped it
    pub outcome: Result<StatementReport>,
}

impl Execution {
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Full response; failures land in the error record
    #[must_use]
    pub fn into_full(self) -> QueryResponse {
        match self.outcome {
            Ok(report) => QueryResponse {
                succeeded: true,
                elapsed_ms: self.elapsed_ms,
                statement: self.statement,
                column_names: report.column_names,
                results: report.results,
                rows_affected: report.rows_affected,
                generated_id: report.generated_id,
                error: ErrorRecord::default(),
            },
            Err(err) => QueryResponse {
                succeeded: false,
                elapsed_ms: self.elapsed_ms,
                statement: self.statement,
                column_names: Vec::new(),
                results: Vec::new(),
                rows_affected: 0,
                generated_id: None,
                error: ErrorRecord::from(&err),
            },
        }
    }

    /// Legacy response; any failure fails the call
    pub fn into_legacy(self) -> Result<LegacyResponse> {
        self.outcome.map(|report| LegacyResponse { result: report.results })
    }
}

/// Execute `sql` against `instance`, optionally on another database of the same server
///
/// Only a missing statement is an `Err`; everything after that is captured in the
/// returned [`Execution`].
pub async fn execute<C: Connector>(
    manager: &ConnectionManager<C>,
    instance: &Instance<C::Session>,
    sql: &str,
    override_database: Option<&str>,
) -> Result<Execution> {
    if sql.trim().is_empty() {
        return Err(MysqlQueryError::EmptyQuery);
    }

    let start = Instant::now();
    let config = instance.config();

    let requested = override_database.map(str::trim).filter(|database| !database.is_empty());
    let outcome = match requested {
        Some(database) => run_with_override(manager, instance, sql, database).await,
        None => {
            let mut slot = instance.lock().await;
            match manager.ensure_alive(&mut slot, config).await {
                Ok(session) => run_statement(session, sql, config.autocommit).await,
                Err(e) => Err(e),
            }
        }
    };

    let elapsed_ms = round_millis(start.elapsed());

    match &outcome {
        Ok(report) => tracing::debug!(
            instance = %instance.id(),
            rows = report.results.len(),
            rows_affected = report.rows_affected,
            elapsed_ms,
            "Statement executed"
        ),
        Err(e) => tracing::warn!(instance = %instance.id(), elapsed_ms, "Statement failed: {e}"),
    }

    Ok(Execution { statement: sql.to_string(), elapsed_ms, outcome })
}

/// Run on the long-lived session if it already uses `requested`, otherwise on a
/// short-lived session opened against `requested`
async fn run_with_override<C: Connector>(
    manager: &ConnectionManager<C>,
    instance: &Instance<C::Session>,
    sql: &str,
    requested: &str,
) -> Result<StatementReport> {
    let config = instance.config();

    let mut slot = instance.lock().await;
    let session = manager.ensure_alive(&mut slot, config).await?;
    let current = session.current_database().await?;
    if override_target(&current, Some(requested)).is_none() {
        return run_statement(session, sql, config.autocommit).await;
    }
    drop(slot);

    let mut session = manager.open_override(config, requested).await?;
    let outcome = run_statement(&mut session, sql, config.autocommit).await;
    manager.close(session).await;
    outcome
}

/// Run one statement and shape its outcome
async fn run_statement<S: Session>(
    session: &mut S,
    sql: &str,
    autocommit: bool,
) -> Result<StatementReport> {
    let outcome = session.run(sql).await?;
    let generated_id = (outcome.last_insert_id != 0).then_some(outcome.last_insert_id);

    match outcome.result_set {
        Some(set) => {
            let results = ResultRow::shape_all(&set.columns, set.rows);

            Ok(StatementReport {
                rows_affected: results.len() as u64,
                column_names: set.columns,
                results,
                generated_id,
            })
        }
        None => {
            if !autocommit {
                session.commit().await?;
            }

            Ok(StatementReport {
                column_names: Vec::new(),
                results: Vec::new(),
                rows_affected: outcome.rows_affected,
                generated_id,
            })
        }
    }
}

/// Database to open an override session for, if the request needs one
fn override_target<'a>(current: &str, requested: Option<&'a str>) -> Option<&'a str> {
    requested
        .map(str::trim)
        .filter(|database| !database.is_empty() && !database.eq_ignore_ascii_case(current))
}

/// Milliseconds rounded to two decimals
fn round_millis(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100_000.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report() -> StatementReport {
        let columns = vec!["one".to_string()];
        StatementReport {
            column_names: columns.clone(),
            results: vec![ResultRow::from_cells(&columns, vec![json!(1).into()])],
            rows_affected: 1,
            generated_id: None,
        }
    }

    #[test]
    fn test_override_target() {
        assert_eq!(override_target("home", None), None);
        assert_eq!(override_target("home", Some("")), None);
        assert_eq!(override_target("home", Some("HOME")), None);
        assert_eq!(override_target("Home", Some(" home ")), None);
        assert_eq!(override_target("home", Some("other_schema")), Some("other_schema"));
    }

    #[test]
    fn test_round_millis() {
        assert_eq!(round_millis(Duration::from_micros(1234)), 1.23);
        assert_eq!(round_millis(Duration::from_micros(1236)), 1.24);
        assert_eq!(round_millis(Duration::from_secs(2)), 2000.0);
        assert_eq!(round_millis(Duration::ZERO), 0.0);
    }

    #[test]
    fn test_into_full_success() {
        let execution = Execution {
            statement: "SELECT 1 AS one".to_string(),
            elapsed_ms: 0.5,
            outcome: Ok(report()),
        };
        assert!(execution.succeeded());

        let response = execution.into_full();
        assert!(response.succeeded);
        assert_eq!(response.column_names, vec!["one".to_string()]);
        assert_eq!(response.results.len(), 1);
        assert!(response.error.is_empty());
    }

    #[test]
    fn test_into_full_failure_has_no_results() {
        let execution = Execution {
            statement: "SELECT * FROM missing_table".to_string(),
            elapsed_ms: 0.5,
            outcome: Err(MysqlQueryError::engine(
                "Table 'home.missing_table' doesn't exist",
                Some(1146),
                Some("42S02".to_string()),
            )),
        };

        let response = execution.into_full();
        assert!(!response.succeeded);
        assert!(response.results.is_empty());
        assert!(response.column_names.is_empty());
        assert_eq!(response.error.errno, Some(1146));
        assert!(response.error.message.unwrap().contains("doesn't exist"));
    }

    #[test]
    fn test_into_legacy() {
        let ok = Execution { statement: "SELECT 1 AS one".to_string(), elapsed_ms: 0.1, outcome: Ok(report()) };
        assert_eq!(ok.into_legacy().unwrap().result.len(), 1);

        let failed = Execution {
            statement: "SELECT nope".to_string(),
            elapsed_ms: 0.1,
            outcome: Err(MysqlQueryError::engine("Unknown column 'nope'", Some(1054), None)),
        };
        assert!(matches!(failed.into_legacy(), Err(MysqlQueryError::Engine { code: Some(1054), .. })));
    }
}
