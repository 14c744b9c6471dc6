//! In-memory connector used by the integration tests
//!
//! Records every connect, ping, statement, commit and close so tests can assert on
//! connection lifecycle without a MySQL server.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use mysql_query::{ConnectionConfig, Connector, MysqlQueryError, Result, Session, StatementOutcome};

#[derive(Default)]
pub struct FakeState {
    /// Database of every successful connect, in order
    pub connects: Vec<String>,
    /// Database of every closed session, in order
    pub closes: Vec<String>,
    /// Database of every commit
    pub commits: Vec<String>,
    pub pings: usize,
    /// (current database, sql) of every statement run
    pub executed: Vec<(String, String)>,
    scripted: HashMap<String, Result<StatementOutcome>>,
    unreachable: HashSet<String>,
    failing_pings: usize,
}

/// Connector whose sessions answer from scripted outcomes
#[derive(Clone, Default)]
pub struct FakeConnector {
    state: Arc<Mutex<FakeState>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Answer `sql` with `outcome`; unscripted statements change no rows
    pub fn script(&self, sql: &str, outcome: StatementOutcome) {
        self.state().scripted.insert(sql.to_string(), Ok(outcome));
    }

    /// Fail `sql` with `error`
    pub fn script_error(&self, sql: &str, error: MysqlQueryError) {
        self.state().scripted.insert(sql.to_string(), Err(error));
    }

    pub fn set_unreachable(&self, host: &str, unreachable: bool) {
        let mut state = self.state();
        if unreachable {
            state.unreachable.insert(host.to_string());
        } else {
            state.unreachable.remove(host);
        }
    }

    /// Make the next `count` pings report a dead connection
    pub fn fail_pings(&self, count: usize) {
        self.state().failing_pings = count;
    }

    pub fn connects(&self) -> Vec<String> {
        self.state().connects.clone()
    }

    pub fn closes(&self) -> Vec<String> {
        self.state().closes.clone()
    }

    pub fn commits(&self) -> usize {
        self.state().commits.len()
    }

    pub fn executed(&self) -> Vec<(String, String)> {
        self.state().executed.clone()
    }
}

pub struct FakeSession {
    database: String,
    /// Follows `USE <db>` statements
    current: String,
    state: Arc<Mutex<FakeState>>,
}

impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self, config: &ConnectionConfig) -> Result<FakeSession> {
        let mut state = self.state.lock().unwrap();
        if state.unreachable.contains(&config.host) {
            return Err(MysqlQueryError::connect(format!(
                "{}:{}: Connection refused",
                config.host, config.port
            )));
        }
        state.connects.push(config.database.clone());
        Ok(FakeSession {
            database: config.database.clone(),
            current: config.database.clone(),
            state: Arc::clone(&self.state),
        })
    }
}

impl Session for FakeSession {
    fn database(&self) -> &str {
        &self.database
    }

    async fn current_database(&mut self) -> Result<String> {
        Ok(self.current.clone())
    }

    async fn ping(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.pings += 1;
        if state.failing_pings > 0 {
            state.failing_pings -= 1;
            return Err(MysqlQueryError::connect("Lost connection to MySQL server"));
        }
        Ok(())
    }

    async fn run(&mut self, sql: &str) -> Result<StatementOutcome> {
        let mut state = self.state.lock().unwrap();
        state.executed.push((self.current.clone(), sql.to_string()));
        if let Some(database) = sql.trim().strip_prefix("USE ") {
            self.current = database.trim().to_string();
        }
        state.scripted.get(sql).cloned().unwrap_or_else(|| Ok(StatementOutcome::mutation(0, 0)))
    }

    async fn commit(&mut self) -> Result<()> {
        self.state.lock().unwrap().commits.push(self.database.clone());
        Ok(())
    }

    async fn close(self) -> Result<()> {
        self.state.lock().unwrap().closes.push(self.database.clone());
        Ok(())
    }
}

/// Instance config for host `db1`, database `home`
pub fn home_config() -> ConnectionConfig {
    ConnectionConfig::new("db1", "ha", "secret", "home")
}
