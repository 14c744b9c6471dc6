//! Service Handlers
//!
//! [`ServiceContext`] is the explicit context object passed to every service call. It
//! owns the [`ConnectionManager`] and ties instance lifecycle to the entry store.
//!
//! # Services
//! - `query` - returns `{"result": [...]}`; any failure fails the call
//! - `execute` - returns the full [`QueryResponse`]; statement failures are embedded

use serde::{Deserialize, Serialize};

use crate::config::EntryRegistry;
use crate::engine::Connector;
use crate::error::{MysqlQueryError, Result};
use crate::executor::{self, Execution};
use crate::manager::ConnectionManager;
use crate::output::{LegacyResponse, QueryResponse};

/// Legacy service: rows only, failures are faults
pub const SERVICE_QUERY: &str = "query";

/// Full service: response with metadata and error record
pub const SERVICE_EXECUTE: &str = "execute";

/// Data of a `query` or `execute` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryRequest {
    /// SQL text, passed to the server verbatim
    #[serde(default)]
    pub query: String,

    /// Run against this database instead of the instance default
    #[serde(default)]
    pub db4query: Option<String>,

    /// Target instance id
    #[serde(default)]
    pub config_entry: Option<String>,
}

impl QueryRequest {
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), db4query: None, config_entry: None }
    }

    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.db4query = Some(database.into());
        self
    }

    #[must_use]
    pub fn with_entry(mut self, entry_id: impl Into<String>) -> Self {
        self.config_entry = Some(entry_id.into());
        self
    }

    /// Parse call data
    pub fn from_data(data: serde_json::Value) -> Result<Self> {
        serde_json::from_value(data)
            .map_err(|e| MysqlQueryError::invalid_input(format!("Invalid service data: {e}")))
    }
}

/// Instances changed by [`ServiceContext::sync_entries`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Instances that were (re)opened
    pub set_up: Vec<String>,

    /// Instances that were closed
    pub torn_down: Vec<String>,

    /// Instances that could not be set up, with the reason
    pub failed: Vec<(String, String)>,
}

/// Context shared by all service handlers
pub struct ServiceContext<C: Connector> {
    manager: ConnectionManager<C>,
}

impl<C: Connector> ServiceContext<C> {
    pub fn new(connector: C) -> Self {
        Self { manager: ConnectionManager::new(connector) }
    }

    #[must_use]
    pub const fn manager(&self) -> &ConnectionManager<C> {
        &self.manager
    }

    /// Bring loaded instances in line with the entry store
    ///
    /// Removed or changed entries are torn down; new or changed ones are set up. A failing
    /// entry does not prevent the others from loading.
    pub async fn sync_entries(&self, registry: &EntryRegistry) -> SyncReport {
        let mut report = SyncReport::default();
        let mut desired = Vec::with_capacity(registry.entries.len());

        for entry in &registry.entries {
            match entry.resolve() {
                Ok(config) => desired.push((entry.entry_id.clone(), config)),
                Err(e) => report.failed.push((entry.entry_id.clone(), e.message())),
            }
        }

        for (id, config) in self.manager.instances().await {
            let unchanged = desired.iter().any(|(want_id, want)| *want_id == id && *want == config);
            if !unchanged && self.manager.teardown_instance(&id).await {
                report.torn_down.push(id);
            }
        }

        let loaded: Vec<String> =
            self.manager.instances().await.into_iter().map(|(id, _)| id).collect();

        for (id, config) in desired {
            if loaded.contains(&id) {
                continue;
            }
            match self.manager.setup_instance(id.clone(), config).await {
                Ok(()) => report.set_up.push(id),
                Err(e) => {
                    tracing::error!(instance = %id, "Could not set up instance: {e}");
                    report.failed.push((id, e.message()));
                }
            }
        }

        report
    }

    /// Tear down one instance; `false` if it was not loaded
    pub async fn unload_entry(&self, entry_id: &str) -> bool {
        self.manager.teardown_instance(entry_id).await
    }

    /// Close all instances
    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
    }

    /// Shared execution path of both services
    pub async fn run(&self, request: &QueryRequest) -> Result<Execution> {
        if request.query.trim().is_empty() {
            return Err(MysqlQueryError::EmptyQuery);
        }

        let instance = self.manager.resolve(request.config_entry.as_deref()).await?;
        executor::execute(&self.manager, &instance, &request.query, request.db4query.as_deref())
            .await
    }

    /// Legacy `query` service
    pub async fn query(&self, request: &QueryRequest) -> Result<LegacyResponse> {
        self.run(request).await?.into_legacy()
    }

    /// Full `execute` service
    pub async fn execute(&self, request: &QueryRequest) -> Result<QueryResponse> {
        Ok(self.run(request).await?.into_full())
    }

    /// Dispatch a service call by name
    pub async fn call(&self, service: &str, data: serde_json::Value) -> Result<serde_json::Value> {
        let request = QueryRequest::from_data(data)?;

        let value = match service {
            SERVICE_QUERY => serde_json::to_value(self.query(&request).await?),
            SERVICE_EXECUTE => serde_json::to_value(self.execute(&request).await?),
            other => return Err(MysqlQueryError::invalid_input(format!("Unknown service: {other}"))),
        };

        value.map_err(|e| MysqlQueryError::invalid_input(format!("Could not encode response: {e}")))
    }
}
