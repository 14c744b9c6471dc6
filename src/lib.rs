//! mysql-query - Ad-hoc MySQL Services for Home-Automation Hosts
//!
//! mysql-query lets automations run arbitrary SQL against one or more configured MySQL
//! instances and get the rows back as structured data.
//!
//! # Services
//! - `query` - legacy service, returns `{"result": [rows]}` and fails on any error
//! - `execute` - full service, returns rows plus metadata; statement errors are reported
//!   inside the response
//!
//! # Architecture
//! The library holds all behavior. The binary is a thin wrapper that loads the entry
//! store, sets up instances and serves calls as JSON-RPC over stdio.
//!
//! # Module Organization
//! - [`error`] - Error types and stable error codes
//! - [`engine`] - Connector/session traits, value model and the MySQL client
//! - [`manager`] - Per-instance connection lifecycle
//! - [`executor`] - Statement execution and result shaping
//! - [`output`] - Service response types
//! - [`service`] - Service handlers and instance sync
//! - [`config`] - Entry store, setup flow and legacy import
//! - [`server`] - JSON-RPC 2.0 server over stdio

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod manager;
pub mod output;
pub mod server;
pub mod service;

// Re-export commonly used types for convenience
pub use config::{EntryRegistry, EntrySource, StoredEntry};
pub use engine::mysql::MySqlConnector;
pub use engine::{CellValue, ConnectionConfig, Connector, ResultRow, Session, StatementOutcome};
pub use error::{MysqlQueryError, Result};
pub use output::{ErrorRecord, LegacyResponse, QueryResponse};
pub use service::{QueryRequest, ServiceContext, SyncReport};

/// Install the stderr log subscriber
///
/// `RUST_LOG` takes precedence over `default_level`. Stdout is reserved for responses,
/// so logs never go there.
pub fn init_logging(default_level: &str) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // try_init: a subscriber may already be installed (tests, embedding hosts)
    let _ = fmt::Subscriber::builder()
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
