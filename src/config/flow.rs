//! Entry creation and re-configuration.
//!
//! New entries are only saved after a test connection succeeded. Updates replace all
//! fields of an existing entry without a test connection.

use crate::config::{EntryRegistry, EntrySource, StoredEntry};
use crate::engine::{ConnectionConfig, Connector, Session};
use crate::error::Result;

/// Open and immediately close a connection with `config`
pub async fn test_connection<C: Connector>(connector: &C, config: &ConnectionConfig) -> Result<()> {
    config.validate()?;
    let session = connector.connect(config).await?;
    if let Err(e) = session.close().await {
        tracing::debug!("Closing test connection failed: {e}");
    }
    Ok(())
}

/// Test-connect, then add a user entry to the registry
pub async fn create_entry<C: Connector>(
    connector: &C,
    registry: &mut EntryRegistry,
    config: ConnectionConfig,
) -> Result<StoredEntry> {
    let config = config.normalized();

    if let Err(e) = test_connection(connector, &config).await {
        tracing::error!(host = %config.host, database = %config.database, "MySQL connection error: {e}");
        return Err(e);
    }

    let entry = registry.create_entry(config, EntrySource::User)?.clone();
    tracing::info!(entry = %entry.entry_id, "Entry created");
    Ok(entry)
}

/// Replace every field of an existing entry
pub fn update_entry(
    registry: &mut EntryRegistry,
    entry_id: &str,
    config: ConnectionConfig,
) -> Result<StoredEntry> {
    let entry = registry.update_entry(entry_id, config)?.clone();
    tracing::info!(entry = %entry.entry_id, "Entry updated");
    Ok(entry)
}
