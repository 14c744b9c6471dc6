//! Configuration Management
//!
//! This module persists one entry per configured database instance.
//!
//! # Entry Store
//! Entries live in a single JSON file, by default
//! `<config_dir>/mysql-query/entries.json`. Entries keep their registration order,
//! which decides the fallback instance for calls that name none.
//!
//! # Entry Identity
//! An entry's id is the instance's unique id (`host_database`). Creating a second
//! entry with the same id is rejected.
//!
//! # Submodules
//! - [`flow`] - create (with a test connection) and update operations
//! - [`legacy`] - one-time import of the legacy YAML configuration section

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::ConnectionConfig;
use crate::error::{MysqlQueryError, Result};

pub mod flow;
pub mod legacy;

/// Environment variable that overrides the entry store location
pub const REGISTRY_ENV: &str = "MYSQL_QUERY_REGISTRY";

/// How an entry came into existence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    /// Created through the setup wizard
    #[default]
    User,
    /// Converted from the legacy configuration file
    Import,
}

/// Stored instance entry
///
/// Supports an environment variable reference for the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    /// Entry id (`host_database`)
    pub entry_id: String,

    /// Display title
    pub title: String,

    /// Origin of the entry
    #[serde(default)]
    pub source: EntrySource,

    /// Connection configuration
    #[serde(flatten)]
    pub config: ConnectionConfig,

    /// Environment variable name for password (if not storing password directly)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl StoredEntry {
    /// Resolve environment variables and return the effective `ConnectionConfig`
    pub fn resolve(&self) -> Result<ConnectionConfig> {
        let mut config = self.config.clone();

        if let Some(env_var) = &self.password_env {
            match std::env::var(env_var) {
                Ok(password) => config.password = password,
                Err(_) => {
                    return Err(MysqlQueryError::config(format!(
                        "Environment variable {env_var} not found for password"
                    )));
                }
            }
        }

        Ok(config)
    }
}

/// All stored entries, in registration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRegistry {
    #[serde(default)]
    pub entries: Vec<StoredEntry>,
}

impl EntryRegistry {
    /// Look up an entry by id
    #[must_use]
    pub fn get(&self, entry_id: &str) -> Option<&StoredEntry> {
        self.entries.iter().find(|entry| entry.entry_id == entry_id)
    }

    /// Whether an entry with this id exists
    #[must_use]
    pub fn contains(&self, entry_id: &str) -> bool {
        self.get(entry_id).is_some()
    }

    /// Add a new entry; fails if its unique id is already configured
    pub fn create_entry(
        &mut self,
        config: ConnectionConfig,
        source: EntrySource,
    ) -> Result<&StoredEntry> {
        let config = config.normalized();
        config.validate()?;

        let entry_id = config.unique_id();
        if self.contains(&entry_id) {
            return Err(MysqlQueryError::config(format!(
                "Instance '{entry_id}' is already configured"
            )));
        }

        let title = match source {
            EntrySource::User => config.title(),
            EntrySource::Import => format!("{} (Imported)", config.title()),
        };

        self.entries.push(StoredEntry { entry_id, title, source, config, password_env: None });
        let idx = self.entries.len() - 1;
        Ok(&self.entries[idx])
    }

    /// Replace the connection configuration of an existing entry
    ///
    /// The entry keeps its id and title.
    pub fn update_entry(&mut self, entry_id: &str, config: ConnectionConfig) -> Result<&StoredEntry> {
        let config = config.normalized();
        config.validate()?;

        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.entry_id == entry_id)
            .ok_or_else(|| MysqlQueryError::instance_not_found(entry_id))?;

        entry.config = config;
        Ok(entry)
    }

    /// Remove an entry and return it
    pub fn remove_entry(&mut self, entry_id: &str) -> Result<StoredEntry> {
        let idx = self
            .entries
            .iter()
            .position(|entry| entry.entry_id == entry_id)
            .ok_or_else(|| MysqlQueryError::instance_not_found(entry_id))?;

        Ok(self.entries.remove(idx))
    }
}

/// Get path to the default entry store (`<config_dir>/mysql-query/entries.json`)
pub fn default_registry_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| MysqlQueryError::config("Could not determine user config directory"))?;

    Ok(config_dir.join("mysql-query").join("entries.json"))
}

/// Load the entry store; a missing file is an empty store
pub fn load_registry(path: &Path) -> Result<EntryRegistry> {
    if !path.exists() {
        return Ok(EntryRegistry::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| MysqlQueryError::config(format!("Could not read entry store: {e}")))?;

    serde_json::from_str(&contents)
        .map_err(|e| MysqlQueryError::config(format!("Invalid entry store format: {e}")))
}

/// Save the entry store, creating its directory if needed
pub fn save_registry(path: &Path, registry: &EntryRegistry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            MysqlQueryError::config(format!("Could not create config directory: {e}"))
        })?;
    }

    let contents = serde_json::to_string_pretty(registry)
        .map_err(|e| MysqlQueryError::config(format!("Could not serialize entry store: {e}")))?;

    fs::write(path, contents)
        .map_err(|e| MysqlQueryError::config(format!("Could not write entry store: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> PathBuf {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir()
            .join(format!("mysql_query_{name}_{}_{id}", std::process::id()))
            .join("entries.json")
    }

    #[test]
    fn test_create_entry_assigns_id_and_title() {
        let mut registry = EntryRegistry::default();
        let entry = registry
            .create_entry(ConnectionConfig::new("db1", "ha", "secret", "home"), EntrySource::User)
            .unwrap();
        assert_eq!(entry.entry_id, "db1_home");
        assert_eq!(entry.title, "MySQL: db1/home");
        assert_eq!(entry.source, EntrySource::User);
    }

    #[test]
    fn test_create_entry_rejects_duplicate() {
        let mut registry = EntryRegistry::default();
        registry
            .create_entry(ConnectionConfig::new("db1", "ha", "secret", "home"), EntrySource::User)
            .unwrap();
        let err = registry
            .create_entry(ConnectionConfig::new("db1", "other", "pw", "home"), EntrySource::User)
            .unwrap_err();
        assert!(err.message().contains("already configured"));
        assert_eq!(registry.entries.len(), 1);
    }

    #[test]
    fn test_create_entry_validates() {
        let mut registry = EntryRegistry::default();
        let result =
            registry.create_entry(ConnectionConfig::new("", "ha", "secret", "home"), EntrySource::User);
        assert!(matches!(result, Err(MysqlQueryError::Config(_))));
    }

    #[test]
    fn test_update_entry_keeps_identity() {
        let mut registry = EntryRegistry::default();
        registry
            .create_entry(ConnectionConfig::new("db1", "ha", "secret", "home"), EntrySource::User)
            .unwrap();

        let mut changed = ConnectionConfig::new("db1", "ha", "new-secret", "home");
        changed.autocommit = false;
        let entry = registry.update_entry("db1_home", changed).unwrap();
        assert_eq!(entry.entry_id, "db1_home");
        assert_eq!(entry.config.password, "new-secret");
        assert!(!entry.config.autocommit);

        assert!(matches!(
            registry.update_entry("missing", ConnectionConfig::new("h", "u", "p", "d")),
            Err(MysqlQueryError::InstanceNotFound(_))
        ));
    }

    #[test]
    fn test_remove_entry() {
        let mut registry = EntryRegistry::default();
        registry
            .create_entry(ConnectionConfig::new("db1", "ha", "secret", "home"), EntrySource::User)
            .unwrap();
        let removed = registry.remove_entry("db1_home").unwrap();
        assert_eq!(removed.entry_id, "db1_home");
        assert!(registry.entries.is_empty());
        assert!(registry.remove_entry("db1_home").is_err());
    }

    #[test]
    fn test_stored_entry_resolve_env_var() {
        std::env::set_var("MYSQL_QUERY_TEST_PASSWORD", "from-env");

        let entry = StoredEntry {
            entry_id: "db1_home".to_string(),
            title: "MySQL: db1/home".to_string(),
            source: EntrySource::User,
            config: ConnectionConfig::new("db1", "ha", "", "home"),
            password_env: Some("MYSQL_QUERY_TEST_PASSWORD".to_string()),
        };
        assert_eq!(entry.resolve().unwrap().password, "from-env");

        std::env::remove_var("MYSQL_QUERY_TEST_PASSWORD");
    }

    #[test]
    fn test_stored_entry_resolve_missing_env_var() {
        let entry = StoredEntry {
            entry_id: "db1_home".to_string(),
            title: "MySQL: db1/home".to_string(),
            source: EntrySource::User,
            config: ConnectionConfig::new("db1", "ha", "", "home"),
            password_env: Some("MYSQL_QUERY_NONEXISTENT_VAR".to_string()),
        };
        assert!(entry
            .resolve()
            .unwrap_err()
            .message()
            .contains("Environment variable MYSQL_QUERY_NONEXISTENT_VAR not found"));
    }

    #[test]
    fn test_entry_serialization_is_flat() {
        let mut registry = EntryRegistry::default();
        registry
            .create_entry(ConnectionConfig::new("db1", "ha", "secret", "home"), EntrySource::Import)
            .unwrap();

        let value = serde_json::to_value(&registry).unwrap();
        let entry = &value["entries"][0];
        assert_eq!(entry["entry_id"], "db1_home");
        assert_eq!(entry["host"], "db1");
        assert_eq!(entry["port"], 3306);
        assert_eq!(entry["source"], "import");
        // password_env is omitted when None
        assert!(entry.get("password_env").is_none());
    }

    #[test]
    fn test_save_and_load_round_trip_keeps_order() {
        let path = temp_store("roundtrip");

        let mut registry = EntryRegistry::default();
        registry
            .create_entry(ConnectionConfig::new("db2", "ha", "pw", "energy"), EntrySource::User)
            .unwrap();
        registry
            .create_entry(ConnectionConfig::new("db1", "ha", "pw", "home"), EntrySource::User)
            .unwrap();
        save_registry(&path, &registry).unwrap();

        let loaded = load_registry(&path).unwrap();
        let ids: Vec<&str> = loaded.entries.iter().map(|e| e.entry_id.as_str()).collect();
        assert_eq!(ids, vec!["db2_energy", "db1_home"]);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let registry = load_registry(&temp_store("missing")).unwrap();
        assert!(registry.entries.is_empty());
    }
}
