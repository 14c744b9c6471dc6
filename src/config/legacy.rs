//! Legacy bulk configuration import.
//!
//! Older installations configured a single instance in a YAML file:
//!
//! ```yaml
//! mysql_query:
//!   mysql_host: db1
//!   mysql_username: ha
//!   mysql_password: secret
//!   mysql_db: home
//!   mysql_timeout: 10
//! ```
//!
//! The section is converted once into a regular entry. Importing the same section again
//! is a no-op because the entry id already exists.

use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::Path;

use crate::config::{EntryRegistry, EntrySource};
use crate::engine::{ConnectionConfig, DEFAULT_PORT, DEFAULT_TIMEOUT_SECS};
use crate::error::{MysqlQueryError, Result};

/// Top-level key of the legacy section
pub const LEGACY_SECTION: &str = "mysql_query";

#[derive(Debug, Deserialize)]
struct LegacyFile {
    #[serde(default)]
    mysql_query: Option<LegacySection>,
}

#[derive(Debug, Deserialize)]
struct LegacySection {
    mysql_host: String,
    mysql_username: String,
    mysql_password: String,
    mysql_db: String,
    #[serde(default)]
    mysql_port: Option<u16>,
    #[serde(default = "default_timeout", deserialize_with = "coerce_u64")]
    mysql_timeout: u64,
}

const fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Accept `10` as well as `"10"`
fn coerce_u64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(u64),
        Text(String),
    }

    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) => Ok(n),
        NumberOrText::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Result of a legacy import
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// A new entry was created
    Imported(String),
    /// An entry with the same id already exists
    AlreadyConfigured(String),
    /// The document has no legacy section
    NoSection,
}

/// Parse the legacy section of a YAML document
pub fn parse_legacy(contents: &str) -> Result<Option<ConnectionConfig>> {
    let file: LegacyFile = serde_yaml::from_str(contents)
        .map_err(|e| MysqlQueryError::config(format!("Invalid legacy configuration: {e}")))?;

    Ok(file.mysql_query.map(|section| ConnectionConfig {
        port: section.mysql_port.unwrap_or(DEFAULT_PORT),
        timeout_secs: section.mysql_timeout,
        ..ConnectionConfig::new(
            section.mysql_host,
            section.mysql_username,
            section.mysql_password,
            section.mysql_db,
        )
    }))
}

/// Convert the legacy section of `contents` into an entry
pub fn import_legacy(registry: &mut EntryRegistry, contents: &str) -> Result<ImportOutcome> {
    let Some(config) = parse_legacy(contents)? else {
        return Ok(ImportOutcome::NoSection);
    };

    let config = config.normalized();
    let entry_id = config.unique_id();
    if registry.contains(&entry_id) {
        return Ok(ImportOutcome::AlreadyConfigured(entry_id));
    }

    let entry = registry.create_entry(config, EntrySource::Import)?;
    tracing::warn!(
        entry = %entry.entry_id,
        "Imported {LEGACY_SECTION} settings from the legacy configuration file. \
         Remove the '{LEGACY_SECTION}' section from that file to complete the migration."
    );
    Ok(ImportOutcome::Imported(entry.entry_id.clone()))
}

/// Read `path` and import its legacy section
pub fn import_legacy_file(registry: &mut EntryRegistry, path: &Path) -> Result<ImportOutcome> {
    let contents = fs::read_to_string(path).map_err(|e| {
        MysqlQueryError::config(format!("Could not read legacy configuration file: {e}"))
    })?;
    import_legacy(registry, &contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = r#"
homeassistant:
  name: Home
mysql_query:
  mysql_host: db1
  mysql_username: ha
  mysql_password: secret
  mysql_db: home
"#;

    #[test]
    fn test_parse_legacy_defaults() {
        let config = parse_legacy(LEGACY).unwrap().unwrap();
        assert_eq!(config.host, "db1");
        assert_eq!(config.port, 3306);
        assert_eq!(config.timeout_secs, 10);
        assert!(config.autocommit);
    }

    #[test]
    fn test_parse_legacy_coerces_timeout() {
        let yaml = "mysql_query:\n  mysql_host: db1\n  mysql_username: ha\n  mysql_password: pw\n  mysql_db: home\n  mysql_timeout: \"25\"\n  mysql_port: 3307\n";
        let config = parse_legacy(yaml).unwrap().unwrap();
        assert_eq!(config.timeout_secs, 25);
        assert_eq!(config.port, 3307);
    }

    #[test]
    fn test_parse_legacy_missing_field() {
        let yaml = "mysql_query:\n  mysql_host: db1\n";
        assert!(matches!(parse_legacy(yaml), Err(MysqlQueryError::Config(_))));
    }

    #[test]
    fn test_import_without_section() {
        let mut registry = EntryRegistry::default();
        assert_eq!(
            import_legacy(&mut registry, "homeassistant:\n  name: Home\n").unwrap(),
            ImportOutcome::NoSection
        );
        assert!(registry.entries.is_empty());
    }

    #[test]
    fn test_import_runs_once() {
        let mut registry = EntryRegistry::default();
        assert_eq!(
            import_legacy(&mut registry, LEGACY).unwrap(),
            ImportOutcome::Imported("db1_home".to_string())
        );
        assert_eq!(
            import_legacy(&mut registry, LEGACY).unwrap(),
            ImportOutcome::AlreadyConfigured("db1_home".to_string())
        );

        assert_eq!(registry.entries.len(), 1);
        let entry = &registry.entries[0];
        assert_eq!(entry.source, EntrySource::Import);
        assert_eq!(entry.title, "MySQL: db1/home (Imported)");
    }

    #[test]
    fn test_import_trims_host_for_entry_id() {
        let yaml = "mysql_query:\n  mysql_host: \"  db1  \"\n  mysql_username: ha\n  mysql_password: pw\n  mysql_db: home\n";
        let mut registry = EntryRegistry::default();
        assert_eq!(
            import_legacy(&mut registry, yaml).unwrap(),
            ImportOutcome::Imported("db1_home".to_string())
        );

        let entry = registry.get("db1_home").unwrap();
        assert_eq!(entry.config.host, "db1");
        assert_eq!(entry.entry_id, entry.config.unique_id());

        assert_eq!(
            import_legacy(&mut registry, yaml).unwrap(),
            ImportOutcome::AlreadyConfigured("db1_home".to_string())
        );
    }
}
