//! Entry Store Flow Tests
//!
//! Covers the setup flow (test connection before saving), re-configuration, the legacy
//! import and loading the resulting store into a running service context.

mod common;

use common::{home_config, FakeConnector};
use mysql_query::config::flow::{create_entry, test_connection, update_entry};
use mysql_query::config::legacy::{import_legacy, ImportOutcome};
use mysql_query::config::{load_registry, save_registry, EntryRegistry, EntrySource};
use mysql_query::{MysqlQueryError, QueryRequest, ServiceContext};
use pretty_assertions::assert_eq;
use std::path::PathBuf;

fn temp_store(name: &str) -> PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir()
        .join(format!("mysql_query_flow_{name}_{}_{id}", std::process::id()))
        .join("entries.json")
}

#[tokio::test]
async fn test_create_entry_test_connects_first() {
    let connector = FakeConnector::new();
    let mut registry = EntryRegistry::default();

    let entry = create_entry(&connector, &mut registry, home_config()).await.unwrap();
    assert_eq!(entry.entry_id, "db1_home");
    assert_eq!(entry.title, "MySQL: db1/home");

    // The test connection is opened and released again
    assert_eq!(connector.connects(), vec!["home"]);
    assert_eq!(connector.closes(), vec!["home"]);
}

#[tokio::test]
async fn test_create_entry_unreachable_is_not_saved() {
    let connector = FakeConnector::new();
    connector.set_unreachable("db1", true);
    let mut registry = EntryRegistry::default();

    let err = create_entry(&connector, &mut registry, home_config()).await.unwrap_err();
    assert_eq!(err.error_code(), "CONNECT_ERROR");
    assert!(registry.entries.is_empty());
}

#[tokio::test]
async fn test_create_entry_duplicate_is_rejected() {
    let connector = FakeConnector::new();
    let mut registry = EntryRegistry::default();
    create_entry(&connector, &mut registry, home_config()).await.unwrap();

    let err = create_entry(&connector, &mut registry, home_config()).await.unwrap_err();
    assert!(matches!(err, MysqlQueryError::Config(_)));
    assert_eq!(registry.entries.len(), 1);
}

#[tokio::test]
async fn test_connection_rejects_invalid_config_without_connecting() {
    let connector = FakeConnector::new();
    let mut config = home_config();
    config.timeout_secs = 0;

    let err = test_connection(&connector, &config).await.unwrap_err();
    assert_eq!(err.error_code(), "CONFIG_ERROR");
    assert!(connector.connects().is_empty());
}

#[test]
fn test_update_entry_replaces_fields() {
    let mut registry = EntryRegistry::default();
    registry.create_entry(home_config(), EntrySource::User).unwrap();

    let mut changed = home_config();
    changed.charset = Some("utf8mb4".to_string());
    changed.collation = Some(String::new());
    let entry = update_entry(&mut registry, "db1_home", changed).unwrap();

    assert_eq!(entry.config.charset.as_deref(), Some("utf8mb4"));
    assert_eq!(entry.config.collation, None);
}

#[tokio::test]
async fn test_imported_store_serves_queries() {
    let path = temp_store("import");
    let legacy = "mysql_query:\n  mysql_host: db1\n  mysql_username: ha\n  mysql_password: secret\n  mysql_db: home\n";

    let mut registry = load_registry(&path).unwrap();
    assert_eq!(
        import_legacy(&mut registry, legacy).unwrap(),
        ImportOutcome::Imported("db1_home".to_string())
    );
    save_registry(&path, &registry).unwrap();

    // A second start finds the entry already configured
    let mut reloaded = load_registry(&path).unwrap();
    assert_eq!(
        import_legacy(&mut reloaded, legacy).unwrap(),
        ImportOutcome::AlreadyConfigured("db1_home".to_string())
    );
    assert_eq!(reloaded.entries.len(), 1);

    let connector = FakeConnector::new();
    let context = ServiceContext::new(connector.clone());
    let report = context.sync_entries(&reloaded).await;
    assert_eq!(report.set_up, vec!["db1_home"]);

    context.query(&QueryRequest::new("SELECT 1").with_entry("db1_home")).await.unwrap();
    assert_eq!(connector.executed(), vec![("home".to_string(), "SELECT 1".to_string())]);

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}
