//! mysql-query CLI Entry Point
//!
//! Subcommands:
//! - `serve` - run the JSON-RPC service server over stdio
//! - `setup` - interactive wizard that adds an instance entry
//! - `configure` - re-edit an existing entry
//! - `remove` - delete an entry
//! - `list` - print configured entries as JSON (passwords omitted)
//!
//! Stdout carries JSON only. Logs go to stderr.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input, Password};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mysql_query::config::flow;
use mysql_query::config::legacy::{import_legacy_file, ImportOutcome};
use mysql_query::config::{default_registry_path, load_registry, save_registry, REGISTRY_ENV};
use mysql_query::engine::{DEFAULT_AUTOCOMMIT, DEFAULT_PORT, DEFAULT_TIMEOUT_SECS};
use mysql_query::{ConnectionConfig, EntryRegistry, MySqlConnector, ServiceContext};

/// mysql-query - ad-hoc MySQL query and execute services
#[derive(Parser)]
#[command(name = "mysql-query")]
#[command(about = "Ad-hoc MySQL query and execute services for home-automation hosts")]
#[command(version)]
struct Cli {
    /// Entry store location
    #[arg(long, global = true, env = REGISTRY_ENV)]
    registry: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the query and execute services as JSON-RPC over stdio
    Serve {
        /// YAML file with a legacy `mysql_query:` section to import before serving
        #[arg(long)]
        legacy_config: Option<PathBuf>,
    },

    /// Add a MySQL instance (test-connects before saving)
    Setup,

    /// Change the settings of an existing instance
    Configure {
        /// Entry id (`host_database`)
        entry: String,
    },

    /// Remove an instance
    Remove {
        /// Entry id (`host_database`)
        entry: String,
    },

    /// List configured instances
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    mysql_query::init_logging(&cli.log_level);

    let registry_path = match cli.registry {
        Some(path) => path,
        None => default_registry_path()?,
    };

    match cli.command {
        Commands::Serve { legacy_config } => serve(&registry_path, legacy_config.as_deref()).await,
        Commands::Setup => setup(&registry_path).await,
        Commands::Configure { entry } => configure(&registry_path, &entry),
        Commands::Remove { entry } => remove(&registry_path, &entry),
        Commands::List => list(&registry_path),
    }
}

async fn serve(registry_path: &Path, legacy_config: Option<&Path>) -> Result<()> {
    let mut registry = load_registry(registry_path)?;

    if let Some(legacy_path) = legacy_config {
        match import_legacy_file(&mut registry, legacy_path)? {
            ImportOutcome::Imported(_) => save_registry(registry_path, &registry)?,
            ImportOutcome::AlreadyConfigured(id) => {
                tracing::debug!(entry = %id, "Legacy section already imported");
            }
            ImportOutcome::NoSection => {
                tracing::debug!(path = %legacy_path.display(), "No legacy section found");
            }
        }
    }

    let context = Arc::new(ServiceContext::new(MySqlConnector));
    let report = context.sync_entries(&registry).await;
    for (id, reason) in &report.failed {
        tracing::error!(instance = %id, "Instance not available: {reason}");
    }
    tracing::info!(instances = report.set_up.len(), "Serving on stdio");

    mysql_query::server::serve(context, registry_path.to_path_buf()).await
}

async fn setup(registry_path: &Path) -> Result<()> {
    let mut registry = load_registry(registry_path)?;

    let template = ConnectionConfig::new("", "", "", "");
    let config = prompt_config(&template, false)?;

    let entry = flow::create_entry(&MySqlConnector, &mut registry, config).await?;
    save_registry(registry_path, &registry)?;

    println!("{}", serde_json::json!({ "entry_id": entry.entry_id, "title": entry.title }));
    Ok(())
}

fn configure(registry_path: &Path, entry_id: &str) -> Result<()> {
    let mut registry = load_registry(registry_path)?;
    let current = registry
        .get(entry_id)
        .with_context(|| format!("No entry with id '{entry_id}'"))?
        .config
        .clone();

    let config = prompt_config(&current, true)?;
    let entry = flow::update_entry(&mut registry, entry_id, config)?;
    save_registry(registry_path, &registry)?;

    println!("{}", serde_json::json!({ "entry_id": entry.entry_id, "title": entry.title }));
    Ok(())
}

fn remove(registry_path: &Path, entry_id: &str) -> Result<()> {
    let mut registry = load_registry(registry_path)?;
    let removed = registry.remove_entry(entry_id)?;
    save_registry(registry_path, &registry)?;

    tracing::info!(entry = %removed.entry_id, "Entry removed");
    println!("{}", serde_json::json!({ "removed": removed.entry_id }));
    Ok(())
}

fn list(registry_path: &Path) -> Result<()> {
    let registry = load_registry(registry_path)?;
    println!("{}", serde_json::to_string_pretty(&redacted_listing(&registry)?)?);
    Ok(())
}

/// Entries as JSON without their passwords
fn redacted_listing(registry: &EntryRegistry) -> Result<serde_json::Value> {
    let mut entries = Vec::with_capacity(registry.entries.len());
    for entry in &registry.entries {
        let mut value = serde_json::to_value(entry)?;
        if let Some(map) = value.as_object_mut() {
            map.remove("password");
        }
        entries.push(value);
    }
    Ok(serde_json::json!({ "entries": entries }))
}

/// Prompt every connection field, using `current` values as defaults
///
/// With `keep_password`, an empty password input keeps the current password.
fn prompt_config(current: &ConnectionConfig, keep_password: bool) -> Result<ConnectionConfig> {
    let host = prompt_text("Host", &current.host, false)?;
    let port: u16 = Input::new()
        .with_prompt("Port")
        .default(if current.port == 0 { DEFAULT_PORT } else { current.port })
        .interact_text()?;
    let username = prompt_text("Username", &current.username, false)?;

    let password_prompt = if keep_password { "Password (empty keeps current)" } else { "Password" };
    let password = Password::new()
        .with_prompt(password_prompt)
        .allow_empty_password(true)
        .interact()?;
    let password = if keep_password && password.is_empty() { current.password.clone() } else { password };

    let database = prompt_text("Database", &current.database, false)?;
    let timeout_secs: u64 = Input::new()
        .with_prompt("Connect timeout (seconds)")
        .default(if current.timeout_secs == 0 { DEFAULT_TIMEOUT_SECS } else { current.timeout_secs })
        .interact_text()?;

    let charset = optional(prompt_text("Charset (empty for server default)", current.charset.as_deref().unwrap_or(""), true)?);
    let collation = optional(prompt_text("Collation (empty for server default)", current.collation.as_deref().unwrap_or(""), true)?);

    let autocommit = Confirm::new()
        .with_prompt("Autocommit")
        .default(if keep_password { current.autocommit } else { DEFAULT_AUTOCOMMIT })
        .interact()?;

    if host.trim().is_empty() || database.trim().is_empty() {
        bail!("Host and database are required");
    }

    Ok(ConnectionConfig {
        host,
        port,
        username,
        password,
        database,
        timeout_secs,
        charset,
        collation,
        autocommit,
    })
}

fn prompt_text(prompt: &str, default: &str, allow_empty: bool) -> Result<String> {
    let mut input = Input::<String>::new().with_prompt(prompt).allow_empty(allow_empty);
    if !default.is_empty() {
        input = input.default(default.to_string());
    }
    Ok(input.interact_text()?)
}

fn optional(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
