//! Connection Manager
//!
//! Owns one long-lived session per configured instance and opens short-lived override
//! sessions for queries that target another database on the same server.
//!
//! Instances keep their registration order; the first registered instance is the
//! fallback target when a call names none.

use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::engine::{ConnectionConfig, Connector, Session};
use crate::error::{MysqlQueryError, Result};

/// A configured instance and its long-lived session slot
pub struct Instance<S> {
    id: String,
    config: ConnectionConfig,
    handle: Mutex<Option<S>>,
}

impl<S> Instance<S> {
    /// Instance identifier (the entry id)
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Connection parameters the instance was set up with
    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Exclusive access to the long-lived session slot
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, Option<S>> {
        self.handle.lock().await
    }
}

/// Opens, health-checks and closes sessions for all configured instances
pub struct ConnectionManager<C: Connector> {
    connector: C,
    instances: RwLock<Vec<Arc<Instance<C::Session>>>>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager with no instances
    pub fn new(connector: C) -> Self {
        Self { connector, instances: RwLock::new(Vec::new()) }
    }

    /// Open a new session for `config`
    pub async fn open(&self, config: &ConnectionConfig) -> Result<C::Session> {
        config.validate()?;
        self.connector.connect(config).await.map_err(|e| match e {
            MysqlQueryError::Connect(_) => e,
            MysqlQueryError::Engine { message, .. } => MysqlQueryError::connect(message),
            other => other,
        })
    }

    /// Return a usable session from `slot`, reconnecting once if it went stale
    pub async fn ensure_alive<'a>(
        &self,
        slot: &'a mut Option<C::Session>,
        config: &ConnectionConfig,
    ) -> Result<&'a mut C::Session> {
        let alive = match slot.as_mut() {
            Some(session) => session.ping().await.is_ok(),
            None => false,
        };

        if !alive {
            if let Some(stale) = slot.take() {
                tracing::info!(host = %config.host, database = %config.database, "Connection lost, reconnecting");
                self.close(stale).await;
            }
            let session = self.open(config).await?;
            *slot = Some(session);
        }

        slot.as_mut().ok_or_else(|| MysqlQueryError::connect("no session available"))
    }

    /// Open a short-lived session against another database of the same server
    ///
    /// The caller must pass the session to [`close`](Self::close) once the statement is done.
    pub async fn open_override(&self, base: &ConnectionConfig, database: &str) -> Result<C::Session> {
        tracing::debug!(host = %base.host, database = %database, "Opening override connection");
        self.open(&base.with_database(database)).await
    }

    /// Release a session; failures are logged and swallowed
    pub async fn close(&self, session: C::Session) {
        let database = session.database().to_string();
        if let Err(e) = session.close().await {
            tracing::warn!(database = %database, "Error while closing connection: {e}");
        }
    }

    /// Open the long-lived session of an instance and register it
    ///
    /// An existing instance with the same id is torn down first.
    pub async fn setup_instance(&self, id: impl Into<String>, config: ConnectionConfig) -> Result<()> {
        let id = id.into();
        let session = self.open(&config).await?;

        let replaced = {
            let mut instances = self.instances.write().await;
            let instance = Arc::new(Instance { id: id.clone(), config, handle: Mutex::new(Some(session)) });
            match instances.iter().position(|existing| existing.id == id) {
                Some(idx) => Some(std::mem::replace(&mut instances[idx], instance)),
                None => {
                    instances.push(instance);
                    None
                }
            }
        };

        if let Some(old) = replaced {
            self.release(&old).await;
        }

        tracing::info!(instance = %id, "Instance is set up");
        Ok(())
    }

    /// Remove an instance and close its session; `false` if it was not registered
    pub async fn teardown_instance(&self, id: &str) -> bool {
        let removed = {
            let mut instances = self.instances.write().await;
            instances.iter().position(|instance| instance.id == id).map(|idx| instances.remove(idx))
        };

        match removed {
            Some(instance) => {
                self.release(&instance).await;
                tracing::info!(instance = %id, "Instance torn down");
                true
            }
            None => false,
        }
    }

    /// Close every instance session
    pub async fn shutdown(&self) {
        let instances: Vec<_> = self.instances.write().await.drain(..).collect();
        for instance in instances {
            self.release(&instance).await;
        }
    }

    /// Pick the instance a call should run against
    pub async fn resolve(&self, target: Option<&str>) -> Result<Arc<Instance<C::Session>>> {
        let instances = self.instances.read().await;

        if let Some(id) = target {
            return instances
                .iter()
                .find(|instance| instance.id == id)
                .cloned()
                .ok_or_else(|| MysqlQueryError::instance_not_found(id));
        }

        let first = instances.first().cloned().ok_or(MysqlQueryError::NoInstanceAvailable)?;
        if instances.len() > 1 {
            tracing::warn!(
                instance = %first.id,
                configured = instances.len(),
                "No config_entry given while several instances are configured; using the first one"
            );
        }
        Ok(first)
    }

    /// Registered instance ids and configs, in registration order
    pub async fn instances(&self) -> Vec<(String, ConnectionConfig)> {
        self.instances
            .read()
            .await
            .iter()
            .map(|instance| (instance.id.clone(), instance.config.clone()))
            .collect()
    }

    /// Close the long-lived session of an instance; safe to call more than once
    async fn release(&self, instance: &Instance<C::Session>) {
        let session = instance.handle.lock().await.take();
        if let Some(session) = session {
            self.close(session).await;
        }
    }
}
