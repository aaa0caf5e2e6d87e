//! Lazily connected, shared admin connection

use std::sync::Arc;

use parking_lot::RwLock as SyncRwLock;
use secrecy::ExposeSecret;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{ConnectionConfig, ConnectionSettings};
use crate::connection::{Connection, Connector};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::sanitize::{REDACTED, SecretValues};

#[derive(Default)]
struct State {
    config: Option<ConnectionConfig>,
    settings: Option<ConnectionSettings>,
    connection: Option<Arc<dyn Connection>>,
}

/// Owns the plugin's connection configuration and its single shared handle.
///
/// The handle is opened on first use and reused by every caller until the
/// producer is re-initialised or closed.
pub struct ConnectionProducer {
    connector: Arc<dyn Connector>,
    state: RwLock<State>,
    // Kept outside `state`: the state lock is held across connects.
    secrets: SyncRwLock<SecretValues>,
}

impl std::fmt::Debug for ConnectionProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProducer").finish_non_exhaustive()
    }
}

impl ConnectionProducer {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            state: RwLock::new(State::default()),
            secrets: SyncRwLock::new(SecretValues::new()),
        }
    }

    /// Parse `raw`, replace the current configuration and drop any open handle.
    ///
    /// With `verify` set, a connection is opened and pinged before returning.
    pub async fn init(
        &self,
        ctx: &Context,
        raw: &serde_json::Value,
        verify: bool,
    ) -> Result<ConnectionConfig> {
        let config = ConnectionConfig::from_value(raw)?;
        let settings = config.settings()?;
        // Secrets of replaced configurations stay registered.
        self.secrets.write().extend(config_secrets(&config, &settings));

        let previous = {
            let mut state = self.state.write().await;
            state.config = Some(config.clone());
            state.settings = Some(settings);
            state.connection.take()
        };
        if let Some(previous) = previous {
            debug!("Closing connection from previous configuration");
            if let Err(e) = previous.close().await {
                warn!(error = %e, "Failed to close previous connection");
            }
        }

        if verify {
            let conn = self.connection(ctx).await?;
            ctx.guard(conn.ping())
                .await?
                .map_err(Error::Connection)?;
            info!("Connection verified");
        }

        Ok(config)
    }

    /// The shared handle, connecting on first use.
    pub async fn connection(&self, ctx: &Context) -> Result<Arc<dyn Connection>> {
        if let Some(conn) = &self.state.read().await.connection {
            return Ok(Arc::clone(conn));
        }

        let mut state = self.state.write().await;
        // Another caller may have connected while we waited for the write lock.
        if let Some(conn) = &state.connection {
            return Ok(Arc::clone(conn));
        }
        let settings = state.settings.as_ref().ok_or(Error::NotInitialized)?;
        let conn = ctx
            .guard(self.connector.connect(settings))
            .await?
            .map_err(Error::Connection)?;
        debug!(
            max_open = settings.max_open_connections,
            max_idle = settings.max_idle_connections,
            "Opened admin connection"
        );
        state.connection = Some(Arc::clone(&conn));
        Ok(conn)
    }

    /// Close and forget the open handle; configuration is kept.
    pub async fn close(&self) -> Result<()> {
        let conn = self.state.write().await.connection.take();
        match conn {
            Some(conn) => conn.close().await.map_err(Error::Connection),
            None => Ok(()),
        }
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.read().await.config.is_some()
    }

    /// Admin password and rendered DSN, mapped to [`REDACTED`].
    ///
    /// Synchronous and never blocked by a connect in flight, so it can be
    /// called from any error path.
    pub fn secret_values(&self) -> SecretValues {
        self.secrets.read().clone()
    }
}

fn config_secrets(config: &ConnectionConfig, settings: &ConnectionSettings) -> SecretValues {
    let mut secrets = SecretValues::new();
    if let Some(password) = config.password() {
        secrets.insert(password, REDACTED);
    }
    let dsn = settings.dsn.expose_secret();
    if config.connection_url != dsn {
        secrets.insert(dsn, REDACTED);
    }
    secrets
}
