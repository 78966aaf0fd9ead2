use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    api::ApiClient,
    config::{ClientConfig, ConnectOptions},
    connection::Connection,
    error::Result,
};

/// One signed-in user: the REST client plus the lazily opened real-time
/// connection.
///
/// The connection is cached until it reaches a terminal state (closed, out of
/// reconnect attempts, or refused authentication); the next call to
/// [`Session::connection`] then opens a fresh one.
pub struct Session {
    config: ClientConfig,
    options: ConnectOptions,
    api: ApiClient,
    connection: Mutex<Option<Arc<Connection>>>,
}

impl Session {
    pub fn new(config: ClientConfig, token: impl Into<String>) -> Result<Self> {
        let api = ApiClient::new(&config, token)?;
        Ok(Self {
            config,
            options: ConnectOptions::default(),
            api,
            connection: Mutex::new(None),
        })
    }

    pub fn with_options(mut self, options: ConnectOptions) -> Self {
        self.options = options;
        self
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub async fn connection(&self) -> Result<Arc<Connection>> {
        let mut slot = self.connection.lock().await;
        if let Some(connection) = slot.as_ref() {
            if !connection.state().is_terminal() {
                return Ok(connection.clone());
            }
            tracing::debug!(state = ?connection.state(), "discarding dead connection");
            *slot = None;
        }

        let connection = Arc::new(
            Connection::connect(&self.config, self.api.token(), self.options.clone()).await?,
        );
        *slot = Some(connection.clone());
        Ok(connection)
    }

    /// The cached connection, if one is open. Never connects.
    pub async fn current_connection(&self) -> Option<Arc<Connection>> {
        self.connection
            .lock()
            .await
            .as_ref()
            .filter(|connection| !connection.state().is_terminal())
            .cloned()
    }

    pub async fn disconnect(&self) {
        let connection = self.connection.lock().await.take();
        if let Some(connection) = connection {
            connection.disconnect().await;
        }
    }
}
