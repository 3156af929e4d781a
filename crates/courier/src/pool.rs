//! Connection pool keyed by `(host, port)`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::options::RequestOptions;
use crate::transport::{
    ConnectionSettings, Connector, ReqwestConnector, Transport, WireRequest, WireResponse,
};

type PoolKey = (String, u16);

/// Shared pool of started transports, one per `(host, port)`.
///
/// The lock guards lookup and creation only; requests are dispatched after
/// it is released, so in-flight requests on different (or the same)
/// connections do not wait on each other.
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    options: RequestOptions,
    config: Arc<ClientConfig>,
    connections: Mutex<HashMap<PoolKey, Arc<dyn Transport>>>,
}

impl ConnectionPool {
    /// Pool creating reqwest transports with the given shared options.
    pub fn new(options: RequestOptions, config: Arc<ClientConfig>) -> Self {
        Self::with_connector(Arc::new(ReqwestConnector), options, config)
    }

    /// Pool creating transports through `connector`.
    pub fn with_connector(
        connector: Arc<dyn Connector>,
        options: RequestOptions,
        config: Arc<ClientConfig>,
    ) -> Self {
        Self {
            connector,
            options,
            config,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// The started transport for `uri`'s host and port, created on first use.
    pub fn connection_for(&self, uri: &Url) -> Result<Arc<dyn Transport>, TransportError> {
        let settings = ConnectionSettings::for_url(uri, &self.options, &self.config);
        let key = (settings.host.clone(), settings.port);

        let mut connections = self.connections.lock();
        if let Some(connection) = connections.get(&key) {
            return Ok(Arc::clone(connection));
        }

        let connection = self.connector.connect(&settings)?;
        connection.start()?;
        tracing::debug!(host = %key.0, port = key.1, "opened pooled connection");
        connections.insert(key, Arc::clone(&connection));

        Ok(connection)
    }

    /// Send `request` over the pooled connection for `uri`.
    pub async fn send_request(
        &self,
        uri: &Url,
        request: WireRequest,
    ) -> Result<WireResponse, TransportError> {
        let connection = self.connection_for(uri)?;
        connection.send(request).await
    }

    /// Close every pooled connection and empty the pool.
    pub fn shutdown(&self) {
        let drained: Vec<_> = self.connections.lock().drain().collect();
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "shutting down pooled connections");
        }
        for (_, connection) in drained {
            connection.finish();
        }
    }

    /// Number of open connections.
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Whether the pool holds no connections.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("connections", &self.len())
            .finish()
    }
}
