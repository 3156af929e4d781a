//! Base for typed API clients.

use std::sync::Arc;

use courier_log::spans::{instrument_future, record_status, request_span, Timer};
use parking_lot::Mutex;
use serde_json::Value;

use crate::client::Client;
use crate::config::{self, ClientConfig};
use crate::error::{Error, Result};
use crate::options::RequestOptions;
use crate::response::Response;
use crate::transport::{Connector, Method};

/// Post-processing applied to every response, e.g. to turn API-level
/// failures into errors.
pub type ResponseHook = Arc<dyn Fn(Method, &str, Response) -> Result<Response> + Send + Sync>;

/// A client for one HTTP API rooted at a base URL.
///
/// Calls take paths relative to the base URL. Without [`ApiClient::connect`]
/// every call uses a fresh connection; after it, calls share one persistent
/// session until [`ApiClient::disconnect`].
///
/// ```no_run
/// # async fn run() -> courier::Result<()> {
/// use courier::{ApiClient, RequestOptions};
/// use serde_json::json;
///
/// let api = ApiClient::new("https://api.example.com/v1")
///     .options(RequestOptions::new().json(true).header("X-Token", "secret"));
///
/// api.connect()?;
/// let user = api.get("/users/1", &json!({}), &RequestOptions::default()).await?;
/// let created = api.post("/users", &json!({"name": "ana"}), &RequestOptions::default()).await?;
/// api.disconnect();
/// # Ok(())
/// # }
/// ```
pub struct ApiClient {
    base_url: String,
    options: RequestOptions,
    config: Option<Arc<ClientConfig>>,
    connector: Option<Arc<dyn Connector>>,
    hook: Option<ResponseHook>,
    session: Mutex<Option<Arc<Client>>>,
}

impl ApiClient {
    /// API rooted at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            options: RequestOptions::default(),
            config: None,
            connector: None,
            hook: None,
            session: Mutex::new(None),
        }
    }

    /// Options applied under every call's options.
    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Use this configuration instead of the process-wide one.
    pub fn config(mut self, config: Arc<ClientConfig>) -> Self {
        self.config = Some(config);
        self
    }

    /// Create transports through `connector`.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Pass every response through `hook`.
    pub fn on_response<F>(mut self, hook: F) -> Self
    where
        F: Fn(Method, &str, Response) -> Result<Response> + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// The base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether a persistent session is open.
    pub fn is_connected(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Open a persistent session used by subsequent calls.
    pub fn connect(&self) -> Result<()> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Err(Error::InvalidState(format!("already connected to {}", self.base_url)));
        }

        let client = self.client(&self.base_url, self.options.clone().persistent(true))?;
        client.open()?;
        tracing::info!(base_url = %self.base_url, "connected");
        *session = Some(Arc::new(client));
        Ok(())
    }

    /// Close the persistent session, if any.
    pub fn disconnect(&self) {
        if let Some(client) = self.session.lock().take() {
            client.close();
            tracing::info!(base_url = %self.base_url, "disconnected");
        }
    }

    /// GET `path`, with `params` as the query.
    pub async fn get(
        &self,
        path: &str,
        params: &Value,
        options: &RequestOptions,
    ) -> Result<Response> {
        self.request(Method::Get, path, params, options).await
    }

    /// POST `params` to `path`.
    pub async fn post(
        &self,
        path: &str,
        params: &Value,
        options: &RequestOptions,
    ) -> Result<Response> {
        self.request(Method::Post, path, params, options).await
    }

    /// PUT `params` to `path`.
    pub async fn put(
        &self,
        path: &str,
        params: &Value,
        options: &RequestOptions,
    ) -> Result<Response> {
        self.request(Method::Put, path, params, options).await
    }

    /// PATCH `params` to `path`.
    pub async fn patch(
        &self,
        path: &str,
        params: &Value,
        options: &RequestOptions,
    ) -> Result<Response> {
        self.request(Method::Patch, path, params, options).await
    }

    /// DELETE `path`.
    pub async fn delete(
        &self,
        path: &str,
        params: &Value,
        options: &RequestOptions,
    ) -> Result<Response> {
        self.request(Method::Delete, path, params, options).await
    }

    /// Send `method` to `path` under the base URL.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: &Value,
        options: &RequestOptions,
    ) -> Result<Response> {
        let url = self.url(path);
        let options = self.options.merge(options);
        let span = request_span(method.as_str(), &url);

        let call = async {
            tracing::info!("{} {}", method, path);
            let timer = Timer::start(format!("{} {}", method, path));

            let session = self.session.lock().clone();
            let response = match session {
                Some(client) => client.request(method, &url, params, &options).await?,
                None => {
                    let client = self.client(&url, options.clone())?;
                    client.request(method, &url, params, &options).await?
                }
            };

            let elapsed = timer.finish();
            record_status(&tracing::Span::current(), response.status());
            tracing::info!(
                status = response.status(),
                "got response in {:.2} secs",
                elapsed.as_secs_f64()
            );
            Ok::<_, Error>(response)
        };
        let response = instrument_future(call, span).await?;

        match &self.hook {
            Some(hook) => hook(method, path, response),
            None => Ok(response),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn client(&self, uri: &str, options: RequestOptions) -> Result<Client> {
        let mut builder = Client::builder(uri)
            .options(options)
            .config(self.config.clone().unwrap_or_else(config::shared));
        if let Some(connector) = &self.connector {
            builder = builder.connector(Arc::clone(connector));
        }
        builder.build()
    }
}

impl Drop for ApiClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("connected", &self.is_connected())
            .finish()
    }
}
