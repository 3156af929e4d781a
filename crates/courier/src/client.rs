//! Client bound to a single origin.

use std::net::IpAddr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use url::Url;

use crate::codec::encode::is_empty;
use crate::codec::encode_body;
use crate::config::{self, ClientConfig};
use crate::error::{Error, Result, RetryBudget, TransportError};
use crate::options::RequestOptions;
use crate::pool::ConnectionPool;
use crate::response::Response;
use crate::transport::{
    header_map, ConnectionSettings, Connector, Method, ReqwestConnector, Transport, WireRequest,
    WireResponse,
};
use crate::uri;

const CONTENT_TYPE_JSON: &str = "application/json";
const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

enum Link {
    Exclusive(Arc<dyn Transport>),
    Pooled { pool: Arc<ConnectionPool>, owned: bool },
}

/// An HTTP client bound to one origin (scheme, host and explicit port).
///
/// Requests resolving to any other origin, including redirect targets, fail
/// with [`Error::OriginMismatch`] before anything is sent.
pub struct Client {
    root: Url,
    origin: String,
    options: RequestOptions,
    config: Arc<ClientConfig>,
    link: Link,
    last_response: Mutex<Option<Response>>,
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    uri: String,
    options: RequestOptions,
    config: Option<Arc<ClientConfig>>,
    connector: Option<Arc<dyn Connector>>,
    pool: Option<Arc<ConnectionPool>>,
}

impl ClientBuilder {
    /// Base options applied under every call's options.
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

    /// Share `pool` instead of owning a connection.
    ///
    /// The client never shuts down a pool it was handed.
    pub fn pool(mut self, pool: Arc<ConnectionPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Resolve the URI and acquire the connection.
    pub fn build(self) -> Result<Client> {
        let root = uri::parse_absolute(&self.uri)?;
        let config = self.config.unwrap_or_else(config::shared);
        let connector = self.connector.unwrap_or_else(|| Arc::new(ReqwestConnector));

        // a query or body given at init time has no meaning for later calls
        let mut options = self.options;
        options.query = None;
        options.body = None;

        let link = match self.pool {
            Some(pool) => Link::Pooled { pool, owned: false },
            None if options.is_persistent() => Link::Pooled {
                pool: Arc::new(ConnectionPool::with_connector(
                    connector,
                    options.clone(),
                    Arc::clone(&config),
                )),
                owned: true,
            },
            None => {
                let settings = ConnectionSettings::for_url(&root, &options, &config);
                Link::Exclusive(connector.connect(&settings)?)
            }
        };

        if let Link::Pooled { pool, .. } = &link {
            pool.connection_for(&root)?;
        }

        let persistent = matches!(link, Link::Pooled { .. });
        tracing::debug!(uri = %root, persistent, "client initialized");

        Ok(Client {
            origin: uri::scheme_and_host(&root),
            root,
            options,
            config,
            link,
            last_response: Mutex::new(None),
        })
    }
}

impl Client {
    /// Bind a client to `uri` using the process-wide configuration.
    pub fn init(uri: &str, options: &RequestOptions) -> Result<Self> {
        Self::builder(uri).options(options.clone()).build()
    }

    /// Start building a client for `uri`.
    pub fn builder(uri: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            uri: uri.into(),
            options: RequestOptions::default(),
            config: None,
            connector: None,
            pool: None,
        }
    }

    /// The `scheme://host[:port]` this client is bound to.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The URI the client was created with.
    pub fn root(&self) -> &Url {
        &self.root
    }

    /// Open the long-lived connection.
    pub fn open(&self) -> Result<()> {
        match &self.link {
            Link::Exclusive(transport) => transport.start()?,
            Link::Pooled { pool, .. } => {
                pool.connection_for(&self.root)?;
            }
        }
        Ok(())
    }

    /// Release the connection. A shared pool is left untouched.
    pub fn close(&self) {
        match &self.link {
            Link::Exclusive(transport) => transport.finish(),
            Link::Pooled { pool, owned: true } => pool.shutdown(),
            Link::Pooled { owned: false, .. } => {}
        }
    }

    /// The last completed response.
    pub fn response(&self) -> Result<Response> {
        self.last_response.lock().clone().ok_or(Error::NoResponse)
    }

    /// Issue a GET, following redirects as allowed by `options.follow`.
    pub async fn get(&self, path: &str, options: &RequestOptions) -> Result<Response> {
        self.get_merged(path, self.options.merge(options)).await
    }

    async fn get_merged(&self, path: &str, options: RequestOptions) -> Result<Response> {
        let url = self.resolve(path, options.query.as_ref())?;
        let (body, content_type) = match &options.body {
            Some(body) => encode_payload(body, options.is_json())?,
            None => (None, None),
        };

        let mut retries = self.retry_budget(&options);
        let mut current = url.clone();
        let request = self.wire_request(Method::Get, url, body, content_type, &options)?;
        let mut response = self.dispatch(request, options.ip, &mut retries).await?;

        let budget = options.follow_setting().budget(self.config.follow_limit);
        for hop in 1..=budget {
            if !response.is_redirect() {
                break;
            }
            let Some(location) = response.location() else {
                break;
            };

            let next = current
                .join(location)
                .map_err(|e| Error::InvalidUri(format!("{}: {}", location, e)))?;
            self.check_origin(&next)?;
            tracing::debug!(hop, budget, from = %current, to = %next, "following redirect");

            let request = self.wire_request(Method::Get, next.clone(), None, None, &options)?;
            current = next;
            response = self.dispatch(request, options.ip, &mut retries).await?;
        }

        Ok(response)
    }

    /// Issue a request with `data` as its payload.
    ///
    /// GET folds `data` into the query, or into the body when `json` is set.
    /// Other verbs never follow redirects.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        data: &Value,
        options: &RequestOptions,
    ) -> Result<Response> {
        let options = self.options.merge(options);
        if method == Method::Get {
            return self.get_merged(path, fold_get_data(data, options)).await;
        }

        let url = self.resolve(path, options.query.as_ref())?;
        let payload = if is_empty(data) { options.body.as_ref() } else { Some(data) };
        let (body, content_type) = match payload {
            Some(payload) => encode_payload(payload, options.is_json())?,
            None => (None, None),
        };

        let mut retries = self.retry_budget(&options);
        let request = self.wire_request(method, url, body, content_type, &options)?;
        self.dispatch(request, options.ip, &mut retries).await
    }

    /// POST `data` to `path`.
    pub async fn post(
        &self,
        path: &str,
        data: &Value,
        options: &RequestOptions,
    ) -> Result<Response> {
        self.request(Method::Post, path, data, options).await
    }

    /// PUT `data` to `path`.
    pub async fn put(
        &self,
        path: &str,
        data: &Value,
        options: &RequestOptions,
    ) -> Result<Response> {
        self.request(Method::Put, path, data, options).await
    }

    /// PATCH `data` to `path`.
    pub async fn patch(
        &self,
        path: &str,
        data: &Value,
        options: &RequestOptions,
    ) -> Result<Response> {
        self.request(Method::Patch, path, data, options).await
    }

    /// DELETE `path`, sending `data` as the body.
    pub async fn delete(
        &self,
        path: &str,
        data: &Value,
        options: &RequestOptions,
    ) -> Result<Response> {
        self.request(Method::Delete, path, data, options).await
    }

    fn resolve(&self, path: &str, query: Option<&Value>) -> Result<Url> {
        let path = if path.is_empty() { self.root.path() } else { path };
        let url = uri::resolve(path, Some(&self.root), query)?;
        self.check_origin(&url)?;
        Ok(url)
    }

    fn check_origin(&self, url: &Url) -> Result<()> {
        let requested = uri::scheme_and_host(url);
        if requested != self.origin {
            return Err(Error::OriginMismatch {
                bound: self.origin.clone(),
                requested,
            });
        }
        Ok(())
    }

    fn retry_budget(&self, options: &RequestOptions) -> RetryBudget {
        let wait = options.retry_wait.unwrap_or_else(|| self.config.retry_wait());
        RetryBudget::new(options.retry_count(), wait)
    }

    fn wire_request(
        &self,
        method: Method,
        url: Url,
        body: Option<String>,
        content_type: Option<&'static str>,
        options: &RequestOptions,
    ) -> Result<WireRequest> {
        let mut headers = self.config.headers();
        headers.extend(options.headers.iter().map(|(k, v)| (k.clone(), v.clone())));

        if options.is_json() && !options.has_header("accept") {
            headers.insert("Accept".to_string(), CONTENT_TYPE_JSON.to_string());
        }
        if let Some(content_type) = content_type {
            if !options.has_header("content-type") {
                headers.insert("Content-Type".to_string(), content_type.to_string());
            }
        }
        if let Some(username) = &options.username {
            let password = options.password.as_deref().unwrap_or_default();
            let credentials = STANDARD.encode(format!("{}:{}", username, password));
            headers.insert("Authorization".to_string(), format!("Basic {}", credentials));
        }

        let url = match options.ip {
            Some(ip) => {
                if !options.has_header("host") {
                    headers.insert("Host".to_string(), uri::host_header(&url));
                }
                with_ip_host(url, ip)?
            }
            None => url,
        };

        Ok(WireRequest {
            method,
            url,
            headers: header_map(&headers),
            body,
        })
    }

    async fn dispatch(
        &self,
        request: WireRequest,
        ip: Option<IpAddr>,
        retries: &mut RetryBudget,
    ) -> Result<Response> {
        loop {
            tracing::debug!(method = %request.method, url = %request.url, ?ip, "sending request");

            let error = match self.send(request.clone()).await {
                Ok(wire) => {
                    let response = Response::from_wire(wire);
                    tracing::debug!(
                        status = response.status(),
                        url = %request.url,
                        "received response"
                    );
                    *self.last_response.lock() = Some(response.clone());
                    return Ok(response);
                }
                Err(e) => Error::from(e),
            };

            if !error.is_transient() {
                return Err(error);
            }

            match retries.take() {
                Some(wait) => {
                    tracing::warn!(
                        method = %request.method,
                        url = %request.url,
                        error = %error,
                        remaining = retries.remaining(),
                        ?wait,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                None => return Err(error),
            }
        }
    }

    async fn send(
        &self,
        request: WireRequest,
    ) -> std::result::Result<WireResponse, TransportError> {
        match &self.link {
            Link::Exclusive(transport) => transport.send(request).await,
            Link::Pooled { pool, .. } => {
                let url = request.url.clone();
                pool.send_request(&url, request).await
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("origin", &self.origin)
            .field("root", &self.root.as_str())
            .field("persistent", &matches!(self.link, Link::Pooled { .. }))
            .finish()
    }
}

/// Encode a payload and pick the content type it implies.
fn encode_payload(value: &Value, json: bool) -> Result<(Option<String>, Option<&'static str>)> {
    let body = encode_body(value, json)?;
    let content_type = match (&body, value) {
        (None, _) => None,
        (Some(_), _) if json => Some(CONTENT_TYPE_JSON),
        (Some(_), Value::String(_)) => None,
        (Some(_), _) => Some(CONTENT_TYPE_FORM),
    };
    Ok((body, content_type))
}

/// Options for a GET carrying `data`.
fn fold_get_data(data: &Value, mut options: RequestOptions) -> RequestOptions {
    if is_empty(data) {
        return options;
    }

    if options.is_json() {
        options.body = Some(data.clone());
        return options;
    }

    options.query = Some(match (options.query.take(), data) {
        (Some(Value::Object(existing)), Value::Object(extra)) => {
            let mut merged: Map<String, Value> = existing;
            merged.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
            Value::Object(merged)
        }
        _ => data.clone(),
    });
    options
}

fn with_ip_host(mut url: Url, ip: IpAddr) -> Result<Url> {
    url.set_ip_host(ip)
        .map_err(|_| Error::InvalidUri(format!("cannot connect {} to {}", url, ip)))?;
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Follow;
    use crate::transport::{MockConnector, MockTransport};
    use bytes::Bytes;
    use reqwest::header::{HeaderMap, HeaderValue};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::time::Duration;

    type Reply = std::result::Result<WireResponse, TransportError>;
    type Sent = Arc<Mutex<Vec<WireRequest>>>;

    struct FixedConnector(Arc<dyn Transport>);

    impl Connector for FixedConnector {
        fn connect(
            &self,
            _settings: &ConnectionSettings,
        ) -> std::result::Result<Arc<dyn Transport>, TransportError> {
            Ok(Arc::clone(&self.0))
        }
    }

    fn reply(status: u16, headers: &[(&'static str, &'static str)], body: &'static str) -> Reply {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(*name, HeaderValue::from_static(value));
        }
        Ok(WireResponse {
            status,
            headers: map,
            body: Bytes::from_static(body.as_bytes()),
        })
    }

    fn refused() -> Reply {
        Err(TransportError::Connect("connection refused".into()))
    }

    /// Transport answering with `replies` in order, recording what it was sent.
    fn scripted(replies: Vec<Reply>) -> (MockTransport, Sent) {
        let sent: Sent = Arc::default();
        let count = replies.len();
        let queue = Mutex::new(VecDeque::from(replies));

        let mut transport = MockTransport::new();
        transport.expect_start().returning(|| Ok(()));
        transport.expect_is_started().returning(|| true);
        transport.expect_finish().returning(|| ());

        let log = Arc::clone(&sent);
        transport.expect_send().times(count).returning(move |request| {
            log.lock().push(request);
            queue
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Protocol("no scripted reply".into())))
        });

        (transport, sent)
    }

    fn client_with(
        uri: &str,
        options: RequestOptions,
        config: ClientConfig,
        transport: MockTransport,
    ) -> Client {
        Client::builder(uri)
            .options(options)
            .config(Arc::new(config))
            .connector(Arc::new(FixedConnector(Arc::new(transport))))
            .build()
            .unwrap()
    }

    fn client(uri: &str, transport: MockTransport) -> Client {
        client_with(uri, RequestOptions::default(), ClientConfig::default(), transport)
    }

    fn header<'a>(request: &'a WireRequest, name: &str) -> Option<&'a str> {
        request.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[test]
    fn test_init_rejects_bad_uris() {
        assert!(matches!(
            Client::init("", &RequestOptions::default()),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            Client::init("not a url", &RequestOptions::default()),
            Err(Error::InvalidUri(_))
        ));
    }

    #[test]
    fn test_init_binds_origin() {
        let (transport, _) = scripted(vec![]);
        let client = client("a.example:8080/api", transport);
        assert_eq!(client.origin(), "http://a.example:8080");
        assert_eq!(client.root().path(), "/api");
    }

    #[tokio::test]
    async fn test_origin_mismatch_is_rejected_before_sending() {
        let (transport, sent) = scripted(vec![]);
        let client = client("https://a.example", transport);

        let err = client
            .get("https://b.example/x", &RequestOptions::default())
            .await
            .unwrap_err();

        match err {
            Error::OriginMismatch { bound, requested } => {
                assert_eq!(bound, "https://a.example");
                assert_eq!(requested, "https://b.example");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_get_resolves_path_and_query() {
        let (transport, sent) = scripted(vec![reply(200, &[], "ok")]);
        let client = client("https://a.example/base", transport);

        let response = client
            .get("/search?stale=1", &RequestOptions::new().query(json!({"q": "rust", "page": 2})))
            .await
            .unwrap();

        assert_eq!(response.text(), "ok");
        let sent = sent.lock();
        assert_eq!(sent[0].method, Method::Get);
        assert_eq!(sent[0].url.as_str(), "https://a.example/search?q=rust&page=2");
        assert!(sent[0].body.is_none());
        assert!(header(&sent[0], "user-agent").unwrap().starts_with("courier/"));
    }

    #[tokio::test]
    async fn test_empty_path_targets_root() {
        let (transport, sent) = scripted(vec![reply(200, &[], "")]);
        let client = client("http://a.example/status", transport);

        client.get("", &RequestOptions::default()).await.unwrap();
        assert_eq!(sent.lock()[0].url.as_str(), "http://a.example/status");
    }

    #[tokio::test]
    async fn test_follows_one_redirect() {
        let (transport, sent) = scripted(vec![
            reply(302, &[("location", "/next")], ""),
            reply(200, &[], "done"),
        ]);
        let client = client("https://a.example", transport);

        let response = client
            .get("/start", &RequestOptions::new().follow(1u32))
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.text(), "done");
        let sent = sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].method, Method::Get);
        assert_eq!(sent[1].url.as_str(), "https://a.example/next");
    }

    #[tokio::test]
    async fn test_exhausted_budget_returns_redirect() {
        let (transport, sent) = scripted(vec![
            reply(302, &[("location", "/one")], ""),
            reply(302, &[("location", "/two")], ""),
        ]);
        let client = client("https://a.example", transport);

        let response = client
            .get("/start", &RequestOptions::new().follow(1u32))
            .await
            .unwrap();

        assert_eq!(response.status(), 302);
        assert_eq!(response.location(), Some("/two"));
        assert_eq!(sent.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_redirects_not_followed_by_default() {
        let (transport, sent) = scripted(vec![reply(301, &[("location", "/moved")], "")]);
        let client = client("https://a.example", transport);

        let response = client.get("/old", &RequestOptions::default()).await.unwrap();
        assert!(response.is_redirect());
        assert_eq!(sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_follow_true_uses_configured_limit() {
        let (transport, sent) = scripted(vec![
            reply(302, &[("location", "/1")], ""),
            reply(307, &[("location", "/2")], ""),
            reply(308, &[("location", "/3")], ""),
        ]);
        let config = ClientConfig {
            follow_limit: 2,
            ..ClientConfig::default()
        };
        let client = client_with("https://a.example", RequestOptions::default(), config, transport);

        let response = client
            .get("/0", &RequestOptions::new().follow(Follow::Default))
            .await
            .unwrap();

        assert_eq!(response.status(), 308);
        assert_eq!(sent.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_redirect_without_location_is_returned() {
        let (transport, sent) = scripted(vec![reply(302, &[], "")]);
        let client = client("https://a.example", transport);

        let response = client.get("/", &RequestOptions::new().follow(true)).await.unwrap();
        assert_eq!(response.status(), 302);
        assert_eq!(sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_cross_origin_redirect_is_rejected() {
        let (transport, sent) =
            scripted(vec![reply(302, &[("location", "https://evil.example/")], "")]);
        let client = client("https://a.example", transport);

        let err = client
            .get("/", &RequestOptions::new().follow(true))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::OriginMismatch { .. }));
        assert_eq!(sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_redirect_drops_query_and_body() {
        let (transport, sent) = scripted(vec![
            reply(303, &[("location", "done")], ""),
            reply(200, &[], ""),
        ]);
        let client = client("https://a.example", transport);

        client
            .get(
                "/api/submit",
                &RequestOptions::new().query(json!({"a": 1})).body("payload").follow(true),
            )
            .await
            .unwrap();

        let sent = sent.lock();
        assert_eq!(sent[0].body.as_deref(), Some("payload"));
        assert_eq!(sent[1].url.as_str(), "https://a.example/api/done");
        assert!(sent[1].body.is_none());
    }

    #[tokio::test]
    async fn test_post_does_not_follow_redirects() {
        let (transport, sent) = scripted(vec![reply(302, &[("location", "/next")], "")]);
        let client = client("https://a.example", transport);

        let response = client
            .post("/items", &json!({"a": 1}), &RequestOptions::new().follow(true))
            .await
            .unwrap();

        assert_eq!(response.status(), 302);
        assert_eq!(sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_sustained_failure_exhausts_retries() {
        let (transport, sent) = scripted(vec![refused(), refused(), refused()]);
        let client = client("http://a.example", transport);

        let err = client
            .get("/", &RequestOptions::new().retries(2, Duration::ZERO))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Network(TransportError::Connect(_))));
        assert_eq!(sent.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let (transport, sent) = scripted(vec![
            Err(TransportError::Timeout),
            reply(200, &[], "recovered"),
        ]);
        let client = client("http://a.example", transport);

        let response = client
            .get("/", &RequestOptions::new().retries(1, Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(response.text(), "recovered");
        assert_eq!(sent.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_no_retries_fails_immediately() {
        let (transport, sent) = scripted(vec![refused()]);
        let client = client("http://a.example", transport);

        let err = client.get("/", &RequestOptions::default()).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_non_idempotent_requests_are_retried() {
        let (transport, sent) = scripted(vec![refused(), reply(201, &[], "")]);
        let client = client("http://a.example", transport);

        let response = client
            .post("/items", &json!({"a": 1}), &RequestOptions::new().retries(1, Duration::ZERO))
            .await
            .unwrap();

        assert!(response.is_success());
        let sent = sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].body, sent[1].body);
    }

    #[tokio::test]
    async fn test_call_can_opt_out_of_base_retries() {
        let (transport, sent) = scripted(vec![refused()]);
        let base = RequestOptions::new().retries(2, Duration::ZERO);
        let client = client_with("http://a.example", base, ClientConfig::default(), transport);

        let err = client
            .post("/items", &json!({"a": 1}), &RequestOptions::new().retries(0, Duration::ZERO))
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_call_can_disable_base_follow() {
        let (transport, sent) = scripted(vec![reply(301, &[("location", "/moved")], "")]);
        let base = RequestOptions::new().follow(true);
        let client = client_with("https://a.example", base, ClientConfig::default(), transport);

        let response = client
            .get("/old", &RequestOptions::new().follow(false))
            .await
            .unwrap();

        assert!(response.is_redirect());
        assert_eq!(sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_call_can_disable_base_json() {
        let (transport, sent) = scripted(vec![reply(200, &[], "")]);
        let base = RequestOptions::new().json(true);
        let client = client_with("https://a.example", base, ClientConfig::default(), transport);

        client
            .post("/items", &json!({"a": 1}), &RequestOptions::new().json(false))
            .await
            .unwrap();

        let sent = sent.lock();
        assert_eq!(sent[0].body.as_deref(), Some("a=1"));
        assert_eq!(header(&sent[0], "content-type"), Some(CONTENT_TYPE_FORM));
        assert_eq!(header(&sent[0], "accept"), None);
    }

    #[tokio::test]
    async fn test_base_json_applies_to_get_data() {
        let (transport, sent) = scripted(vec![reply(200, &[], "")]);
        let base = RequestOptions::new().json(true);
        let client = client_with("https://a.example", base, ClientConfig::default(), transport);

        client
            .request(Method::Get, "/search", &json!({"q": "rust"}), &RequestOptions::default())
            .await
            .unwrap();

        let sent = sent.lock();
        assert_eq!(sent[0].url.query(), None);
        assert_eq!(sent[0].body.as_deref(), Some(r#"{"q":"rust"}"#));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_configured_default() {
        let (transport, _) = scripted(vec![refused(), reply(200, &[], "")]);
        let client = client("http://a.example", transport);

        let mut options = RequestOptions::new();
        options.retries = Some(1);

        let started = tokio::time::Instant::now();
        client.get("/", &options).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_json_post_headers_and_body() {
        let (transport, sent) = scripted(vec![reply(201, &[], "")]);
        let client = client("https://a.example", transport);

        client
            .post(
                "/items",
                &json!({"name": "widget", "tags": ["a"]}),
                &RequestOptions::new().json(true).basic_auth("user", "secret"),
            )
            .await
            .unwrap();

        let sent = sent.lock();
        let request = &sent[0];
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.body.as_deref(), Some(r#"{"name":"widget","tags":["a"]}"#));
        assert_eq!(header(request, "content-type"), Some("application/json"));
        assert_eq!(header(request, "accept"), Some("application/json"));
        assert_eq!(header(request, "authorization"), Some("Basic dXNlcjpzZWNyZXQ="));
    }

    #[tokio::test]
    async fn test_form_body_and_caller_headers() {
        let (transport, sent) = scripted(vec![reply(200, &[], "")]);
        let client = client("https://a.example", transport);

        client
            .put(
                "/items/1",
                &json!({"a": 1, "b": {"c": 2}}),
                &RequestOptions::new()
                    .header("Accept", "text/plain")
                    .header("User-Agent", "custom/1.0"),
            )
            .await
            .unwrap();

        let sent = sent.lock();
        assert_eq!(sent[0].body.as_deref(), Some("a=1&b[c]=2"));
        assert_eq!(header(&sent[0], "content-type"), Some("application/x-www-form-urlencoded"));
        assert_eq!(header(&sent[0], "accept"), Some("text/plain"));
        assert_eq!(header(&sent[0], "user-agent"), Some("custom/1.0"));
    }

    #[tokio::test]
    async fn test_raw_string_body_has_no_content_type() {
        let (transport, sent) = scripted(vec![reply(200, &[], "")]);
        let client = client("https://a.example", transport);

        client
            .patch("/raw", &json!("<doc/>"), &RequestOptions::default())
            .await
            .unwrap();

        let sent = sent.lock();
        assert_eq!(sent[0].body.as_deref(), Some("<doc/>"));
        assert!(header(&sent[0], "content-type").is_none());
    }

    #[tokio::test]
    async fn test_username_without_password() {
        let (transport, sent) = scripted(vec![reply(200, &[], "")]);
        let mut options = RequestOptions::new();
        options.username = Some("user".to_string());
        let client = client_with("https://a.example", options, ClientConfig::default(), transport);

        client.get("/", &RequestOptions::default()).await.unwrap();
        assert_eq!(header(&sent.lock()[0], "authorization"), Some("Basic dXNlcjo="));
    }

    #[tokio::test]
    async fn test_delete_carries_body() {
        let (transport, sent) = scripted(vec![reply(200, &[], "")]);
        let client = client("https://a.example", transport);

        client
            .delete("/items", &json!({"ids": [1, 2]}), &RequestOptions::new().json(true))
            .await
            .unwrap();

        let sent = sent.lock();
        assert_eq!(sent[0].method, Method::Delete);
        assert_eq!(sent[0].body.as_deref(), Some(r#"{"ids":[1,2]}"#));
    }

    #[tokio::test]
    async fn test_get_folds_data_into_query() {
        let (transport, sent) = scripted(vec![reply(200, &[], "")]);
        let client = client("https://a.example", transport);

        client
            .request(
                Method::Get,
                "/search",
                &json!({"q": "rust"}),
                &RequestOptions::new().query(json!({"page": 1})),
            )
            .await
            .unwrap();

        let sent = sent.lock();
        assert_eq!(sent[0].url.query(), Some("page=1&q=rust"));
        assert!(sent[0].body.is_none());
    }

    #[tokio::test]
    async fn test_get_folds_data_into_json_body() {
        let (transport, sent) = scripted(vec![reply(200, &[], "")]);
        let client = client("https://a.example", transport);

        client
            .request(
                Method::Get,
                "/search",
                &json!({"q": "rust"}),
                &RequestOptions::new().json(true),
            )
            .await
            .unwrap();

        let sent = sent.lock();
        assert_eq!(sent[0].url.query(), None);
        assert_eq!(sent[0].body.as_deref(), Some(r#"{"q":"rust"}"#));
    }

    #[tokio::test]
    async fn test_response_tracks_last_completed_request() {
        let (transport, _) = scripted(vec![
            reply(200, &[("content-type", "application/json")], r#"{"n":1}"#),
            reply(404, &[], ""),
        ]);
        let client = client("https://a.example", transport);

        assert!(matches!(client.response(), Err(Error::NoResponse)));

        client.get("/a", &RequestOptions::default()).await.unwrap();
        let last = client.response().unwrap();
        assert_eq!(last.data().and_then(|d| d.as_json()), Some(&json!({"n": 1})));

        client.get("/b", &RequestOptions::default()).await.unwrap();
        assert_eq!(client.response().unwrap().status(), 404);
    }

    #[tokio::test]
    async fn test_ip_override_keeps_host_header() {
        let (transport, sent) = scripted(vec![reply(200, &[], "")]);
        let client = client("https://a.example:8443", transport);

        client
            .get("/health", &RequestOptions::new().ip("127.0.0.1".parse().unwrap()))
            .await
            .unwrap();

        let sent = sent.lock();
        assert_eq!(sent[0].url.as_str(), "https://127.0.0.1:8443/health");
        assert_eq!(header(&sent[0], "host"), Some("a.example:8443"));
    }

    #[tokio::test]
    async fn test_shared_pool_is_reused_and_left_open() {
        let mut connector = MockConnector::new();
        connector.expect_connect().times(1).returning(|_| {
            let mut transport = MockTransport::new();
            transport.expect_start().times(1).returning(|| Ok(()));
            transport.expect_finish().times(1).returning(|| ());
            transport.expect_send().times(2).returning(|_| {
                Ok(WireResponse {
                    status: 200,
                    headers: HeaderMap::new(),
                    body: Bytes::new(),
                })
            });
            Ok(Arc::new(transport) as Arc<dyn Transport>)
        });

        let config = Arc::new(ClientConfig::default());
        let pool = Arc::new(ConnectionPool::with_connector(
            Arc::new(connector),
            RequestOptions::default(),
            Arc::clone(&config),
        ));

        for path in ["/one", "/two"] {
            let client = Client::builder("https://a.example")
                .config(Arc::clone(&config))
                .pool(Arc::clone(&pool))
                .build()
                .unwrap();
            client.get(path, &RequestOptions::default()).await.unwrap();
            client.close();
        }

        assert_eq!(pool.len(), 1);
        pool.shutdown();
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_persistent_client_owns_its_pool() {
        let mut connector = MockConnector::new();
        connector.expect_connect().times(1).returning(|_| {
            let mut transport = MockTransport::new();
            transport.expect_start().times(1).returning(|| Ok(()));
            transport.expect_finish().times(1).returning(|| ());
            transport.expect_send().returning(|_| {
                Ok(WireResponse {
                    status: 200,
                    headers: HeaderMap::new(),
                    body: Bytes::new(),
                })
            });
            Ok(Arc::new(transport) as Arc<dyn Transport>)
        });

        let client = Client::builder("http://a.example")
            .options(RequestOptions::new().persistent(true))
            .config(Arc::new(ClientConfig::default()))
            .connector(Arc::new(connector))
            .build()
            .unwrap();

        client.get("/a", &RequestOptions::default()).await.unwrap();
        client.get("/b", &RequestOptions::default()).await.unwrap();
        drop(client);
    }

    #[test]
    fn test_open_and_close_drive_transport() {
        let mut transport = MockTransport::new();
        transport.expect_start().times(1).returning(|| Ok(()));
        transport.expect_finish().times(1..).returning(|| ());

        let client = client("http://a.example", transport);
        client.open().unwrap();
        client.close();
    }

    #[test]
    fn test_open_failure_is_a_network_error() {
        let mut transport = MockTransport::new();
        transport
            .expect_start()
            .returning(|| Err(TransportError::Connect("refused".into())));
        transport.expect_finish().returning(|| ());

        let client = client("http://a.example", transport);
        assert!(matches!(client.open(), Err(Error::Network(_))));
    }
}
