//! Transport boundary and its reqwest implementation.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Error, TransportError};
use crate::options::RequestOptions;

/// Supported HTTP verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    /// Upper-case verb name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }

    /// Request-builder for this verb.
    fn builder(self) -> fn(&reqwest::Client, Url) -> reqwest::RequestBuilder {
        match self {
            Method::Get => |c: &reqwest::Client, u: Url| c.get(u),
            Method::Post => |c: &reqwest::Client, u: Url| c.post(u),
            Method::Put => |c: &reqwest::Client, u: Url| c.put(u),
            Method::Patch => |c: &reqwest::Client, u: Url| c.patch(u),
            Method::Delete => |c: &reqwest::Client, u: Url| c.delete(u),
            Method::Head => |c: &reqwest::Client, u: Url| c.head(u),
            Method::Options => |c: &reqwest::Client, u: Url| c.request(reqwest::Method::OPTIONS, u),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "get" => Ok(Method::Get),
            "post" => Ok(Method::Post),
            "put" => Ok(Method::Put),
            "patch" => Ok(Method::Patch),
            "delete" => Ok(Method::Delete),
            "head" => Ok(Method::Head),
            "options" => Ok(Method::Options),
            _ => Err(Error::InvalidMethod(s.to_string())),
        }
    }
}

/// A fully prepared request handed to a [`Transport`].
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

impl WireRequest {
    /// Request without headers or body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

/// What a [`Transport`] returns for a request.
#[derive(Debug, Clone)]
pub struct WireResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A connection to one origin.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the long-lived connection. Idempotent.
    fn start(&self) -> Result<(), TransportError>;

    /// Whether [`Transport::start`] has run and [`Transport::finish`] has not.
    fn is_started(&self) -> bool;

    /// Send one request and read the whole response.
    async fn send(&self, request: WireRequest) -> Result<WireResponse, TransportError>;

    /// Close the connection. Idempotent.
    fn finish(&self);
}

/// Settings a transport is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub verify_ssl: bool,
    pub open_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
}

impl ConnectionSettings {
    /// Settings for `url`, with per-call options over configured defaults.
    ///
    /// TLS is enabled for `https` and for port 443.
    pub fn for_url(url: &Url, options: &RequestOptions, config: &ClientConfig) -> Self {
        let port = url.port_or_known_default().unwrap_or(80);
        Self {
            host: url.host_str().unwrap_or_default().to_string(),
            port,
            use_tls: url.scheme() == "https" || port == 443,
            verify_ssl: options.verify_ssl.unwrap_or(true),
            open_timeout: options.open_timeout.or(config.open_timeout),
            read_timeout: options.read_timeout.or(config.read_timeout),
        }
    }
}

/// Creates transports.
#[cfg_attr(test, mockall::automock)]
pub trait Connector: Send + Sync {
    /// Create a transport for the given settings without starting it.
    fn connect(&self, settings: &ConnectionSettings) -> Result<Arc<dyn Transport>, TransportError>;
}

/// Connector producing [`ReqwestTransport`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestConnector;

impl Connector for ReqwestConnector {
    fn connect(&self, settings: &ConnectionSettings) -> Result<Arc<dyn Transport>, TransportError> {
        Ok(Arc::new(ReqwestTransport::new(settings.clone())))
    }
}

/// Transport backed by a `reqwest::Client`.
///
/// Until started, every request runs on a throwaway client, so nothing is
/// kept alive between calls. Once started, a single client holds the
/// keep-alive connections until [`Transport::finish`].
pub struct ReqwestTransport {
    settings: ConnectionSettings,
    client: RwLock<Option<reqwest::Client>>,
}

impl ReqwestTransport {
    /// Create an unstarted transport.
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            settings,
            client: RwLock::new(None),
        }
    }

    /// Settings this transport was created with.
    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    fn build_client(&self) -> Result<reqwest::Client, TransportError> {
        let mut builder = reqwest::Client::builder()
            .redirect(Policy::none())
            .danger_accept_invalid_certs(!self.settings.verify_ssl);

        if let Some(timeout) = self.settings.open_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = self.settings.read_timeout {
            builder = builder.timeout(timeout);
        }

        builder.build().map_err(TransportError::Build)
    }

    fn client(&self) -> Result<reqwest::Client, TransportError> {
        match self.client.read().as_ref() {
            Some(client) => Ok(client.clone()),
            None => self.build_client(),
        }
    }
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("settings", &self.settings)
            .field("started", &self.is_started())
            .finish()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    fn start(&self) -> Result<(), TransportError> {
        let mut slot = self.client.write();
        if slot.is_none() {
            *slot = Some(self.build_client()?);
        }
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.client.read().is_some()
    }

    async fn send(&self, request: WireRequest) -> Result<WireResponse, TransportError> {
        let client = self.client()?;

        let mut url = request.url;
        if self.settings.use_tls && url.scheme() == "http" {
            // port 443 without an explicit scheme
            let _ = url.set_scheme("https");
        }

        let mut builder = (request.method.builder())(&client, url).headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(WireResponse { status, headers, body })
    }

    fn finish(&self) {
        self.client.write().take();
    }
}

/// Convert ordered string pairs into a header map, skipping invalid entries.
pub(crate) fn header_map<'a>(
    pairs: impl IntoIterator<Item = (&'a String, &'a String)>,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "skipping invalid header"),
        }
    }
    headers
}
