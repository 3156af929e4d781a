//! HTTP response wrapper.

use std::borrow::Cow;
use std::fmt;

use bytes::Bytes;
use once_cell::sync::OnceCell;
use reqwest::header::{HeaderMap, CONTENT_TYPE, LOCATION};

use crate::codec::{self, Data};
use crate::error::{Error, Result};
use crate::transport::WireResponse;

const SUCCESS_CODES: [u16; 2] = [200, 201];
const REDIRECT_CODES: [u16; 5] = [301, 302, 303, 307, 308];

/// A completed HTTP response.
///
/// The body is set at most once and structured data is decoded lazily on
/// first access to [`Response::data`].
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    headers: HeaderMap,
    body: OnceCell<Bytes>,
    data: OnceCell<Option<Data>>,
}

impl Response {
    /// Create a response without a body.
    pub fn new(status: u16, headers: HeaderMap) -> Self {
        Self {
            status,
            headers,
            body: OnceCell::new(),
            data: OnceCell::new(),
        }
    }

    pub(crate) fn from_wire(wire: WireResponse) -> Self {
        let response = Self::new(wire.status, wire.headers);
        // a fresh cell cannot already hold a body
        let _ = response.body.set(wire.body);
        response
    }

    /// Set the raw body. Fails if a body was already set.
    pub fn set_body(&self, body: impl Into<Bytes>) -> Result<()> {
        self.body
            .set(body.into())
            .map_err(|_| Error::InvalidState("response body is already set".to_string()))
    }

    /// Raw body bytes; empty when no body was set.
    pub fn body(&self) -> &[u8] {
        self.body.get().map(|b| b.as_ref()).unwrap_or_default()
    }

    /// Body as text, lossily decoded.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.body())
    }

    /// Status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Alias of [`Response::status`].
    pub fn code(&self) -> u16 {
        self.status
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A header value, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The `Content-Type` header.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// The `Location` header.
    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    /// True for 200 and 201.
    pub fn is_success(&self) -> bool {
        SUCCESS_CODES.contains(&self.status)
    }

    /// Alias of [`Response::is_success`].
    pub fn is_ok(&self) -> bool {
        self.is_success()
    }

    /// True for 301, 302, 303, 307 and 308.
    pub fn is_redirect(&self) -> bool {
        REDIRECT_CODES.contains(&self.status)
    }

    /// Decoded body, computed once. `None` when the content type is not
    /// understood or the body does not parse.
    pub fn data(&self) -> Option<&Data> {
        self.data
            .get_or_init(|| codec::decode(self.content_type(), self.body()))
            .as_ref()
    }

    /// Status, headers and body text.
    pub fn to_parts(&self) -> (u16, HeaderMap, String) {
        (self.status, self.headers.clone(), self.text().into_owned())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}
