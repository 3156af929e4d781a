//! Content-type driven response decoding.

use serde_json::Value;

use super::node::Node;

/// Media type families the decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// `application/json`, `text/javascript`, `application/x-javascript`.
    Json,
    /// `text/xml`, `application/xml`.
    Xml,
    /// Everything else.
    Other,
}

impl ContentKind {
    /// Classify a raw `Content-Type` header value.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type.map(normalize).as_deref() {
            Some("application_json" | "text_javascript" | "application_x_javascript") => {
                ContentKind::Json
            }
            Some("text_xml" | "application_xml") => ContentKind::Xml,
            _ => ContentKind::Other,
        }
    }
}

/// Normalize a media type: parameters dropped, lowercased, and every run of
/// non-letter characters folded into a single `_`.
pub fn normalize(content_type: &str) -> String {
    let base = content_type.split(';').next().unwrap_or_default().trim();
    let mut out = String::with_capacity(base.len());
    let mut pending_sep = false;
    for ch in base.chars() {
        if ch.is_ascii_alphabetic() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Structured data decoded from a response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    /// Parsed JSON document.
    Json(Value),
    /// Root element of an XML document.
    Xml(Node),
}

impl Data {
    /// The JSON value, if this is JSON data.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Data::Json(value) => Some(value),
            Data::Xml(_) => None,
        }
    }

    /// The XML root, if this is XML data.
    pub fn as_xml(&self) -> Option<&Node> {
        match self {
            Data::Xml(node) => Some(node),
            Data::Json(_) => None,
        }
    }

    /// Mapping view: JSON as is, XML through [`Node::to_value`].
    pub fn to_value(&self) -> Value {
        match self {
            Data::Json(value) => value.clone(),
            Data::Xml(node) => node.to_value(),
        }
    }
}

/// Decode `body` according to `content_type`.
///
/// Unknown types, empty bodies and malformed documents all yield `None`.
pub fn decode(content_type: Option<&str>, body: &[u8]) -> Option<Data> {
    match ContentKind::from_content_type(content_type) {
        ContentKind::Json => decode_json(body),
        ContentKind::Xml => decode_xml(body),
        ContentKind::Other => None,
    }
}

fn decode_json(body: &[u8]) -> Option<Data> {
    match serde_json::from_slice(body) {
        Ok(value) => Some(Data::Json(value)),
        Err(e) => {
            tracing::trace!(error = %e, "response body is not valid JSON");
            None
        }
    }
}

fn decode_xml(body: &[u8]) -> Option<Data> {
    let text = std::str::from_utf8(body).ok()?;
    Node::parse(text).map(Data::Xml)
}
