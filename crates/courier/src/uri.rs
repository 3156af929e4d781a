//! URI parsing, resolution against a bound origin, and query injection.

use serde_json::Value;
use url::Url;

use crate::codec::encode_query;
use crate::error::{Error, Result};

/// Parse `input` into an absolute http(s) URI.
///
/// Inputs without a `scheme://` prefix are treated as `http`. An empty path
/// is normalized to `/`.
pub fn parse_absolute(input: &str) -> Result<Url> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("empty URL".to_string()));
    }

    let candidate = if has_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let mut url = Url::parse(&candidate)
        .map_err(|e| Error::InvalidUri(format!("{}: {}", candidate, e)))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().map_or(true, str::is_empty) {
        return Err(Error::InvalidUri(candidate));
    }

    if url.path().is_empty() {
        url.set_path("/");
    }

    Ok(url)
}

/// Whether `input` starts with `scheme://`.
fn has_scheme(input: &str) -> bool {
    let Some((scheme, _)) = input.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Resolve a path or URL, optionally against a bound origin.
///
/// A supplied `query` replaces whatever query string the input carried.
pub fn resolve(path_or_url: &str, bound: Option<&Url>, query: Option<&Value>) -> Result<Url> {
    let mut url = match bound {
        Some(base) if path_or_url.starts_with('/') => {
            parse_absolute(&format!("{}{}", origin_prefix(base), path_or_url))?
        }
        _ => parse_absolute(path_or_url)?,
    };

    if let Some(query) = query {
        let encoded = encode_query(query, None);
        url.set_query(if encoded.is_empty() { None } else { Some(&encoded) });
    }

    Ok(url)
}

/// Canonical origin key used to keep a client within its bound host.
pub fn scheme_and_host(url: &Url) -> String {
    origin_prefix(url)
}

fn origin_prefix(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    }
}

/// Value for a `Host` header preserving the URI's authority.
pub(crate) fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}
