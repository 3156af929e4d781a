//! Request payload encoding.

use serde_json::Value;
use url::form_urlencoded;

use crate::error::Result;

/// Encode a value as bracketed nested query parameters.
///
/// `{a: 1, b: {c: 2}}` becomes `a=1&b[c]=2` and `{tags: ["x", "y"]}`
/// becomes `tags[]=x&tags[]=y`. A bare top-level string is returned as is.
pub fn encode_query(value: &Value, key: Option<&str>) -> String {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| encode_query(v, Some(&append_key(key, k))))
            .collect::<Vec<_>>()
            .join("&"),
        Value::Array(items) => {
            let item_key = format!("{}[]", key.unwrap_or_default());
            items
                .iter()
                .map(|v| encode_query(v, Some(&item_key)))
                .collect::<Vec<_>>()
                .join("&")
        }
        Value::Null => String::new(),
        Value::String(s) => match key {
            None => s.clone(),
            Some(key) => format!("{}={}", key, escape(s)),
        },
        scalar => format!("{}={}", key.unwrap_or_default(), escape(&scalar.to_string())),
    }
}

fn append_key(root: Option<&str>, key: &str) -> String {
    match root {
        None => key.to_string(),
        Some(root) => format!("{}[{}]", root, key),
    }
}

fn escape(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

/// Encode a request payload.
///
/// Returns `None` for null or empty payloads. Strings pass through verbatim,
/// `json` selects compact JSON, everything else is query-encoded.
pub fn encode_body(value: &Value, json: bool) -> Result<Option<String>> {
    if is_empty(value) {
        return Ok(None);
    }

    let encoded = match value {
        Value::String(s) => s.clone(),
        _ if json => serde_json::to_string(value)?,
        _ => encode_query(value, None),
    };

    Ok(Some(encoded))
}

/// Whether a payload carries nothing worth sending.
pub(crate) fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
