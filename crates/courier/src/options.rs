//! Per-call request options.

use std::net::IpAddr;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Redirect following setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Follow {
    /// Do not follow redirects.
    #[default]
    Disabled,
    /// Follow up to the configured default number of hops.
    Default,
    /// Follow up to this many hops.
    Hops(u32),
}

impl Follow {
    /// Hop budget given the configured default.
    pub fn budget(self, default_hops: u32) -> u32 {
        match self {
            Follow::Disabled => 0,
            Follow::Default => default_hops,
            Follow::Hops(n) => n,
        }
    }
}

impl From<bool> for Follow {
    fn from(enabled: bool) -> Self {
        if enabled {
            Follow::Default
        } else {
            Follow::Disabled
        }
    }
}

impl From<u32> for Follow {
    fn from(hops: u32) -> Self {
        Follow::Hops(hops)
    }
}

impl<'de> Deserialize<'de> for Follow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Hops(u32),
        }

        Ok(match Option::<Raw>::deserialize(deserializer)? {
            None => Follow::Disabled,
            Some(Raw::Flag(flag)) => flag.into(),
            Some(Raw::Hops(hops)) => hops.into(),
        })
    }
}

/// Options recognized by [`Client`](crate::Client) and the façade.
///
/// Deserializable with serde; unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RequestOptions {
    /// Headers merged over the configured defaults.
    pub headers: IndexMap<String, String>,
    /// Basic auth user.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Query parameters (mapping or raw string) replacing the URI's query.
    pub query: Option<Value>,
    /// Explicit request body.
    pub body: Option<Value>,
    /// Encode bodies as JSON and ask for JSON back.
    pub json: Option<bool>,
    /// Redirect following.
    pub follow: Option<Follow>,
    /// Retries left for transient network failures.
    pub retries: Option<u32>,
    /// Delay between retries.
    #[serde(deserialize_with = "secs::deserialize")]
    pub retry_wait: Option<Duration>,
    /// Verify TLS peers. Defaults to on.
    pub verify_ssl: Option<bool>,
    /// Connect timeout.
    #[serde(deserialize_with = "secs::deserialize")]
    pub open_timeout: Option<Duration>,
    /// Read timeout.
    #[serde(deserialize_with = "secs::deserialize")]
    pub read_timeout: Option<Duration>,
    /// Use a pooled, long-lived connection.
    pub persistent: Option<bool>,
    /// Connect to this address instead, keeping the original `Host`.
    pub ip: Option<IpAddr>,
}

impl RequestOptions {
    /// Empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set basic auth credentials.
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the query.
    pub fn query(mut self, query: impl Into<Value>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Set an explicit body.
    pub fn body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Toggle JSON encoding.
    pub fn json(mut self, json: bool) -> Self {
        self.json = Some(json);
        self
    }

    /// Set redirect following (`true`, `false`, or a hop count).
    pub fn follow(mut self, follow: impl Into<Follow>) -> Self {
        self.follow = Some(follow.into());
        self
    }

    /// Set the retry budget and delay.
    pub fn retries(mut self, retries: u32, wait: Duration) -> Self {
        self.retries = Some(retries);
        self.retry_wait = Some(wait);
        self
    }

    /// Toggle TLS peer verification.
    pub fn verify_ssl(mut self, verify: bool) -> Self {
        self.verify_ssl = Some(verify);
        self
    }

    /// Set the connect timeout.
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = Some(timeout);
        self
    }

    /// Set the read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Toggle persistent (pooled) connections.
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = Some(persistent);
        self
    }

    /// Connect to a literal address.
    pub fn ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    /// Whether bodies are JSON encoded.
    pub fn is_json(&self) -> bool {
        self.json.unwrap_or(false)
    }

    /// Redirect setting, disabled when unset.
    pub fn follow_setting(&self) -> Follow {
        self.follow.unwrap_or_default()
    }

    /// Retry budget, zero when unset.
    pub fn retry_count(&self) -> u32 {
        self.retries.unwrap_or(0)
    }

    /// Whether a pooled connection is wanted.
    pub fn is_persistent(&self) -> bool {
        self.persistent.unwrap_or(false)
    }

    /// Layer `other` over `self`: fields set in `other` win, even when set to
    /// zero or `false`. Headers merge.
    pub fn merge(&self, other: &RequestOptions) -> RequestOptions {
        let mut headers = self.headers.clone();
        headers.extend(other.headers.iter().map(|(k, v)| (k.clone(), v.clone())));

        RequestOptions {
            headers,
            username: other.username.clone().or_else(|| self.username.clone()),
            password: other.password.clone().or_else(|| self.password.clone()),
            query: other.query.clone().or_else(|| self.query.clone()),
            body: other.body.clone().or_else(|| self.body.clone()),
            json: other.json.or(self.json),
            follow: other.follow.or(self.follow),
            retries: other.retries.or(self.retries),
            retry_wait: other.retry_wait.or(self.retry_wait),
            verify_ssl: other.verify_ssl.or(self.verify_ssl),
            open_timeout: other.open_timeout.or(self.open_timeout),
            read_timeout: other.read_timeout.or(self.read_timeout),
            persistent: other.persistent.or(self.persistent),
            ip: other.ip.or(self.ip),
        }
    }

    /// Whether a header was given, compared case-insensitively.
    pub(crate) fn has_header(&self, name: &str) -> bool {
        self.headers.keys().any(|k| k.eq_ignore_ascii_case(name))
    }
}

/// Durations expressed as (fractional) seconds.
pub(crate) mod secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(deserializer)?;
        match secs {
            None => Ok(None),
            Some(s) if s.is_finite() && s >= 0.0 => Ok(Some(Duration::from_secs_f64(s))),
            Some(s) => Err(serde::de::Error::custom(format!("invalid duration: {}", s))),
        }
    }
}
