//! Process-wide client defaults.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::options::secs;

/// Environment variable names read by [`ClientConfig::from_env`].
pub mod vars {
    pub const COURIER_USER_AGENT: &str = "COURIER_USER_AGENT";
    pub const COURIER_RETRY_WAIT: &str = "COURIER_RETRY_WAIT";
    pub const COURIER_FOLLOW_LIMIT: &str = "COURIER_FOLLOW_LIMIT";
    pub const COURIER_OPEN_TIMEOUT: &str = "COURIER_OPEN_TIMEOUT";
    pub const COURIER_READ_TIMEOUT: &str = "COURIER_READ_TIMEOUT";
}

/// Immutable defaults shared by every client.
///
/// Build once and hand out behind an `Arc`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// User agent sent with every request.
    pub user_agent: String,
    /// Headers sent with every request, under caller headers.
    pub default_headers: IndexMap<String, String>,
    /// Hop budget used by `follow: true`.
    pub follow_limit: u32,
    /// Delay between retries when a call does not set one.
    #[serde(deserialize_with = "secs::deserialize")]
    pub retry_wait: Option<Duration>,
    /// Connect timeout when a call does not set one.
    #[serde(deserialize_with = "secs::deserialize")]
    pub open_timeout: Option<Duration>,
    /// Read timeout when a call does not set one.
    #[serde(deserialize_with = "secs::deserialize")]
    pub read_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("courier/{}", env!("CARGO_PKG_VERSION")),
            default_headers: IndexMap::new(),
            follow_limit: 10,
            retry_wait: Some(Duration::from_secs(5)),
            open_timeout: Some(Duration::from_secs(10)),
            read_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `COURIER_*` environment variables.
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(agent) = std::env::var(vars::COURIER_USER_AGENT) {
            if !agent.trim().is_empty() {
                config.user_agent = agent;
            }
        }

        if let Some(limit) = env_parse::<u32>(vars::COURIER_FOLLOW_LIMIT) {
            config.follow_limit = limit;
        }

        if let Some(wait) = env_secs(vars::COURIER_RETRY_WAIT) {
            config.retry_wait = Some(wait);
        }

        if let Some(timeout) = env_secs(vars::COURIER_OPEN_TIMEOUT) {
            config.open_timeout = Some(timeout);
        }

        if let Some(timeout) = env_secs(vars::COURIER_READ_TIMEOUT) {
            config.read_timeout = Some(timeout);
        }

        config
    }

    /// Add a default header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    /// Effective retry delay.
    pub fn retry_wait(&self) -> Duration {
        self.retry_wait.unwrap_or(Duration::from_secs(5))
    }

    /// Default headers including `User-Agent`.
    pub fn headers(&self) -> IndexMap<String, String> {
        let mut headers = IndexMap::with_capacity(self.default_headers.len() + 1);
        headers.insert("User-Agent".to_string(), self.user_agent.clone());
        headers.extend(self.default_headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        headers
    }
}

static SHARED: Lazy<Arc<ClientConfig>> = Lazy::new(|| Arc::new(ClientConfig::from_env()));

/// Process-wide configuration, read from the environment on first use.
pub fn shared() -> Arc<ClientConfig> {
    Arc::clone(&SHARED)
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|v| v.trim().parse().ok())
}

fn env_secs(var: &str) -> Option<Duration> {
    env_parse::<f64>(var)
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert!(config.user_agent.starts_with("courier/"));
        assert_eq!(config.follow_limit, 10);
        assert_eq!(config.retry_wait(), Duration::from_secs(5));
        assert!(config.default_headers.is_empty());
    }

    #[test]
    fn test_headers_include_user_agent() {
        let config = ClientConfig::default().with_header("X-Client", "tests");
        let headers = config.headers();
        assert_eq!(headers.get_index(0).map(|(k, _)| k.as_str()), Some("User-Agent"));
        assert_eq!(headers["X-Client"], "tests");
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: ClientConfig = serde_json::from_value(serde_json::json!({
            "user_agent": "custom/1.0",
            "retry_wait": 1.5
        }))
        .unwrap();
        assert_eq!(config.user_agent, "custom/1.0");
        assert_eq!(config.retry_wait(), Duration::from_millis(1500));
        assert_eq!(config.follow_limit, 10);
    }

    #[test]
    fn test_config_from_env() {
        let original_agent = env::var(vars::COURIER_USER_AGENT).ok();
        let original_limit = env::var(vars::COURIER_FOLLOW_LIMIT).ok();
        let original_wait = env::var(vars::COURIER_RETRY_WAIT).ok();

        env::set_var(vars::COURIER_USER_AGENT, "env-agent/2.0");
        env::set_var(vars::COURIER_FOLLOW_LIMIT, "3");
        env::set_var(vars::COURIER_RETRY_WAIT, "not-a-number");

        let config = ClientConfig::from_env();
        assert_eq!(config.user_agent, "env-agent/2.0");
        assert_eq!(config.follow_limit, 3);
        assert_eq!(config.retry_wait(), Duration::from_secs(5));

        env::remove_var(vars::COURIER_USER_AGENT);
        env::remove_var(vars::COURIER_FOLLOW_LIMIT);
        env::remove_var(vars::COURIER_RETRY_WAIT);

        if let Some(val) = original_agent {
            env::set_var(vars::COURIER_USER_AGENT, val);
        }
        if let Some(val) = original_limit {
            env::set_var(vars::COURIER_FOLLOW_LIMIT, val);
        }
        if let Some(val) = original_wait {
            env::set_var(vars::COURIER_RETRY_WAIT, val);
        }
    }
}
