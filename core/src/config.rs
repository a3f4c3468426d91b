//! Process-wide engine configuration.
//!
//! Read once when the shared engine is initialized. Values come from the
//! environment; anything missing or unparsable falls back to the default.

use serde::{Deserialize, Serialize};

pub const ENV_USER_AGENT: &str = "HTTPCAP_USER_AGENT";
pub const ENV_CONNECT_TIMEOUT: &str = "HTTPCAP_CONNECT_TIMEOUT";
pub const ENV_MAX_BUFFER_BYTES: &str = "HTTPCAP_MAX_BUFFER_BYTES";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub user_agent: String,
    /// Bound on TCP/TLS connection setup, independent of per-request timeouts.
    pub connect_timeout_secs: Option<u64>,
    /// Default per-accumulator ceiling when a request sets none.
    pub max_buffer_bytes: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("httpcap/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout_secs: None,
            max_buffer_bytes: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(agent) = lookup(ENV_USER_AGENT).filter(|v| !v.trim().is_empty()) {
            config.user_agent = agent;
        }
        config.connect_timeout_secs = parse_number(ENV_CONNECT_TIMEOUT, lookup(ENV_CONNECT_TIMEOUT));
        config.max_buffer_bytes = parse_number(ENV_MAX_BUFFER_BYTES, lookup(ENV_MAX_BUFFER_BYTES));
        config
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}
