use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use market_core::DEFAULT_MIN_CHARS;
use market_logging::{market_info, market_warn};

pub const ENV_API_URL: &str = "MARKET_API_URL";
pub const ENV_CONNECT_TIMEOUT: &str = "MARKET_CONNECT_TIMEOUT_SECS";
pub const ENV_REQUEST_TIMEOUT: &str = "MARKET_REQUEST_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Sent with every request; caller headers override them.
    pub default_headers: Vec<(String, String)>,
    pub user_agent: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            default_headers: vec![("Accept".to_string(), "application/json".to_string())],
            user_agent: concat!("market_client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientSettings {
    /// Settings from the process environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            base_url: load(&lookup, ENV_API_URL, defaults.base_url),
            connect_timeout: Duration::from_secs(load(
                &lookup,
                ENV_CONNECT_TIMEOUT,
                defaults.connect_timeout.as_secs(),
            )),
            request_timeout: Duration::from_secs(load(
                &lookup,
                ENV_REQUEST_TIMEOUT,
                defaults.request_timeout.as_secs(),
            )),
            ..defaults
        }
    }
}

fn load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        market_info!("{key} not set, using default: {default}");
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(err) => {
            market_warn!("Invalid {key} value {raw:?}: {err}, using default: {default}");
            default
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub max_images: usize,
    /// Files above this size fail before dispatch.
    pub max_file_bytes: u64,
    /// `None` dispatches every file of a batch at once.
    pub max_concurrent_uploads: Option<usize>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_images: 10,
            max_file_bytes: 10 * 1024 * 1024,
            max_concurrent_uploads: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionSettings {
    pub debounce: Duration,
    pub min_chars: usize,
}

impl Default for SuggestionSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            min_chars: DEFAULT_MIN_CHARS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSettings {
    pub ttl: Duration,
}

impl Default for MessageSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_millis(3000),
        }
    }
}
