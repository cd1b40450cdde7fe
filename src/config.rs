use std::{collections::BTreeMap, fmt, path::Path, time::Duration};

use serde::Deserialize;

use crate::{transport::redacted_headers, MongoHttpError, Result};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3300";
const DEFAULT_DATABASE: &str = "sourcemod";

/// Connection, timeout and retry settings for [`MongoHttpClient`](crate::MongoHttpClient).
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Absolute base URL of the API service, without trailing path.
    pub base_url: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: usize,
    /// Base retry backoff in milliseconds (exponential strategy).
    pub retry_backoff_ms: u64,
    pub user_agent: String,
    /// Sent as `X-API-Key` when present.
    pub api_key: Option<String>,
    /// Fixed headers added to every request.
    pub headers: Vec<(String, String)>,
    /// Database used when a collection is opened without one.
    pub default_database: String,
    /// Idle connections kept per host by the HTTP pool.
    pub pool_size: usize,
    /// Seconds an idle pooled connection is kept alive.
    pub keep_alive_secs: u64,
    pub debug: bool,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("user_agent", &self.user_agent)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("headers", &redacted_headers(&self.headers))
            .field("default_database", &self.default_database)
            .field("pool_size", &self.pool_size)
            .field("keep_alive_secs", &self.keep_alive_secs)
            .field("debug", &self.debug)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout_ms: 30_000,
            max_retries: 3,
            retry_backoff_ms: 100,
            user_agent: default_user_agent(),
            api_key: None,
            headers: Vec::new(),
            default_database: DEFAULT_DATABASE.to_owned(),
            pool_size: 5,
            keep_alive_secs: 300,
            debug: false,
        }
    }
}

fn default_user_agent() -> String {
    format!("mongodb-http/{}", env!("CARGO_PKG_VERSION"))
}

impl ClientConfig {
    /// Creates a configuration with defaults and the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sub-millisecond timeouts round up to 1 ms; only `Duration::ZERO` maps to zero.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = millis_ceil(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff_ms = millis_ceil(backoff);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| {
            MongoHttpError::Config(format!(
                "failed to read config file {}: {err}",
                path.display()
            ))
        })?;
        Self::parse(&content)
    }

    /// Loads configuration from a TOML file and applies environment overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    ///
    /// ```toml
    /// [api]
    /// url = "http://127.0.0.1:3300"
    /// api_key = "..."
    /// timeout = 30        # seconds
    /// max_retries = 3
    ///
    /// [database]
    /// default_db = "sourcemod"
    ///
    /// [connections]
    /// pool_size = 5
    /// keep_alive = 300    # seconds
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(s)
            .map_err(|err| MongoHttpError::Config(format!("config parse error: {err}")))?;
        let config = file.into_config();
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from environment variables only.
    ///
    /// Reads:
    /// - `MONGODB_HTTP_URL`: API service base URL (required)
    /// - `MONGODB_HTTP_API_KEY`: API key (optional)
    /// - `MONGODB_HTTP_TIMEOUT_SECS`: request timeout (optional)
    /// - `MONGODB_HTTP_MAX_RETRIES`: retry count (optional)
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("MONGODB_HTTP_URL").map_err(|_| {
            MongoHttpError::Config("missing MONGODB_HTTP_URL environment variable".to_owned())
        })?;
        if url.trim().is_empty() {
            return Err(MongoHttpError::Config(
                "MONGODB_HTTP_URL is set but empty".to_owned(),
            ));
        }
        let mut config = Self::new(url.trim());
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `MONGODB_HTTP_*` environment variables on top of the current values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(url) = env_non_empty("MONGODB_HTTP_URL") {
            self.base_url = url;
        }
        if let Some(api_key) = env_non_empty("MONGODB_HTTP_API_KEY") {
            self.api_key = Some(api_key);
        }
        if let Some(timeout) = env_non_empty("MONGODB_HTTP_TIMEOUT_SECS") {
            let secs = timeout.parse::<u64>().map_err(|err| {
                MongoHttpError::Config(format!(
                    "invalid MONGODB_HTTP_TIMEOUT_SECS '{timeout}': {err}"
                ))
            })?;
            self.timeout_ms = secs.saturating_mul(1000);
        }
        if let Some(retries) = env_non_empty("MONGODB_HTTP_MAX_RETRIES") {
            self.max_retries = retries.parse::<usize>().map_err(|err| {
                MongoHttpError::Config(format!(
                    "invalid MONGODB_HTTP_MAX_RETRIES '{retries}': {err}"
                ))
            })?;
        }
        Ok(())
    }

    /// Checks that the base URL is absolute http(s) and the timeout is positive.
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.base_url).map_err(|err| {
            MongoHttpError::Config(format!("invalid base URL '{}': {err}", self.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(MongoHttpError::Config(format!(
                "base URL '{}' must use http or https",
                self.base_url
            )));
        }
        if self.timeout_ms == 0 {
            return Err(MongoHttpError::Config(
                "timeout must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}

fn millis_ceil(duration: Duration) -> u64 {
    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    if millis == 0 && !duration.is_zero() {
        1
    } else {
        millis
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    api: ApiSection,
    #[serde(default)]
    database: DatabaseSection,
    #[serde(default)]
    connections: ConnectionsSection,
}

#[derive(Debug, Deserialize)]
struct ApiSection {
    #[serde(default = "default_url")]
    url: String,
    #[serde(default)]
    api_key: Option<String>,
    /// Seconds.
    #[serde(default = "default_timeout_secs")]
    timeout: u64,
    #[serde(default = "default_max_retries")]
    max_retries: usize,
    #[serde(default = "default_retry_backoff_ms")]
    retry_backoff_ms: u64,
    #[serde(default = "default_user_agent")]
    user_agent: String,
    #[serde(default)]
    debug_mode: bool,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

fn default_url() -> String {
    DEFAULT_BASE_URL.to_owned()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            url: default_url(),
            api_key: None,
            timeout: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            user_agent: default_user_agent(),
            debug_mode: false,
            headers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DatabaseSection {
    #[serde(default = "default_db")]
    default_db: String,
}

fn default_db() -> String {
    DEFAULT_DATABASE.to_owned()
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            default_db: default_db(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConnectionsSection {
    #[serde(default = "default_pool_size")]
    pool_size: usize,
    /// Seconds.
    #[serde(default = "default_keep_alive")]
    keep_alive: u64,
}

fn default_pool_size() -> usize {
    5
}

fn default_keep_alive() -> u64 {
    300
}

impl Default for ConnectionsSection {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            keep_alive: default_keep_alive(),
        }
    }
}

impl ConfigFile {
    fn into_config(self) -> ClientConfig {
        ClientConfig {
            base_url: self.api.url.trim_end_matches('/').to_owned(),
            timeout_ms: self.api.timeout.saturating_mul(1000),
            max_retries: self.api.max_retries,
            retry_backoff_ms: self.api.retry_backoff_ms,
            user_agent: self.api.user_agent,
            api_key: self.api.api_key.filter(|key| !key.trim().is_empty()),
            headers: self.api.headers.into_iter().collect(),
            default_database: self.database.default_db,
            pool_size: self.connections.pool_size,
            keep_alive_secs: self.connections.keep_alive,
            debug: self.api.debug_mode,
        }
    }
}
