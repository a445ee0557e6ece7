//! Configuration management for jobharvest using the prefer crate.
//!
//! Resolution order: built-in defaults, then the discovered (or explicit)
//! config file, then environment overrides for the store endpoint.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dedup::DedupKey;

/// Default search endpoint (guest listing API, 25 cards per page).
pub const DEFAULT_SEARCH_URL: &str =
    "https://www.linkedin.com/jobs-guest/jobs/api/seeMoreJobPostings/search";

/// Default detail page template; `{id}` is replaced with the card's numeric id.
pub const DEFAULT_DETAIL_URL_TEMPLATE: &str = "https://www.linkedin.com/jobs/view/{id}/";

/// Default store endpoint when nothing else is configured.
pub const DEFAULT_STORE_URL: &str = "http://localhost:9200";

/// Environment variables consulted for the store endpoint, in priority order.
pub const STORE_URL_ENV_VARS: [&str; 2] = ["JOBHARVEST_STORE_URL", "ELASTICSEARCH_URL"];

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("config discovery failed: {0}")]
    Discovery(String),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Scrape engine settings.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Attempts per URL, including the first.
    pub max_retry: u32,
    /// Base delay between attempts.
    pub retry_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt (1.0 = constant).
    pub backoff_multiplier: f64,
    pub request_timeout: Duration,
    /// Minimum spacing between requests to the same host.
    pub request_delay: Duration,
    /// Extra headers sent with every request.
    pub headers: HashMap<String, String>,
    /// Proxy URLs keyed by scheme (`http`, `https` or `all`).
    pub proxies: HashMap<String, String>,
    /// User agent. None = default, "impersonate" = rotating browser UA.
    pub user_agent: Option<String>,
    pub rounds: u32,
    pub pages_to_scrape: u32,
    /// Value of the `f_TPR` parameter (posted within N seconds).
    pub time_posted_range: String,
    /// Maximum in-flight fetches. 1 keeps the run sequential.
    pub concurrency: usize,
    pub search_url: String,
    pub detail_url_template: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_retry: 3,
            retry_delay: Duration::from_millis(2000),
            backoff_multiplier: 1.0,
            request_timeout: Duration::from_secs(10),
            request_delay: Duration::from_millis(500),
            headers: HashMap::new(),
            proxies: HashMap::new(),
            user_agent: None,
            rounds: 1,
            pages_to_scrape: 1,
            time_posted_range: "r604800".to_string(),
            concurrency: 1,
            search_url: DEFAULT_SEARCH_URL.to_string(),
            detail_url_template: DEFAULT_DETAIL_URL_TEMPLATE.to_string(),
        }
    }
}

/// Posting store settings.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// `memory`, `sqlite:<path>` or an `http(s)://` search-engine URL.
    pub backend: String,
    pub index: String,
    pub dedup_key: DedupKey,
    pub verify_certs: bool,
    /// `user:password` for HTTP basic auth.
    pub basic_auth: Option<String>,
    pub request_timeout: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_STORE_URL.to_string(),
            index: "jobs".to_string(),
            dedup_key: DedupKey::Identity,
            verify_certs: false,
            basic_auth: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Dashboard server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Where the uploaded CV text is kept.
    pub cv_path: PathBuf,
}

impl ServerSettings {
    fn with_data_dir(data_dir: &Path) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5001,
            cv_path: data_dir.join("cv.txt"),
        }
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory (CV text, default SQLite store).
    pub data_dir: PathBuf,
    /// Path to the preferences YAML file.
    pub preferences_path: PathBuf,
    pub engine: EngineSettings,
    pub store: StoreSettings,
    pub server: ServerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("jobharvest");
        Self::with_data_dir(data_dir)
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            preferences_path: PathBuf::from("config/preferences.yaml"),
            engine: EngineSettings::default(),
            store: StoreSettings::default(),
            server: ServerSettings::with_data_dir(&data_dir),
            data_dir,
        }
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }

    /// Apply `JOBHARVEST_STORE_URL` / `ELASTICSEARCH_URL` if set.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = STORE_URL_ENV_VARS
            .iter()
            .filter_map(|key| lookup(key))
            .find(|v| !v.trim().is_empty())
        {
            self.store.backend = url;
        }
    }

    /// Check invariants that would otherwise surface mid-run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let engine = &self.engine;
        if engine.max_retry == 0 {
            return Err(invalid("engine.max_retry", "must be at least 1"));
        }
        if engine.rounds == 0 {
            return Err(invalid("engine.rounds", "must be at least 1"));
        }
        if engine.pages_to_scrape == 0 {
            return Err(invalid("engine.pages_to_scrape", "must be at least 1"));
        }
        if engine.concurrency == 0 {
            return Err(invalid("engine.concurrency", "must be at least 1"));
        }
        if !(engine.backoff_multiplier.is_finite() && engine.backoff_multiplier >= 1.0) {
            return Err(invalid("engine.backoff_multiplier", "must be >= 1.0"));
        }
        if engine.request_timeout.is_zero() {
            return Err(invalid("engine.request_timeout", "must be positive"));
        }
        if !engine.detail_url_template.contains("{id}") {
            return Err(invalid(
                "engine.detail_url_template",
                "must contain an {id} placeholder",
            ));
        }
        for (scheme, url) in &engine.proxies {
            if !matches!(scheme.as_str(), "http" | "https" | "all") {
                return Err(invalid(
                    "engine.proxies",
                    format!("unknown scheme `{}` (expected http, https or all)", scheme),
                ));
            }
            if url::Url::parse(url).is_err() {
                return Err(invalid("engine.proxies", format!("invalid proxy URL `{}`", url)));
            }
        }
        if self.store.index.trim().is_empty() {
            return Err(invalid("store.index", "must not be empty"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// `[engine]` section of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_retry: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    /// Request timeout in seconds.
    pub request_timeout: Option<u64>,
    pub request_delay_ms: Option<u64>,
    pub headers: Option<HashMap<String, String>>,
    pub proxies: Option<HashMap<String, String>>,
    pub user_agent: Option<String>,
    pub rounds: Option<u32>,
    pub pages_to_scrape: Option<u32>,
    pub time_posted_range: Option<String>,
    pub concurrency: Option<usize>,
    pub search_url: Option<String>,
    pub detail_url_template: Option<String>,
}

/// `[store]` section of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: Option<String>,
    pub index: Option<String>,
    pub dedup_key: Option<DedupKey>,
    pub verify_certs: Option<bool>,
    pub basic_auth: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout: Option<u64>,
}

/// `[server]` section of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub cv_path: Option<String>,
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target directory for data.
    pub target: Option<String>,
    /// Preferences file path.
    pub preferences: Option<String>,
    pub engine: EngineConfig,
    pub store: StoreConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration using prefer crate.
    /// Automatically discovers jobharvest config files in standard locations.
    /// No file means defaults; a file that fails to parse is an error.
    pub async fn load() -> Result<Self, ConfigError> {
        Self::from_discovery(prefer::discovery::find_config_file("jobharvest").await)
    }

    fn from_discovery(found: prefer::Result<PathBuf>) -> Result<Self, ConfigError> {
        match found {
            Ok(path) => Self::from_path(&path),
            Err(prefer::Error::FileNotFound(_)) => Ok(Self::default()),
            Err(e) => Err(ConfigError::Discovery(e.to_string())),
        }
    }

    /// Load configuration from an explicit file, choosing the parser by extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_err = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&text).map_err(|e| parse_err(e.to_string())),
            Some("json") => serde_json::from_str(&text).map_err(|e| parse_err(e.to_string())),
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&text).map_err(|e| parse_err(e.to_string()))
            }
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref target) = self.target {
            let path = shellexpand::tilde(target);
            settings.data_dir = PathBuf::from(path.as_ref());
            settings.server.cv_path = settings.data_dir.join("cv.txt");
        }
        if let Some(ref preferences) = self.preferences {
            settings.preferences_path = PathBuf::from(shellexpand::tilde(preferences).as_ref());
        }

        let e = &self.engine;
        let engine = &mut settings.engine;
        if let Some(n) = e.max_retry {
            engine.max_retry = n;
        }
        if let Some(ms) = e.retry_delay_ms {
            engine.retry_delay = Duration::from_millis(ms);
        }
        if let Some(m) = e.backoff_multiplier {
            engine.backoff_multiplier = m;
        }
        if let Some(secs) = e.request_timeout {
            engine.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = e.request_delay_ms {
            engine.request_delay = Duration::from_millis(ms);
        }
        if let Some(ref headers) = e.headers {
            engine.headers = headers.clone();
        }
        if let Some(ref proxies) = e.proxies {
            engine.proxies = proxies.clone();
        }
        if let Some(ref ua) = e.user_agent {
            engine.user_agent = Some(ua.clone());
        }
        if let Some(n) = e.rounds {
            engine.rounds = n;
        }
        if let Some(n) = e.pages_to_scrape {
            engine.pages_to_scrape = n;
        }
        if let Some(ref tpr) = e.time_posted_range {
            engine.time_posted_range = tpr.clone();
        }
        if let Some(n) = e.concurrency {
            engine.concurrency = n;
        }
        if let Some(ref url) = e.search_url {
            engine.search_url = url.clone();
        }
        if let Some(ref template) = e.detail_url_template {
            engine.detail_url_template = template.clone();
        }

        let s = &self.store;
        let store = &mut settings.store;
        if let Some(ref backend) = s.backend {
            store.backend = backend.clone();
        }
        if let Some(ref index) = s.index {
            store.index = index.clone();
        }
        if let Some(key) = s.dedup_key {
            store.dedup_key = key;
        }
        if let Some(verify) = s.verify_certs {
            store.verify_certs = verify;
        }
        if let Some(ref auth) = s.basic_auth {
            store.basic_auth = Some(auth.clone());
        }
        if let Some(secs) = s.request_timeout {
            store.request_timeout = Duration::from_secs(secs);
        }

        let srv = &self.server;
        if let Some(ref host) = srv.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = srv.port {
            settings.server.port = port;
        }
        if let Some(ref cv) = srv.cv_path {
            settings.server.cv_path = PathBuf::from(shellexpand::tilde(cv).as_ref());
        }
    }
}

/// Load settings: explicit file if given, otherwise prefer discovery, then env overrides.
pub async fn load_settings(config_path: Option<&Path>) -> Result<Settings, ConfigError> {
    let config = match config_path {
        Some(path) => Config::from_path(path)?,
        None => Config::load().await?,
    };
    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings);
    settings.apply_env();
    settings.validate()?;
    Ok(settings)
}
