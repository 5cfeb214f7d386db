use std::path::{Path, PathBuf};

use anyhow::Context;
use twelf::{Layer, config};

pub const DEFAULT_CONFIG_FILE: &str = "shelf_sync.yaml";
pub const ENV_PREFIX: &str = "SHELF_";

#[config]
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// REST root of the book platform, e.g. `https://books.example.com/api`
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Host that relative cover and asset paths are resolved against
    #[serde(default = "default_asset_host")]
    pub asset_host: String,
    #[serde(default = "default_db_connection_string")]
    pub db_connection_string: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_minutes_per_page")]
    pub minutes_per_page: f64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Open reading or listening sessions untouched for this long are closed
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

fn default_api_base_url() -> String {
    "http://localhost:8000/api".into()
}

fn default_asset_host() -> String {
    "http://localhost:8000".into()
}

fn default_db_connection_string() -> String {
    "sqlite://shelf_sync.sqlite?mode=rwc".into()
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".into()
}

fn default_minutes_per_page() -> f64 {
    0.5
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_session_idle_secs() -> u64 {
    30 * 60
}

impl Config {
    /// `shelf_sync.yaml` (if present) overridden by `SHELF_*` environment variables.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Some(Path::new(DEFAULT_CONFIG_FILE)), Some(ENV_PREFIX))
    }

    pub fn load_from(file: Option<&Path>, env_prefix: Option<&str>) -> anyhow::Result<Self> {
        let mut layers = Vec::new();
        if let Some(path) = file.filter(|p| p.exists()) {
            tracing::debug!(path = %path.display(), "loading config file");
            layers.push(Layer::Yaml(PathBuf::from(path)));
        }
        if let Some(prefix) = env_prefix {
            layers.push(Layer::Env(Some(prefix.to_string())));
        }
        Self::with_layers(&layers).with_context(|| "Failed to load configuration")
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.api_base_url.trim().is_empty() {
            return Err("SHELF_API_BASE_URL is missing".into());
        }
        if self.asset_host.trim().is_empty() {
            return Err("SHELF_ASSET_HOST is missing".into());
        }
        if self.db_connection_string.trim().is_empty() {
            return Err("SHELF_DB_CONNECTION_STRING is missing".into());
        }
        if !(self.minutes_per_page.is_finite() && self.minutes_per_page > 0.0) {
            return Err(format!(
                "SHELF_MINUTES_PER_PAGE must be positive, got {}",
                self.minutes_per_page
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err("SHELF_REQUEST_TIMEOUT_SECS must be at least 1".into());
        }
        if self.session_idle_secs < 60 {
            return Err(format!(
                "SHELF_SESSION_IDLE_SECS must be at least 60, got {}",
                self.session_idle_secs
            ));
        }
        Ok(())
    }
}
