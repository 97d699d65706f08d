use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub timeline: TimelineConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub recent: RecentConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout; an elapsed timeout counts as a fetch failure.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Environment variable holding the identity provider's ID token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Queries shorter than this (after trimming) are never sent upstream.
    #[serde(default = "default_min_query_chars")]
    pub min_query_chars: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_popular_limit")]
    pub popular_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentConfig {
    #[serde(default = "default_recent_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// JSON key-value file backing durable client state (recent searches).
    #[serde(default = "default_store_file")]
    pub store_file: PathBuf,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl SearchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
        }
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            min_query_chars: default_min_query_chars(),
            cache_ttl_secs: default_cache_ttl_secs(),
            popular_limit: default_popular_limit(),
        }
    }
}

impl Default for RecentConfig {
    fn default() -> Self {
        Self {
            capacity: default_recent_capacity(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            store_file: default_store_file(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_token_env() -> String {
    "PIXICAST_ID_TOKEN".to_string()
}

fn default_page_size() -> u32 {
    50
}

fn default_debounce_ms() -> u64 {
    400
}

fn default_min_query_chars() -> usize {
    2
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_popular_limit() -> u32 {
    10
}

fn default_recent_capacity() -> usize {
    5
}

fn default_store_file() -> PathBuf {
    platform::data_dir().join("store.json")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
