use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Upper bound on cached responses before least-recently-used eviction.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_realtime_ttl_secs")]
    pub realtime_ttl_secs: u64,
    #[serde(default = "default_ranking_ttl_secs")]
    pub ranking_ttl_secs: u64,
}

fn default_max_entries() -> usize {
    256
}

fn default_realtime_ttl_secs() -> u64 {
    45
}

fn default_ranking_ttl_secs() -> u64 {
    90
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            realtime_ttl_secs: default_realtime_ttl_secs(),
            ranking_ttl_secs: default_ranking_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    #[serde(default = "default_max_parts")]
    pub max_parts: usize,
    #[serde(default = "default_channel")]
    pub default_channel: String,
}

fn default_max_chars() -> usize {
    1000
}

fn default_max_lines() -> usize {
    15
}

fn default_max_parts() -> usize {
    3
}

fn default_channel() -> String {
    "qq".to_string()
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            max_lines: default_max_lines(),
            max_parts: default_max_parts(),
            default_channel: default_channel(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}
