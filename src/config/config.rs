// SPDX-License-Identifier: GPL-3.0-only
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::sync::{CollectionKey, RefreshSettings};
use crate::utils::validate_source_url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database path for synchronized posts
    pub store_db_path: PathBuf,

    /// Content source API endpoint URL
    pub source_api_url: String,

    /// Optional bearer token for the content source API
    #[serde(default)]
    pub source_api_key: Option<String>,

    /// Blog collections kept in sync
    #[serde(default)]
    pub blogs: Vec<String>,

    /// Local API bind address (e.g., "127.0.0.1:8080")
    pub local_api_bind: SocketAddr,

    /// Periodic fleet refresh interval in seconds
    pub refresh_interval_secs: u64,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Refresh already populated blogs in the background
    #[serde(default)]
    pub async_refresh: bool,

    /// Seconds after a successful sync during which a blog counts as fresh
    #[serde(default = "default_cache_timeout_secs")]
    pub cache_timeout_secs: u64,

    /// Upper bound in seconds a caller waits on a synchronous refresh
    #[serde(default = "default_sync_timeout_secs")]
    pub sync_timeout_secs: u64,

    /// How long a read waits for a blog's first posts to appear
    #[serde(default = "default_wait_for_data_timeout_secs")]
    pub wait_for_data_timeout_secs: u64,

    /// Full resync period in seconds; unset means only the first pass is full
    #[serde(default = "default_full_resync_interval_secs")]
    pub full_resync_interval_secs: Option<u64>,

    /// Cap on concurrent blog refreshes; unset means unbounded
    #[serde(default)]
    pub max_parallel_refreshes: Option<usize>,
}

fn default_cache_timeout_secs() -> u64 {
    60
}

fn default_sync_timeout_secs() -> u64 {
    30
}

fn default_wait_for_data_timeout_secs() -> u64 {
    30
}

fn default_full_resync_interval_secs() -> Option<u64> {
    Some(24 * 60 * 60)
}

impl Config {
    /// Load configuration from TOML file with environment variable overrides
    pub fn load() -> anyhow::Result<Self> {
        let config_path = std::env::var("BLOGSYNC_CONFIG")
            .unwrap_or_else(|_| "config.toml".to_string());

        let mut config: Config = if std::path::Path::new(&config_path).exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", config_path))?
        } else {
            Config::default()
        };

        // Apply environment variable overrides
        if let Ok(val) = std::env::var("BLOGSYNC_STORE_DB_PATH") {
            config.store_db_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("BLOGSYNC_SOURCE_API_URL") {
            config.source_api_url = val;
        }
        if let Ok(val) = std::env::var("BLOGSYNC_SOURCE_API_KEY") {
            config.source_api_key = Some(val);
        }
        if let Ok(val) = std::env::var("BLOGSYNC_BLOGS") {
            config.blogs = val
                .split(',')
                .map(str::trim)
                .filter(|blog| !blog.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(val) = std::env::var("BLOGSYNC_LOCAL_API_BIND") {
            config.local_api_bind = SocketAddr::from_str(&val)?;
        }
        if let Ok(val) = std::env::var("BLOGSYNC_REFRESH_INTERVAL_SECS") {
            config.refresh_interval_secs = val.parse()?;
        }
        if let Ok(val) = std::env::var("BLOGSYNC_LOG_LEVEL") {
            config.log_level = val;
        }
        if let Ok(val) = std::env::var("BLOGSYNC_ASYNC_REFRESH") {
            config.async_refresh = val.parse()?;
        }
        if let Ok(val) = std::env::var("BLOGSYNC_CACHE_TIMEOUT_SECS") {
            config.cache_timeout_secs = val.parse()?;
        }
        if let Ok(val) = std::env::var("BLOGSYNC_SYNC_TIMEOUT_SECS") {
            config.sync_timeout_secs = val.parse()?;
        }
        if let Ok(val) = std::env::var("BLOGSYNC_WAIT_FOR_DATA_TIMEOUT_SECS") {
            config.wait_for_data_timeout_secs = val.parse()?;
        }
        if let Ok(val) = std::env::var("BLOGSYNC_FULL_RESYNC_INTERVAL_SECS") {
            config.full_resync_interval_secs = if val.is_empty() { None } else { Some(val.parse()?) };
        }
        if let Ok(val) = std::env::var("BLOGSYNC_MAX_PARALLEL_REFRESHES") {
            config.max_parallel_refreshes = if val.is_empty() { None } else { Some(val.parse()?) };
        }

        Ok(config)
    }

    /// Reject settings the daemon cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_source_url(&self.source_api_url)
            .with_context(|| format!("Invalid source_api_url '{}'", self.source_api_url))?;
        self.blog_keys()?;

        if self.sync_timeout_secs == 0 {
            anyhow::bail!("sync_timeout_secs must be greater than zero");
        }
        if self.max_parallel_refreshes == Some(0) {
            anyhow::bail!("max_parallel_refreshes must be greater than zero when set");
        }
        Ok(())
    }

    /// Configured blogs as collection keys
    pub fn blog_keys(&self) -> anyhow::Result<Vec<CollectionKey>> {
        self.blogs
            .iter()
            .map(|blog| {
                CollectionKey::parse(blog).with_context(|| format!("Invalid blog key '{}'", blog))
            })
            .collect()
    }

    pub fn refresh_settings(&self) -> RefreshSettings {
        RefreshSettings {
            async_refresh: self.async_refresh,
            cache_timeout: Duration::from_secs(self.cache_timeout_secs),
            sync_timeout: Duration::from_secs(self.sync_timeout_secs),
            full_resync_interval: self.full_resync_interval_secs.map(Duration::from_secs),
            ..RefreshSettings::default()
        }
    }

    pub fn wait_for_data_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_for_data_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_db_path: PathBuf::from("blogsync.db"),
            source_api_url: String::from("http://localhost:3000/api"),
            source_api_key: None,
            blogs: Vec::new(),
            local_api_bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            refresh_interval_secs: 300, // 5 minutes
            log_level: String::from("info"),
            async_refresh: false,
            cache_timeout_secs: default_cache_timeout_secs(),
            sync_timeout_secs: default_sync_timeout_secs(),
            wait_for_data_timeout_secs: default_wait_for_data_timeout_secs(),
            full_resync_interval_secs: default_full_resync_interval_secs(),
            max_parallel_refreshes: None,
        }
    }
}
