//! fleetd.toml configuration parser.
//!
//! [`AgentConfig`] mirrors the file as written (durations as strings,
//! raw filter globs). [`AgentConfig::into_settings`] validates it into
//! [`AgentSettings`], the typed form threaded through every constructor.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::filter::TagFilter;

const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:80";
const DEFAULT_DISCOVERY_INTERVAL: &str = "60s";
const DEFAULT_API_TIMEOUT: &str = "30s";
const DEFAULT_PAGE_SIZE: usize = 100;
const DEFAULT_LOG_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    pub region: Option<String>,
    pub listen_address: Option<String>,
    pub discovery_interval: Option<String>,
    pub api_timeout: Option<String>,
    pub database: Option<DatabaseFamilyConfig>,
    pub cache: Option<CacheFamilyConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseFamilyConfig {
    pub enabled: Option<bool>,
    pub inventory: Option<PathBuf>,
    pub page_size: Option<usize>,
    pub filters: Option<HashMap<String, String>>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Option<String>,
    pub query_timeout: Option<String>,
    pub scrape_interval: Option<String>,
    /// `0` disables log tailing.
    pub logs_scrape_interval: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub host_metrics_dir: Option<PathBuf>,
    pub log_channel_capacity: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheFamilyConfig {
    pub enabled: Option<bool>,
    pub inventory: Option<PathBuf>,
    pub page_size: Option<usize>,
    pub filters: Option<HashMap<String, String>>,
    /// ACL user; empty authenticates with the password alone.
    pub user: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Option<String>,
}

// ── Validated settings ─────────────────────────────────────────────

/// Validated agent settings.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub region: String,
    pub listen_address: SocketAddr,
    pub discovery_interval: Duration,
    /// Per-call timeout for discovery, tag, log and host-metric API calls.
    pub api_timeout: Duration,
    pub database: Option<DatabaseSettings>,
    pub cache: Option<CacheSettings>,
}

#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub inventory: PathBuf,
    pub page_size: usize,
    pub filter: TagFilter,
    pub credentials: Credentials,
    pub connect_timeout: Duration,
    pub query_timeout: Duration,
    pub scrape_interval: Duration,
    pub logs_scrape_interval: Duration,
    pub log_dir: Option<PathBuf>,
    pub host_metrics_dir: Option<PathBuf>,
    pub log_channel_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub inventory: PathBuf,
    pub page_size: usize,
    pub filter: TagFilter,
    /// Set when the cache requires `AUTH`.
    pub credentials: Option<Credentials>,
    pub connect_timeout: Duration,
}

impl AgentConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validate the raw config. Any error here must abort startup.
    pub fn into_settings(self) -> ConfigResult<AgentSettings> {
        let region = self
            .region
            .filter(|r| !r.trim().is_empty())
            .ok_or(ConfigError::MissingRegion)?;

        let listen = self
            .listen_address
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.to_string());
        let listen_address: SocketAddr = listen
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddress(listen.clone()))?;

        let discovery_interval = duration_or(
            "discovery_interval",
            self.discovery_interval.as_deref(),
            DEFAULT_DISCOVERY_INTERVAL,
        )?;
        let api_timeout = duration_or("api_timeout", self.api_timeout.as_deref(), DEFAULT_API_TIMEOUT)?;

        let database = match self.database {
            Some(db) if db.enabled.unwrap_or(true) => Some(db.into_settings()?),
            _ => None,
        };
        let cache = match self.cache {
            Some(c) if c.enabled.unwrap_or(true) => Some(c.into_settings()?),
            _ => None,
        };

        Ok(AgentSettings {
            region,
            listen_address,
            discovery_interval,
            api_timeout,
            database,
            cache,
        })
    }
}

impl DatabaseFamilyConfig {
    fn into_settings(self) -> ConfigResult<DatabaseSettings> {
        let inventory = self.inventory.ok_or(ConfigError::MissingInventory("database"))?;
        let user = self
            .user
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::MissingCredentials("database"))?;

        Ok(DatabaseSettings {
            inventory,
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1),
            filter: TagFilter::new(&self.filters.unwrap_or_default())?,
            credentials: Credentials {
                user,
                password: self.password.unwrap_or_default(),
            },
            connect_timeout: duration_or("database.connect_timeout", self.connect_timeout.as_deref(), "1s")?,
            query_timeout: duration_or("database.query_timeout", self.query_timeout.as_deref(), "30s")?,
            scrape_interval: duration_or("database.scrape_interval", self.scrape_interval.as_deref(), "30s")?,
            logs_scrape_interval: duration_or(
                "database.logs_scrape_interval",
                self.logs_scrape_interval.as_deref(),
                "30s",
            )?,
            log_dir: self.log_dir,
            host_metrics_dir: self.host_metrics_dir,
            log_channel_capacity: self
                .log_channel_capacity
                .unwrap_or(DEFAULT_LOG_CHANNEL_CAPACITY)
                .max(1),
        })
    }
}

impl CacheFamilyConfig {
    fn into_settings(self) -> ConfigResult<CacheSettings> {
        Ok(CacheSettings {
            inventory: self.inventory.ok_or(ConfigError::MissingInventory("cache"))?,
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1),
            filter: TagFilter::new(&self.filters.unwrap_or_default())?,
            credentials: self.password.map(|password| Credentials {
                user: self.user.unwrap_or_default(),
                password,
            }),
            connect_timeout: duration_or("cache.connect_timeout", self.connect_timeout.as_deref(), "1s")?,
        })
    }
}

fn duration_or(key: &str, value: Option<&str>, default: &str) -> ConfigResult<Duration> {
    let raw = value.unwrap_or(default);
    parse_duration(raw).ok_or_else(|| ConfigError::InvalidDuration {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

/// Parse a duration string like "5s", "500ms", "2m", or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim().parse::<u64>().ok()?.checked_mul(60).map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.trim().parse::<u64>().ok()?.checked_mul(3600).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
