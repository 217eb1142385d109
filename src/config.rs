use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::errors::ConfigError;

const DEFAULT_DATABASE_URL: &str = "markfeed.db";
const DEFAULT_POOL_SIZE: u32 = 8;
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;
const DEFAULT_FRESHNESS_SECS: u64 = 3600;
const DEFAULT_FEED_CONCURRENCY: usize = 8;
const DEFAULT_QUEUE_CONCURRENCY: usize = 1;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SCREENSHOT_DIR: &str = "screenshots";

/// Runtime settings, read from `MK_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub db_pool_size: u32,
    pub sync_interval: Duration,
    /// Feeds fetched more recently than this are skipped by the scheduler.
    pub freshness: Duration,
    pub feed_concurrency: usize,
    pub queue_concurrency: usize,
    pub shutdown_timeout: Duration,
    pub relaxed_tls_hosts: Vec<String>,
    pub screenshot: ScreenshotConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenshotConfig {
    /// Base URL of a Browserless-compatible service. Screenshots are disabled without it.
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            db_pool_size: DEFAULT_POOL_SIZE,
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            freshness: Duration::from_secs(DEFAULT_FRESHNESS_SECS),
            feed_concurrency: DEFAULT_FEED_CONCURRENCY,
            queue_concurrency: DEFAULT_QUEUE_CONCURRENCY,
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            relaxed_tls_hosts: Vec::new(),
            screenshot: ScreenshotConfig {
                endpoint: None,
                token: None,
                dir: PathBuf::from(DEFAULT_SCREENSHOT_DIR),
            },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup. Unset or blank keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = match get("MK_DATABASE_URL") {
            Some(url) => {
                info!("Using database path from MK_DATABASE_URL: {}", url);
                url
            }
            None => {
                info!("Using default database path: {}", DEFAULT_DATABASE_URL);
                DEFAULT_DATABASE_URL.to_string()
            }
        };

        let relaxed_tls_hosts = get("MK_RELAXED_TLS_HOSTS")
            .map(|hosts| {
                hosts
                    .split(',')
                    .map(|h| h.trim().to_string())
                    .filter(|h| !h.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let config = AppConfig {
            database_url,
            db_pool_size: parse_or(&get, "MK_DB_POOL_SIZE", DEFAULT_POOL_SIZE)?,
            sync_interval: Duration::from_secs(positive(
                &get,
                "MK_SYNC_INTERVAL_SECS",
                DEFAULT_SYNC_INTERVAL_SECS,
            )?),
            freshness: Duration::from_secs(parse_or(
                &get,
                "MK_FRESHNESS_SECS",
                DEFAULT_FRESHNESS_SECS,
            )?),
            feed_concurrency: positive(&get, "MK_FEED_CONCURRENCY", DEFAULT_FEED_CONCURRENCY)?,
            queue_concurrency: positive(&get, "MK_QUEUE_CONCURRENCY", DEFAULT_QUEUE_CONCURRENCY)?,
            shutdown_timeout: Duration::from_secs(parse_or(
                &get,
                "MK_SHUTDOWN_TIMEOUT_SECS",
                DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            )?),
            relaxed_tls_hosts,
            screenshot: ScreenshotConfig {
                endpoint: get("MK_SCREENSHOT_ENDPOINT")
                    .map(|e| e.trim_end_matches('/').to_string()),
                token: get("MK_SCREENSHOT_TOKEN"),
                dir: get("MK_SCREENSHOT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SCREENSHOT_DIR)),
            },
        };

        Ok(config)
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn positive<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default + std::fmt::Display,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    let value = parse_or(get, key, default)?;
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
