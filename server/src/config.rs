//! Server configuration.

use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use serde::Deserialize;
use xdg::BaseDirectories;

/// Application prefix in XDG base directories.
///
/// This will be concatenated into `$XDG_CONFIG_HOME/reel`.
const XDG_PREFIX: &str = "reel";

/// Environment variable storing the Base64-encoded TOML configuration.
///
/// This is useful for deploying to certain application platforms.
const ENV_CONFIG_BASE64: &str = "REEL_SERVER_CONFIG_BASE64";

/// Environment variable storing the database connection string.
const ENV_DATABASE_URL: &str = "REEL_SERVER_DATABASE_URL";

/// Configuration for the Reel Server.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Socket address to listen on.
    ///
    /// The edge router distributes requests across the replica
    /// listeners round-robin.
    #[serde(default = "default_listen_address")]
    pub listen: SocketAddr,

    /// The directory chunks are staged in and final artifacts are
    /// written to.
    ///
    /// Every replica of the fleet must see the same directory: chunks of
    /// one upload land on different replicas, and the replica that
    /// assembles the file reads all of them. Mount a shared volume here
    /// in any multi-host deployment.
    #[serde(rename = "upload-dir")]
    pub upload_dir: PathBuf,

    /// Catalog database connection.
    pub database: DatabaseConfig,

    /// Shared session store connection.
    #[serde(rename = "session-store")]
    #[serde(default = "Default::default")]
    pub session_store: SessionStoreConfig,

    /// Search indexing.
    #[serde(default = "Default::default")]
    pub search: SearchConfig,

    /// External media tool.
    #[serde(default = "Default::default")]
    pub media: MediaConfig,

    /// Garbage collection of orphaned staging directories.
    #[serde(rename = "garbage-collection")]
    #[serde(default = "Default::default")]
    pub garbage_collection: GarbageCollectionConfig,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL.
    #[serde(default = "load_database_url_from_env")]
    pub url: String,

    /// Whether to enable sending of periodic heartbeat queries.
    ///
    /// If enabled, a heartbeat query will be sent every minute.
    #[serde(default = "default_db_heartbeat")]
    pub heartbeat: bool,

    /// Maximum number of pooled connections.
    #[serde(rename = "max-connections")]
    #[serde(default = "default_db_max_connections")]
    pub max_connections: u32,

    /// How long an unused connection may stay in the pool before it is
    /// closed. At least one connection is always kept alive.
    #[serde(rename = "idle-timeout")]
    #[serde(with = "humantime_serde", default = "default_db_idle_timeout")]
    pub idle_timeout: Duration,
}

/// Session store connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionStoreConfig {
    /// Redis connection URL.
    ///
    /// All replicas must point at the same instance; the store is what
    /// makes cross-replica chunk ingestion coherent.
    #[serde(default = "default_session_store_url")]
    pub url: String,

    /// How long an untouched session lives before the store expires it.
    ///
    /// Every accepted chunk refreshes the clock, so this bounds the
    /// lifetime of abandoned uploads, not of slow ones.
    #[serde(with = "humantime_serde", default = "default_session_ttl")]
    pub ttl: Duration,
}

/// Search indexing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Base endpoint of the search engine.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Index that receives upload lifecycle documents.
    #[serde(default = "default_search_index")]
    pub index: String,
}

/// External media tool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Path to the ffmpeg binary.
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,

    /// Path to the ffprobe binary.
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
}

/// Garbage collection config.
#[derive(Debug, Clone, Deserialize)]
pub struct GarbageCollectionConfig {
    /// The frequency to run garbage collection at.
    ///
    /// If zero, automatic garbage collection is disabled, but it can
    /// still be run manually with `reeld --mode sweeper-once`.
    #[serde(with = "humantime_serde", default = "default_gc_interval")]
    pub interval: Duration,

    /// How old a staging directory without a live session must be
    /// before it is removed.
    #[serde(rename = "grace-period")]
    #[serde(with = "humantime_serde", default = "default_gc_grace_period")]
    pub grace_period: Duration,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            url: default_session_store_url(),
            ttl: default_session_ttl(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            index: default_search_index(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

impl Default for GarbageCollectionConfig {
    fn default() -> Self {
        Self {
            interval: default_gc_interval(),
            grace_period: default_gc_grace_period(),
        }
    }
}

fn load_database_url_from_env() -> String {
    env::var(ENV_DATABASE_URL).unwrap_or_else(|_| {
        panic!(
            "Database URL must be specified in either database.url \
            or the {ENV_DATABASE_URL} environment."
        )
    })
}

fn default_listen_address() -> SocketAddr {
    "[::]:5000".parse().unwrap()
}

fn default_db_heartbeat() -> bool {
    false
}

fn default_db_max_connections() -> u32 {
    16
}

fn default_db_idle_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_session_store_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_search_endpoint() -> String {
    "http://127.0.0.1:9200".to_string()
}

fn default_search_index() -> String {
    "videos".to_string()
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_gc_interval() -> Duration {
    Duration::from_secs(3600)
}

fn default_gc_grace_period() -> Duration {
    Duration::from_secs(24 * 3600)
}

pub fn load_config_from_path(path: &Path) -> Result<Config> {
    tracing::info!("Using configurations: {:?}", path);

    let config = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&config)?)
}

pub fn load_config_from_str(s: &str) -> Result<Config> {
    tracing::info!("Using configurations from environment variable");
    Ok(toml::from_str(s)?)
}

pub fn load_config_from_env() -> Result<Config> {
    let encoded = env::var(ENV_CONFIG_BASE64)?;
    let decoded = String::from_utf8(BASE64_STANDARD.decode(encoded.as_bytes())?)?;

    load_config_from_str(&decoded)
}

pub fn config_env_is_set() -> bool {
    env::var(ENV_CONFIG_BASE64).is_ok()
}

pub fn get_xdg_config_path() -> Result<PathBuf> {
    let xdg_dirs = BaseDirectories::with_prefix(XDG_PREFIX)?;
    let config_path = xdg_dirs.place_config_file("server.toml")?;

    Ok(config_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config: Config = toml::from_str(
            r#"
upload-dir = "/srv/reel/uploads"

[database]
url = "sqlite:///srv/reel/catalog.db?mode=rwc"
"#,
        )
        .unwrap();

        assert_eq!(config.listen, "[::]:5000".parse().unwrap());
        assert_eq!(config.upload_dir, PathBuf::from("/srv/reel/uploads"));
        assert_eq!(config.database.max_connections, 16);
        assert_eq!(config.session_store.ttl, Duration::from_secs(86400));
        assert_eq!(config.search.index, "videos");
        assert_eq!(config.garbage_collection.interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_full_config() {
        let config: Config = toml::from_str(
            r#"
listen = "[::]:5050"
upload-dir = "/mnt/shared/uploads"

[database]
url = "sqlite:///mnt/shared/catalog.db?mode=rwc"
heartbeat = true
max-connections = 4
idle-timeout = "2m"

[session-store]
url = "redis://session-store.internal:6379"
ttl = "12h"

[search]
endpoint = "http://search.internal:9200"
index = "ingest"

[media]
ffmpeg = "/usr/local/bin/ffmpeg"
ffprobe = "/usr/local/bin/ffprobe"

[garbage-collection]
interval = "30m"
grace-period = "2h"
"#,
        )
        .unwrap();

        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.database.idle_timeout, Duration::from_secs(120));
        assert_eq!(config.session_store.ttl, Duration::from_secs(12 * 3600));
        assert_eq!(config.garbage_collection.grace_period, Duration::from_secs(7200));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let result: Result<Config, _> = toml::from_str(
            r#"
upload-dir = "/srv/reel/uploads"
uplod-dir = "/typo"

[database]
url = "sqlite://catalog.db"
"#,
        );
        assert!(result.is_err());
    }
}
