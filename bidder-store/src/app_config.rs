use bidder_core::CacheConfig;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub search: SearchSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// Hash holding one JSON record per campaign
    #[serde(default = "default_hash")]
    pub hash: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_hash() -> String { "campaigns".to_string() }
fn default_connect_timeout_ms() -> u64 { 3000 }

impl RedisConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    #[serde(default = "default_cooldown_secs")]
    pub refresh_cooldown_secs: u64,
    #[serde(default = "default_retry_secs")]
    pub retry_interval_secs: u64,
}

fn default_cooldown_secs() -> u64 { 60 }
fn default_retry_secs() -> u64 { 5 }

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            refresh_cooldown_secs: default_cooldown_secs(),
            retry_interval_secs: default_retry_secs(),
        }
    }
}

impl CacheSettings {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            refresh_cooldown: Duration::from_secs(self.refresh_cooldown_secs),
            retry_interval: Duration::from_secs(self.retry_interval_secs),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchSettings {
    /// Parallel workers per membership test. Unset means one per core.
    pub workers: Option<usize>,
    #[serde(default = "default_prefetch")]
    pub stream_prefetch: usize,
}

fn default_prefetch() -> usize { 8 }

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            workers: None,
            stream_prefetch: default_prefetch(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Untracked local overrides
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `BIDDER_REDIS__URL=redis://cache:6379` sets `redis.url`
            .add_source(config::Environment::with_prefix("BIDDER").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .expect("Failed to parse config")
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(
            r#"
            [redis]
            url = "redis://localhost:6379"
            "#,
        );
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.redis.hash, "campaigns");
        assert_eq!(config.redis.connect_timeout(), Duration::from_secs(3));
        assert_eq!(config.cache.cache_config().refresh_cooldown, Duration::from_secs(60));
        assert_eq!(config.search.workers, None);
        assert_eq!(config.search.stream_prefetch, 8);
    }

    #[test]
    fn test_overrides() {
        let config = parse(
            r#"
            [server]
            port = 9000

            [redis]
            url = "redis://cache:6379"
            hash = "bids"

            [cache]
            refresh_cooldown_secs = 10
            retry_interval_secs = 1

            [search]
            workers = 2
            "#,
        );
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.redis.hash, "bids");
        let cache = config.cache.cache_config();
        assert_eq!(cache.refresh_cooldown, Duration::from_secs(10));
        assert_eq!(cache.retry_interval, Duration::from_secs(1));
        assert_eq!(config.search.workers, Some(2));
    }
}
