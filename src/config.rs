use anyhow::Result;
use config as config_loader;
use dotenvy::dotenv;
use serde::Deserialize;
use std::{path::Path, time::Duration};

use crate::core::error::CrawlError;

/// Environment override prefix, e.g. `SPIDER__RPC__URL`
pub const ENV_PREFIX: &str = "SPIDER";

/// Global config structure
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub rpc: RpcConfig,
    pub storage: StorageConfig,
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// RPC related config
#[derive(Debug, Deserialize, Clone)]
pub struct RpcConfig {
    pub url: String,
    #[serde(default = "RpcConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RpcConfig {
    fn default_timeout_secs() -> u64 {
        15
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// RocksDB storage config
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub path: String,
}

/// Crawl pipeline config
#[derive(Debug, Deserialize, Clone)]
pub struct CrawlerConfig {
    pub chain_name: String,
    /// Expected chain id; checked against the node and the persisted state
    #[serde(default)]
    pub chain_id: Option<u64>,
    /// Blocks fetched concurrently per tick
    #[serde(default = "CrawlerConfig::default_routines")]
    pub routines: usize,
    /// Retained window of accepted blocks
    #[serde(default = "CrawlerConfig::default_cache_limit")]
    pub cache_limit: usize,
    #[serde(default = "CrawlerConfig::default_tick_interval_millis")]
    pub tick_interval_millis: u64,
    /// First block on a fresh database; the remote head when unset
    #[serde(default)]
    pub start_block: Option<u64>,
    /// Deepest reorg resolved before giving up; bounded by the cache when unset
    #[serde(default)]
    pub max_reorg_depth: Option<u64>,
    #[serde(default = "CrawlerConfig::default_publish_retries")]
    pub publish_retries: u32,
    #[serde(default = "CrawlerConfig::default_publish_retry_delay_millis")]
    pub publish_retry_delay_millis: u64,
}

impl CrawlerConfig {
    fn default_routines() -> usize {
        4
    }
    fn default_cache_limit() -> usize {
        128
    }
    fn default_tick_interval_millis() -> u64 {
        5000
    }
    fn default_publish_retries() -> u32 {
        3
    }
    fn default_publish_retry_delay_millis() -> u64 {
        500
    }

    pub fn new(chain_name: impl Into<String>) -> Self {
        Self {
            chain_name: chain_name.into(),
            chain_id: None,
            routines: Self::default_routines(),
            cache_limit: Self::default_cache_limit(),
            tick_interval_millis: Self::default_tick_interval_millis(),
            start_block: None,
            max_reorg_depth: None,
            publish_retries: Self::default_publish_retries(),
            publish_retry_delay_millis: Self::default_publish_retry_delay_millis(),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_millis)
    }

    pub fn publish_retry_delay(&self) -> Duration {
        Duration::from_millis(self.publish_retry_delay_millis)
    }

    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.routines == 0 {
            return Err(CrawlError::Config(
                "crawler.routines must be at least 1".to_string(),
            ));
        }
        if self.cache_limit == 0 {
            return Err(CrawlError::Config(
                "crawler.cache_limit must be at least 1".to_string(),
            ));
        }
        if self.tick_interval_millis == 0 {
            return Err(CrawlError::Config(
                "crawler.tick_interval_millis must be positive".to_string(),
            ));
        }
        if self.chain_name.is_empty() || self.chain_name.contains(':') {
            return Err(CrawlError::Config(format!(
                "crawler.chain_name {:?} must be non-empty and free of ':'",
                self.chain_name
            )));
        }
        Ok(())
    }
}

/// Logging config
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    #[serde(default = "LoggingConfig::default_to_file")]
    pub to_file: bool,
    #[serde(default = "LoggingConfig::default_file_path")]
    pub file_path: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
    fn default_to_file() -> bool {
        true
    }
    fn default_file_path() -> String {
        "./logs/spider.log".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            to_file: Self::default_to_file(),
            file_path: Self::default_file_path(),
        }
    }
}

/// Metrics config
#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "MetricsConfig::default_enable")]
    pub enable: bool,
    #[serde(default = "MetricsConfig::default_prometheus_exporter_port")]
    pub prometheus_exporter_port: u16,
}

impl MetricsConfig {
    fn default_enable() -> bool {
        true
    }
    fn default_prometheus_exporter_port() -> u16 {
        9100
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enable: Self::default_enable(),
            prometheus_exporter_port: Self::default_prometheus_exporter_port(),
        }
    }
}

/// Status API config
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "ApiConfig::default_listen_addr")]
    pub listen_addr: String,
}

impl ApiConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:9001".to_string()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
        }
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        dotenv().ok(); // Load the .env file

        if !path.as_ref().exists() {
            anyhow::bail!("Config file not found: {:?}", path.as_ref());
        }

        let builder = config_loader::Config::builder()
            .add_source(config_loader::File::from(path.as_ref().to_path_buf()))
            .add_source(config_loader::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg = builder.try_deserialize::<AppConfig>()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.rpc.url.trim().is_empty() {
            return Err(CrawlError::Config("rpc.url must be set".to_string()));
        }
        if self.storage.path.trim().is_empty() {
            return Err(CrawlError::Config("storage.path must be set".to_string()));
        }
        self.crawler.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(body: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn minimal_file_gets_defaults() {
        let file = write_config(
            r#"
rpc:
  url: "http://localhost:8545"
storage:
  path: "./data"
crawler:
  chain_name: "ethereum"
"#,
        );

        let cfg = AppConfig::load(file.path()).unwrap();
        assert_eq!(cfg.rpc.timeout_secs, 15);
        assert_eq!(cfg.crawler.routines, 4);
        assert_eq!(cfg.crawler.cache_limit, 128);
        assert_eq!(cfg.crawler.tick_interval(), Duration::from_secs(5));
        assert_eq!(cfg.crawler.start_block, None);
        assert_eq!(cfg.crawler.max_reorg_depth, None);
        assert_eq!(cfg.crawler.publish_retries, 3);
        assert_eq!(cfg.api.listen_addr, "0.0.0.0:9001");
        assert!(cfg.metrics.enable);
    }

    #[test]
    fn explicit_values_are_kept() {
        let file = write_config(
            r#"
rpc:
  url: "http://localhost:8545"
  timeout_secs: 3
storage:
  path: "./data"
crawler:
  chain_name: "sepolia"
  chain_id: 11155111
  routines: 16
  cache_limit: 64
  start_block: 5000000
  max_reorg_depth: 32
logging:
  level: "debug"
  to_file: false
"#,
        );

        let cfg = AppConfig::load(file.path()).unwrap();
        assert_eq!(cfg.crawler.chain_id, Some(11155111));
        assert_eq!(cfg.crawler.routines, 16);
        assert_eq!(cfg.crawler.start_block, Some(5_000_000));
        assert_eq!(cfg.crawler.max_reorg_depth, Some(32));
        assert_eq!(cfg.logging.level, "debug");
        assert!(!cfg.logging.to_file);
    }

    #[test]
    fn zero_routines_is_a_config_error() {
        let file = write_config(
            r#"
rpc:
  url: "http://localhost:8545"
storage:
  path: "./data"
crawler:
  chain_name: "ethereum"
  routines: 0
"#,
        );

        let err = AppConfig::load(file.path()).unwrap_err();
        let crawl = err.downcast_ref::<CrawlError>().expect("typed config error");
        assert!(crawl.is_fatal());
    }

    #[test]
    fn crawler_config_validation() {
        let mut cfg = CrawlerConfig::new("ethereum");
        assert!(cfg.validate().is_ok());

        cfg.cache_limit = 0;
        assert!(matches!(cfg.validate(), Err(CrawlError::Config(_))));

        let mut cfg = CrawlerConfig::new("eth:main");
        assert!(cfg.validate().is_err());
        cfg.chain_name = "eth".to_string();
        cfg.tick_interval_millis = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_file_is_reported() {
        assert!(AppConfig::load("/definitely/not/here.yaml").is_err());
    }
}
