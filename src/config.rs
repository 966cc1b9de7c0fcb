//! Application Configuration
//!
//! This module provides configuration management for the cache node,
//! supporting YAML configuration files with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use log::{info, warn};

use crate::auth::Credentials;
use crate::proxy::ProxyMode;
use crate::service::usage_worker::DEFAULT_QUEUE_SIZE;

const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Ledger backend types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StoreBackend {
    SQLite,
    Mock,
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::SQLite
    }
}

/// Cached content backend types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CacheBackend {
    Disk,
    Mock,
}

impl Default for CacheBackend {
    fn default() -> Self {
        CacheBackend::Disk
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration
    pub server: ListenConfig,
    /// Node identity and shared secrets
    pub credentials: Credentials,
    /// Usage ledger configuration
    pub store: StoreConfig,
    /// Cached content configuration
    pub cache: CacheConfig,
    /// Usage worker configuration
    pub usage: UsageConfig,
    /// Eviction configuration
    pub collect: CollectConfig,
    /// Proxy policy
    pub proxy: ProxyConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
    /// Number of worker threads
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Database file path
    pub db_path: String,
    /// Enable WAL mode
    pub wal_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub cache_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageConfig {
    /// Usage events buffered before request handlers wait
    pub queue_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectConfig {
    /// Enable the periodic collector
    pub enabled: bool,
    /// Sweep interval in seconds
    pub interval: u64,
    /// Files unused for this many seconds are evicted
    pub max_age: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub mode: ProxyMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Path to log configuration file
    pub config_file: String,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9710,
            workers: 4,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::SQLite,
            db_path: "./data/hath.sqlite".to_string(),
            wal_mode: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Disk,
            cache_dir: "./data/cache".to_string(),
        }
    }
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 3600,    // 1 hour
            max_age: 604800,   // 1 week
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            config_file: "server_log.yaml".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ListenConfig::default(),
            credentials: Credentials::default(),
            store: StoreConfig::default(),
            cache: CacheConfig::default(),
            usage: UsageConfig::default(),
            collect: CollectConfig::default(),
            proxy: ProxyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `CONFIG_FILE` (or `config.yaml`), use defaults if not found
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let mut config = Self::load_from(&config_path)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from<P: AsRef<Path>>(config_path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = config_path.as_ref();
        if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            let config: AppConfig = serde_yaml::from_str(&content)?;
            info!("Loaded configuration from {}", config_path.display());
            Ok(config)
        } else {
            warn!("Config file {} not found, using defaults", config_path.display());
            Ok(Self::default())
        }
    }

    /// Environment overrides for deployment secrets and paths
    fn apply_env(&mut self) {
        if let Ok(path) = env::var("DB_FILE") {
            info!("Using database path from environment: {}", path);
            self.store.db_path = path;
        }
        if let Ok(key) = env::var("HATH_CLIENT_KEY") {
            info!("Using client key from environment");
            self.credentials.key = key;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 9710);
        assert_eq!(config.store.backend, StoreBackend::SQLite);
        assert_eq!(config.cache.backend, CacheBackend::Disk);
        assert_eq!(config.usage.queue_size, 100);
        assert_eq!(config.proxy.mode, ProxyMode::Disabled);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "
credentials:
  client_id: 42
  key: abcdef
  passkey: letmein
proxy:
  mode: 2
store:
  backend: Mock
  db_path: /tmp/unused.sqlite
  wal_mode: false
";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.credentials.client_id, 42);
        assert_eq!(config.credentials.key, "abcdef");
        assert_eq!(config.credentials.passkey.as_deref(), Some("letmein"));
        assert_eq!(config.proxy.mode, ProxyMode::LocalNetworksProtected);
        assert_eq!(config.store.backend, StoreBackend::Mock);
        assert_eq!(config.collect.max_age, 604800);
    }

    #[test]
    fn test_invalid_proxy_mode_rejected() {
        let yaml = "proxy:\n  mode: 7\n";
        assert!(serde_yaml::from_str::<AppConfig>(yaml).is_err());
    }

    #[test]
    fn test_load_from_missing_file() {
        let config = AppConfig::load_from("/definitely/not/here.yaml").unwrap();
        assert_eq!(config.server.port, 9710);
    }

    #[test]
    #[serial]
    fn test_load_with_env_overrides() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "credentials:\n  key: fromfile\nusage:\n  queue_size: 7").unwrap();

        env::set_var("CONFIG_FILE", file.path());
        env::set_var("DB_FILE", "/tmp/override.sqlite");
        env::set_var("HATH_CLIENT_KEY", "fromenv");
        let config = AppConfig::load().unwrap();
        env::remove_var("CONFIG_FILE");
        env::remove_var("DB_FILE");
        env::remove_var("HATH_CLIENT_KEY");

        assert_eq!(config.usage.queue_size, 7);
        assert_eq!(config.store.db_path, "/tmp/override.sqlite");
        assert_eq!(config.credentials.key, "fromenv");
    }

    #[test]
    #[serial]
    fn test_load_without_env() {
        env::set_var("CONFIG_FILE", "/definitely/not/here.yaml");
        let config = AppConfig::load().unwrap();
        env::remove_var("CONFIG_FILE");
        assert_eq!(config.store.db_path, "./data/hath.sqlite");
    }
}
