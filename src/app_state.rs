//! Application State Management
//!
//! This module provides the application state that contains the cache server
//! and its dependencies, following the dependency injection pattern.

use std::sync::Arc;
use std::time::Duration;
use log::info;

use crate::config::{AppConfig, CacheBackend, StoreBackend};
use crate::frontend::{Frontend, local_store::DiskFrontend, mock_store::MockFrontend};
use crate::server::{Server, ServerConfig};
use crate::store::{Store, sqlite_store::SqliteStore, mock_store::MockStore};

/// Application state shared by every HTTP worker
#[derive(Clone)]
pub struct AppState {
    pub server: Arc<Server>,
    pub config: AppConfig,
}

impl AppState {
    /// Create a new application state with backends configured from YAML config
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        Self::from_config(AppConfig::load()?)
    }

    /// Create application state from configuration. Needs a tokio runtime.
    pub fn from_config(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Initializing application state with configuration");

        let store: Arc<dyn Store> = match config.store.backend {
            StoreBackend::SQLite => {
                info!("Using SQLite store with db_path: {}, wal_mode: {}",
                      config.store.db_path, config.store.wal_mode);
                Arc::new(SqliteStore::open(&config.store.db_path, config.store.wal_mode)?)
            }
            StoreBackend::Mock => {
                info!("Using mock store");
                Arc::new(MockStore::new())
            }
        };

        let frontend: Arc<dyn Frontend> = match config.cache.backend {
            CacheBackend::Disk => {
                info!("Using disk cache at {}", config.cache.cache_dir);
                Arc::new(DiskFrontend::new(&config.cache.cache_dir)?)
            }
            CacheBackend::Mock => {
                info!("Using mock cache");
                Arc::new(MockFrontend::new())
            }
        };

        let state = Self::with_backends(config, store, frontend);
        if state.config.collect.enabled {
            state.server.spawn_collector(
                Duration::from_secs(state.config.collect.interval.max(1)),
                Duration::from_secs(state.config.collect.max_age),
            );
        }
        info!("Application state initialized successfully");
        Ok(state)
    }

    /// Build state around explicit backends. Needs a tokio runtime.
    pub fn with_backends(config: AppConfig, store: Arc<dyn Store>, frontend: Arc<dyn Frontend>) -> Self {
        let server_config = ServerConfig::new(config.credentials.clone(), frontend, store)
            .with_proxy_mode(config.proxy.mode)
            .with_queue_size(config.usage.queue_size);

        Self {
            server: Arc::new(Server::start(server_config)),
            config,
        }
    }

    /// Create application state for testing with mock backends
    pub fn new_for_testing() -> Self {
        let mut config = AppConfig::default();
        config.credentials.key = "testkey".to_string();
        config.store.backend = StoreBackend::Mock;
        config.cache.backend = CacheBackend::Mock;
        Self::with_backends(config, Arc::new(MockStore::new()), Arc::new(MockFrontend::new()))
    }
}
