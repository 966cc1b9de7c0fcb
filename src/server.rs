//! Cache node composition
//!
//! Ties the auth gate, the usage pipeline, the store and the frontend
//! together. HTTP handlers only talk to a `Server`.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use bytes::{Bytes, BytesMut};
use log::{error, info, warn};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::args::Args;
use crate::auth::{self, AuthError, Credentials};
use crate::file::File;
use crate::frontend::{Frontend, FrontendError};
use crate::proxy::{self, ProxyDecision, ProxyMode};
use crate::service::collector::Collector;
use crate::service::usage_worker::{UsageError, UsageStats, UsageTracker, DEFAULT_QUEUE_SIZE};
use crate::store::{Store, StoreError};

/// Argument carrying the proxy passkey on proxied requests
pub const ARGS_PASSKEY: &str = "passkey";

/// Everything a server needs, built once at startup
#[derive(Clone)]
pub struct ServerConfig {
    pub credentials: Credentials,
    pub frontend: Arc<dyn Frontend>,
    pub store: Arc<dyn Store>,
    pub proxy_mode: ProxyMode,
    pub queue_size: usize,
}

impl ServerConfig {
    pub fn new(credentials: Credentials, frontend: Arc<dyn Frontend>, store: Arc<dyn Store>) -> Self {
        Self {
            credentials,
            frontend,
            store,
            proxy_mode: ProxyMode::default(),
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }

    pub fn with_proxy_mode(mut self, proxy_mode: ProxyMode) -> Self {
        self.proxy_mode = proxy_mode;
        self
    }

    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("proxy request rejected")]
    ProxyRejected,
    #[error("proxy passkey required")]
    PasskeyRequired,
    #[error(transparent)]
    Frontend(#[from] FrontendError),
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Auth(e) => e.status_code(),
            ServerError::ProxyRejected => StatusCode::FORBIDDEN,
            ServerError::PasskeyRequired => StatusCode::UNAUTHORIZED,
            ServerError::Frontend(FrontendError::NotCached(_)) => StatusCode::NOT_FOUND,
            ServerError::Frontend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Usage(UsageError::Closed) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Usage(_) | ServerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // internal details stay in the logs
        let message = match self {
            ServerError::Auth(e) => e.to_string(),
            ServerError::ProxyRejected => "proxy request rejected".to_string(),
            ServerError::PasskeyRequired => "passkey required".to_string(),
            ServerError::Frontend(FrontendError::NotCached(_)) => "file not found".to_string(),
            ServerError::Usage(UsageError::Closed) => "shutting down".to_string(),
            _ => "internal error".to_string(),
        };
        HttpResponse::build(status)
            .content_type("text/plain; charset=utf-8")
            .body(format!("{}: {}", status.as_u16(), message))
    }
}

/// Snapshot reported by the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub proxy_mode: ProxyMode,
    pub stored_files: u64,
    pub queue_capacity: usize,
}

pub struct Server {
    credentials: Credentials,
    frontend: Arc<dyn Frontend>,
    store: Arc<dyn Store>,
    proxy_mode: ProxyMode,
    usage: UsageTracker,
    collector: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    /// Build the server and start its usage worker. Needs a tokio runtime.
    pub fn start(config: ServerConfig) -> Self {
        info!(
            "Starting cache server for client {} (proxy: {})",
            config.credentials.client_id,
            config.proxy_mode.description()
        );
        let usage = UsageTracker::start(Arc::clone(&config.store), config.queue_size);
        Self {
            credentials: config.credentials,
            frontend: config.frontend,
            store: config.store,
            proxy_mode: config.proxy_mode,
            usage,
            collector: Mutex::new(None),
        }
    }

    pub fn proxy_mode(&self) -> ProxyMode {
        self.proxy_mode
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Validate a file request and record its usage
    pub async fn authorize(&self, file_id: &str, args: &str, now: i64) -> Result<File, ServerError> {
        let file = auth::authorize(&self.credentials, file_id, args, now)?;
        self.usage.track(file.clone()).await?;
        Ok(file)
    }

    /// Apply the proxy policy for `origin`, then validate the request as usual
    pub async fn authorize_proxied(
        &self,
        origin: Option<IpAddr>,
        file_id: &str,
        args: &str,
        now: i64,
    ) -> Result<File, ServerError> {
        let origin_is_local = origin.map(proxy::is_local_origin).unwrap_or(false);
        let has_passkey = self.credentials.check_passkey(Args::parse(args).get(ARGS_PASSKEY));

        match proxy::classify(origin_is_local, has_passkey, self.proxy_mode) {
            ProxyDecision::Allow => self.authorize(file_id, args, now).await,
            ProxyDecision::RequirePasskeyNotSatisfied => {
                warn!("Proxy request from {:?} without valid passkey", origin);
                Err(ServerError::PasskeyRequired)
            }
            ProxyDecision::Reject => {
                warn!("Proxy request from {:?} rejected ({})", origin, self.proxy_mode.description());
                Err(ServerError::ProxyRejected)
            }
        }
    }

    /// Read the cached bytes of an authorized file
    pub fn deliver(&self, file: &File) -> Result<Bytes, ServerError> {
        // the claimed size is untrusted; the frontend reserves once it knows the real one
        let mut sink = BytesMut::new();
        self.frontend.deliver(file, &mut sink).map_err(|e| {
            match &e {
                FrontendError::NotCached(_) => warn!("{}", e),
                _ => error!("Failed to deliver {}: {}", file, e),
            }
            ServerError::from(e)
        })?;
        Ok(sink.freeze())
    }

    /// Start periodic eviction. Replaces a collector started earlier.
    pub fn spawn_collector(&self, interval: Duration, max_age: Duration) {
        let handle = Collector::new(Arc::clone(&self.store), interval, max_age).start_background();
        let previous = self
            .collector
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub fn status(&self) -> Result<ServerStatus, ServerError> {
        Ok(ServerStatus {
            proxy_mode: self.proxy_mode,
            stored_files: self.store.count()?,
            queue_capacity: self.usage.capacity(),
        })
    }

    /// Stop the collector, drain the usage queue, then close the store
    pub async fn close(&self) -> Result<UsageStats, ServerError> {
        let collector = self
            .collector
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(collector) = collector {
            collector.abort();
        }

        let stats = self.usage.close().await?;
        self.store.close()?;
        info!("Cache server closed");
        Ok(stats)
    }
}
