//! Background collector for stale ledger records
//!
//! Periodically removes every record that has not been used for `max_age`.
//! Sweeps run on the blocking pool since a collect is a full table operation.

use chrono::{Duration as ChronoDuration, Utc};
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use crate::store::{Store, StoreError};

pub struct Collector {
    store: Arc<dyn Store>,
    interval: Duration,
    max_age: Duration,
}

impl Collector {
    pub fn new(store: Arc<dyn Store>, interval: Duration, max_age: Duration) -> Self {
        Self {
            store,
            interval,
            max_age,
        }
    }

    /// Run one sweep, returning the number of evicted records
    pub async fn run_once(&self) -> Result<u64, StoreError> {
        // an age beyond the representable range evicts nothing
        let cutoff = ChronoDuration::from_std(self.max_age)
            .ok()
            .and_then(|max_age| Utc::now().checked_sub_signed(max_age))
            .unwrap_or_default();
        let store = Arc::clone(&self.store);

        let removed = tokio::task::spawn_blocking(move || store.collect(cutoff))
            .await
            .map_err(|e| StoreError::Corrupt(format!("collect task failed: {}", e)))??;
        if removed > 0 {
            info!("Collected {} files unused since {}", removed, cutoff);
        } else {
            debug!("Collect found nothing unused since {}", cutoff);
        }
        Ok(removed)
    }

    /// Start the collector as a background task (non-blocking)
    pub fn start_background(self) -> tokio::task::JoinHandle<()> {
        info!(
            "Starting collector with {}s interval, max age {}s",
            self.interval.as_secs(),
            self.max_age.as_secs()
        );

        tokio::spawn(async move {
            let mut interval = time::interval(self.interval);
            // first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;

                if let Err(e) = self.run_once().await {
                    error!("Error collecting stale files: {}", e);
                }
            }
        })
    }
}
