//! Background usage worker
//!
//! Every served file is pushed onto a bounded queue. A single worker drains
//! it in order and records the usage in the store, so the request path never
//! waits on storage I/O and the ledger has exactly one writer on this path.

use chrono::Utc;
use log::{debug, error, info};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::file::File;
use crate::store::{Store, StoreError};

/// Default number of queued usage events before senders wait
pub const DEFAULT_QUEUE_SIZE: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("usage tracker is closed")]
    Closed,
    #[error("usage worker panicked: {0}")]
    WorkerPanicked(String),
}

/// Counters reported by the worker when it stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageStats {
    /// Existing records marked as used
    pub touched: u64,
    /// Unknown files written to the store
    pub inserted: u64,
    /// Events dropped after a store error
    pub failed: u64,
}

impl UsageStats {
    pub fn applied(&self) -> u64 {
        self.touched + self.inserted
    }

    pub fn total(&self) -> u64 {
        self.applied() + self.failed
    }
}

pub struct UsageTracker {
    sender: Mutex<Option<mpsc::Sender<File>>>,
    worker: Mutex<Option<JoinHandle<UsageStats>>>,
    capacity: usize,
}

impl UsageTracker {
    /// Spawn the worker. Must be called from within a tokio runtime.
    pub fn start(store: Arc<dyn Store>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        info!("Starting usage worker with queue size {}", capacity);
        let worker = tokio::task::spawn_blocking(move || run(store, receiver));
        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue a usage event, waiting while the queue is full
    pub async fn track(&self, file: File) -> Result<(), UsageError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(UsageError::Closed)?;
        sender.send(file).await.map_err(|_| UsageError::Closed)
    }

    /// Stop accepting events, let the worker drain the queue and wait for it
    pub async fn close(&self) -> Result<UsageStats, UsageError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if sender.is_none() {
            return Err(UsageError::Closed);
        }
        drop(sender);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or(UsageError::Closed)?;
        let stats = worker
            .await
            .map_err(|e| UsageError::WorkerPanicked(e.to_string()))?;
        info!(
            "Usage worker stopped: {} touched, {} inserted, {} failed",
            stats.touched, stats.inserted, stats.failed
        );
        Ok(stats)
    }
}

fn run(store: Arc<dyn Store>, mut receiver: mpsc::Receiver<File>) -> UsageStats {
    let mut stats = UsageStats::default();
    while let Some(file) = receiver.blocking_recv() {
        apply(store.as_ref(), file, &mut stats);
    }
    stats
}

/// Record one usage event: touch the record, or insert it on a miss
pub(crate) fn apply(store: &dyn Store, file: File, stats: &mut UsageStats) {
    match store.use_file(&file) {
        Ok(()) => stats.touched += 1,
        Err(StoreError::NotFound(_)) => {
            debug!("db miss for {}, writing to database", file.hex_id());
            let file = file.with_last_used(Utc::now());
            match store.add(&file) {
                Ok(()) => stats.inserted += 1,
                Err(e) => {
                    error!("db error while adding file {}: {}", file, e);
                    stats.failed += 1;
                }
            }
        }
        Err(e) => {
            error!("db error while using file {}: {}", file, e);
            stats.failed += 1;
        }
    }
}
