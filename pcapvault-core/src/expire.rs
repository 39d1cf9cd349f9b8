//! Retention-based expiry of archived pcap files.
//!
//! The worker asks a [`FileIndex`] for files older than the retention
//! window, deletes each object from the store and then its index entry.
//! Reads that race a delete see the usual "no longer available" error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{ExpireError, IndexError, StoreError};
use crate::io::{ObjectLocation, ObjectStoreClient};

/// An archived file as listed by the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedFile {
    pub node: String,
    pub num: u64,
    pub name: String,
    /// Timestamp of the first packet in the file
    pub first_timestamp: DateTime<Utc>,
}

/// File bookkeeping needed by the expiry worker.
#[async_trait]
pub trait FileIndex: Send + Sync {
    /// Files whose first packet is older than `before`.
    async fn expired_files(&self, before: DateTime<Utc>) -> Result<Vec<ArchivedFile>, IndexError>;

    /// Remove the index entry of file `num` written by `node`.
    async fn delete_file(&self, node: &str, num: u64) -> Result<(), IndexError>;
}

/// Outcome of one expiry pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryReport {
    /// Files older than the retention window
    pub examined: usize,
    /// Objects deleted along with their index entry
    pub deleted: usize,
    /// Objects already gone; index entry removed anyway
    pub missing: usize,
    /// Files left in place for the next pass
    pub failed: usize,
}

/// Periodic deleter of files past their retention window.
pub struct ExpiryWorker {
    store: Arc<dyn ObjectStoreClient>,
    index: Arc<dyn FileIndex>,
    retention: chrono::Duration,
    interval: Duration,
}

impl ExpiryWorker {
    pub fn new(
        store: Arc<dyn ObjectStoreClient>,
        index: Arc<dyn FileIndex>,
        retention: chrono::Duration,
    ) -> Self {
        Self {
            store,
            index,
            retention,
            interval: Duration::from_secs(60),
        }
    }

    /// Set the time between passes of [`run`](Self::run).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn retention(&self) -> chrono::Duration {
        self.retention
    }

    /// Expire every file older than `now - retention`.
    ///
    /// Only a failure to list expired files is returned as an error;
    /// per-file failures are counted in the report.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<ExpiryReport, IndexError> {
        let cutoff = now - self.retention;
        let files = self.index.expired_files(cutoff).await?;

        let mut report = ExpiryReport {
            examined: files.len(),
            ..Default::default()
        };

        for file in &files {
            match self.expire_file(file).await {
                Ok(true) => report.deleted += 1,
                Ok(false) => report.missing += 1,
                Err(e) => {
                    warn!(node = %file.node, num = file.num, name = %file.name, error = %e, "Failed to expire file");
                    report.failed += 1;
                }
            }
        }

        info!(
            cutoff = %cutoff,
            examined = report.examined,
            deleted = report.deleted,
            missing = report.missing,
            failed = report.failed,
            "Expiry pass complete"
        );
        Ok(report)
    }

    /// Returns whether the object still existed.
    async fn expire_file(&self, file: &ArchivedFile) -> Result<bool, ExpireError> {
        let location = ObjectLocation::parse(&file.name)?;

        let existed = match self.store.delete(&location).await {
            Ok(()) => true,
            Err(StoreError::NotFound { .. }) => {
                debug!(name = %file.name, "Object already gone");
                false
            }
            Err(e) => return Err(e.into()),
        };

        self.index.delete_file(&file.node, file.num).await?;

        Ok(existed)
    }

    /// Run expiry passes on a fixed interval until `shutdown` turns true or
    /// its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once(Utc::now()).await {
                        warn!(error = %e, "Expiry pass failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Expiry worker stopped");
    }
}

impl std::fmt::Debug for ExpiryWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiryWorker")
            .field("retention", &self.retention)
            .field("interval", &self.interval)
            .finish()
    }
}
