//! Core downloader implementation split into focused submodules.
//!
//! The `SegmentDownloader` struct and its methods are organized by domain:
//! - [`probe`] - HEAD probe for size and range support
//! - [`plan`] - Byte-range segmentation
//! - [`worker`] - Per-segment range transfer
//! - [`progress`] - Progress accumulation, batched persistence, terminal resolution
//! - [`orchestrator`] - Start pipeline and the per-download task
//! - [`control`] - Pause, resume and read access
//! - [`lifecycle`] - Shutdown coordination

mod control;
mod lifecycle;
mod orchestrator;
pub mod plan;
pub mod probe;
mod progress;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};

use tokio::sync::{Mutex, Semaphore, broadcast};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::store::DownloadStore;
use crate::types::{DownloadId, Event};

use progress::ProgressTracker;
use worker::WorkerSettings;

/// A download whose task is currently running
pub(crate) struct ActiveDownload {
    /// Distinguishes successive runs of the same download
    pub(crate) run_id: u64,
    /// Cancelled to pause the download
    pub(crate) cancel_token: CancellationToken,
    /// The per-download task; taken by whoever stops the run
    pub(crate) handle: Option<tokio::task::JoinHandle<()>>,
    /// In-memory progress, authoritative between flushes
    pub(crate) progress: Arc<ProgressTracker>,
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct SegmentDownloader {
    /// Record storage (wrapped in Arc for sharing across tasks)
    /// Public for integration tests to inspect persisted records
    pub store: Arc<dyn DownloadStore>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Shared HTTP client for probes and range requests
    pub(crate) client: reqwest::Client,
    /// Bounds concurrent segment transfers across all downloads
    pub(crate) worker_pool: Arc<Semaphore>,
    /// Running downloads by id. An entry stays until its run has committed.
    pub(crate) active_downloads: Arc<Mutex<HashMap<DownloadId, ActiveDownload>>>,
    /// Serializes pause and resume of the same download
    pub(crate) control_locks: Arc<Mutex<HashMap<DownloadId, Arc<Mutex<()>>>>>,
    /// Flag to indicate whether new downloads are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Source of [`ActiveDownload::run_id`]
    pub(crate) next_run_id: Arc<AtomicU64>,
}

impl SegmentDownloader {
    /// Create a new SegmentDownloader backed by the configured SQLite database
    ///
    /// This initializes all core components:
    /// - Creates the download directory
    /// - Opens/creates the SQLite database and runs migrations
    /// - Marks downloads interrupted by a previous process as paused
    /// - Builds the shared HTTP client and worker pool
    pub async fn new(config: Config) -> Result<Self> {
        let db = Database::new(&config.persistence.database_path).await?;
        Self::with_store(config, Arc::new(db)).await
    }

    /// Create a SegmentDownloader on top of any [`DownloadStore`]
    pub async fn with_store(config: Config, store: Arc<dyn DownloadStore>) -> Result<Self> {
        config.validate()?;

        // Ensure download directory exists
        tokio::fs::create_dir_all(&config.download.download_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download.download_dir.display(),
                        e
                    ),
                ))
            })?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.download.connect_timeout)
            .user_agent(config.download.user_agent.clone())
            .build()?;

        // Records left IN_PROGRESS or PENDING belonged to a process that is gone
        let interrupted = store.pause_interrupted().await?;
        if interrupted > 0 {
            tracing::info!(count = interrupted, "Marked interrupted downloads as paused");
        }

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = broadcast::channel(1000);

        let worker_pool = Arc::new(Semaphore::new(config.download.max_concurrent_segments));

        tracing::info!(
            download_dir = %config.download.download_dir.display(),
            max_concurrent_segments = config.download.max_concurrent_segments,
            "Downloader initialized"
        );

        Ok(Self {
            store,
            event_tx,
            config: Arc::new(config),
            client,
            worker_pool,
            active_downloads: Arc::new(Mutex::new(HashMap::new())),
            control_locks: Arc::new(Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
            next_run_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Subscribe to download events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// Events are buffered, but if a subscriber falls behind by more than 1000 events,
    /// it will receive a `RecvError::Lagged` error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use segment_dl::{SegmentDownloader, Config};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = SegmentDownloader::new(Config::default()).await?;
    ///
    ///     let mut events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             tracing::info!(?event, "download event");
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    pub(crate) fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            client: self.client.clone(),
            pool: self.worker_pool.clone(),
            stall_timeout: self.config.download.stall_timeout,
            retry: self.config.retry.clone(),
        }
    }

    /// Spawn the REST API server in a background task
    ///
    /// The server listens on the configured bind address (default: 127.0.0.1:8089).
    pub fn spawn_api_server(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<()>> {
        let downloader = self.clone();
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(downloader, config).await })
    }
}
