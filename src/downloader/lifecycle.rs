//! Shutdown coordination.

use std::sync::atomic::Ordering;

use futures::future::join_all;

use crate::error::Result;
use crate::types::{DownloadId, Event};

use super::SegmentDownloader;

impl SegmentDownloader {
    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new downloads and resumes
    /// 2. Pauses every active download, waiting for its workers to exit
    ///    (bounded by `download.pause_grace_period` per download)
    /// 3. Emits [`Event::Shutdown`]
    /// 4. Closes the store
    ///
    /// Paused downloads keep their segment progress and can be resumed by the
    /// next process.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new downloads
        self.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new downloads");

        // 2. Pause everything that is running, including runs a concurrent
        // resume registered while we were waiting
        loop {
            let ids: Vec<DownloadId> = self.active_downloads.lock().await.keys().copied().collect();
            if ids.is_empty() {
                break;
            }
            tracing::info!(active_count = ids.len(), "Pausing active downloads");
            join_all(ids.into_iter().map(|id| async move {
                let lock = self.control_lock(id).await;
                let _guard = lock.lock().await;
                self.stop_running(id).await;
            }))
            .await;
        }
        tracing::info!("All active downloads paused");

        // 3. Emit shutdown event
        self.emit_event(Event::Shutdown);

        // 4. Close the store
        self.store.close().await;

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Number of downloads with a running task
    pub async fn active_count(&self) -> usize {
        self.active_downloads.lock().await.len()
    }

    /// Whether `start_download` and `resume` are still accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }
}
