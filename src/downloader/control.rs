//! Download control: pause, resume, and read access to records and files.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::{DownloadError, Error, Result, TransferError};
use crate::types::{Download, DownloadId, Event, Status};

use super::SegmentDownloader;
use super::plan::plan;
use super::progress::Resolution;

impl SegmentDownloader {
    /// Pause a download
    ///
    /// Signals every worker of the download to stop at its next chunk boundary
    /// and waits for them to exit, bounded by `download.pause_grace_period`.
    /// Written bytes are kept; the partial file is not deleted. Pausing an
    /// already paused download is a no-op.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::NotFound`] when the id is unknown
    /// - [`DownloadError::InvalidState`] when the download is COMPLETED or FAILED
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use segment_dl::*;
    /// # async fn example(downloader: SegmentDownloader, id: DownloadId) -> Result<()> {
    /// let paused = downloader.pause(id).await?;
    /// println!("{} of {} bytes kept", paused.downloaded_size, paused.total_size);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn pause(&self, id: DownloadId) -> Result<Download> {
        let lock = self.control_lock(id).await;
        let _guard = lock.lock().await;

        let download = self.load(id).await?;

        match download.status {
            Status::Paused => return Ok(download),
            Status::Completed | Status::Failed => {
                return Err(invalid_state(id, "pause", download.status));
            }
            Status::Pending | Status::InProgress => {}
        }

        if !self.stop_running(id).await {
            // No task: either it already committed, or the record is orphaned
            let mut download = self.load(id).await?;
            if matches!(download.status, Status::Pending | Status::InProgress) {
                download.status = Status::Paused;
                self.store.update(&download).await?;
                self.emit_event(Event::Paused { id });
                tracing::info!(download_id = id.0, "Marked inactive download as paused");
            }
        }

        self.load(id).await
    }

    /// Lock guarding pause and resume of `id`
    pub(crate) async fn control_lock(&self, id: DownloadId) -> Arc<Mutex<()>> {
        self.control_locks
            .lock()
            .await
            .entry(id)
            .or_default()
            .clone()
    }

    /// Cancel the running task of `id` and wait until its state is committed
    ///
    /// The registry entry stays in place while the run winds down, so nothing
    /// can start a second run next to it. When the task outlives the grace
    /// period it is aborted and the paused state is committed from the
    /// in-memory progress instead. Returns false when nothing was running.
    pub(crate) async fn stop_running(&self, id: DownloadId) -> bool {
        let running = {
            let mut active = self.active_downloads.lock().await;
            active.get_mut(&id).map(|a| {
                (
                    a.run_id,
                    a.cancel_token.clone(),
                    a.handle.take(),
                    a.progress.clone(),
                )
            })
        };
        let Some((run_id, cancel_token, handle, progress)) = running else {
            return false;
        };

        cancel_token.cancel();
        if let Some(mut handle) = handle {
            let grace = self.config.download.pause_grace_period;
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                tracing::warn!(
                    download_id = id.0,
                    grace_ms = grace.as_millis() as u64,
                    "Download did not stop within the grace period, aborting"
                );
                handle.abort();
                let _ = handle.await;

                match self.store.get(id).await {
                    Ok(Some(download)) => {
                        self.commit(download, &progress, Resolution::Paused).await;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!(download_id = id.0, error = %e, "Failed to load download after abort");
                    }
                }
            }
        }

        self.deregister(id, run_id).await;
        true
    }

    /// Resume a download
    ///
    /// Only the unfinished tail of each segment is fetched again; segments that
    /// are already complete are skipped. Resuming a COMPLETED download, or one
    /// that is already running, returns it unchanged.
    ///
    /// A FAILED download is resumed the same way. If it failed before its size
    /// was known, the start pipeline runs again for the same record.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::NotFound`] when the id is unknown
    /// - [`Error::ShuttingDown`] once shutdown has begun
    pub async fn resume(&self, id: DownloadId) -> Result<Download> {
        let lock = self.control_lock(id).await;
        let _guard = lock.lock().await;

        let mut download = self.load(id).await?;

        if download.status == Status::Completed {
            return Ok(download);
        }
        if self.active_downloads.lock().await.contains_key(&id) {
            return Ok(download);
        }
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        if let Err(e) = self.prepare_resume(&mut download).await {
            download.mark_failed(e.to_string());
            self.store.update(&download).await?;
            tracing::warn!(download_id = id.0, error = %e, "Download failed to resume");
            self.emit_event(Event::Failed {
                id,
                error: e.to_string(),
            });
            return Ok(download);
        }

        download.error_message = None;
        download.completion_time = None;
        download.recompute_downloaded();
        if download.start_time.is_none() {
            download.start_time = Some(Utc::now());
        }

        if download.all_segments_complete() {
            download.status = Status::Completed;
            download.completion_time = Some(Utc::now());
            self.store.update(&download).await?;
            tracing::info!(download_id = id.0, "All segments already complete");
            self.emit_event(Event::Completed { id });
            return Ok(download);
        }

        download.status = Status::InProgress;
        self.store.update(&download).await?;

        tracing::info!(
            download_id = id.0,
            downloaded_size = download.downloaded_size,
            total_size = download.total_size,
            "Resuming download"
        );
        self.emit_event(Event::Resumed { id });

        if let Err(e) = self.launch(download.clone()).await {
            download.mark_failed(e.to_string());
            self.store.update(&download).await?;
            self.emit_event(Event::Failed {
                id,
                error: e.to_string(),
            });
        }
        Ok(download)
    }

    /// Make sure a record has segments and a correctly sized output file
    async fn prepare_resume(&self, download: &mut Download) -> std::result::Result<(), TransferError> {
        if download.total_size == 0 {
            // Never got past the probe: run the start pipeline again. The stored
            // name only came from the URL, so the response headers may still rename it
            self.prepare_start(download, None).await?;
            self.store
                .replace_segments(download.id, &mut download.segments)
                .await
                .map_err(|e| TransferError::Storage(e.to_string()))?;
            return Ok(());
        }

        if download.segments.is_empty() {
            download.segments = plan(download.total_size, download.thread_count);
            download.thread_count = download.segments.len() as u32;
            self.store
                .replace_segments(download.id, &mut download.segments)
                .await
                .map_err(|e| TransferError::Storage(e.to_string()))?;
        }

        let created = ensure_allocated(&download.file_path, download.total_size).await?;
        if created && download.segments.iter().any(|s| s.downloaded_bytes > 0) {
            tracing::warn!(
                download_id = download.id.0,
                path = %download.file_path.display(),
                "Output file was missing, restarting every segment"
            );
            for segment in &mut download.segments {
                segment.downloaded_bytes = 0;
            }
            self.store
                .write_progress(download.id, 0, &download.segments)
                .await
                .map_err(|e| TransferError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    /// Get a download by id
    ///
    /// For a running download, the byte counts reflect in-memory progress that
    /// may not have been flushed yet.
    pub async fn get_download(&self, id: DownloadId) -> Result<Option<Download>> {
        let Some(download) = self.store.get(id).await? else {
            return Ok(None);
        };
        Ok(Some(self.with_live_progress(download).await))
    }

    /// List all downloads, newest first
    pub async fn list_downloads(&self) -> Result<Vec<Download>> {
        let downloads = self.store.list().await?;
        let mut result = Vec::with_capacity(downloads.len());
        for download in downloads {
            result.push(self.with_live_progress(download).await);
        }
        Ok(result)
    }

    /// Open the output file of a completed download for reading
    ///
    /// # Errors
    ///
    /// - [`DownloadError::NotFound`] when the id is unknown or the download is not
    ///   COMPLETED
    /// - [`DownloadError::FileNotFound`] when the file has been removed from disk
    pub async fn open_completed_file(&self, id: DownloadId) -> Result<(Download, tokio::fs::File)> {
        let download = self.load(id).await?;
        if download.status != Status::Completed {
            return Err(Error::Download(DownloadError::NotFound { id: id.0 }));
        }

        match tokio::fs::File::open(&download.file_path).await {
            Ok(file) => Ok((download, file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::Download(DownloadError::FileNotFound {
                    id: id.0,
                    path: download.file_path.clone(),
                }))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn load(&self, id: DownloadId) -> Result<Download> {
        self.store
            .get(id)
            .await?
            .ok_or(Error::Download(DownloadError::NotFound { id: id.0 }))
    }

    async fn with_live_progress(&self, mut download: Download) -> Download {
        let tracker = self
            .active_downloads
            .lock()
            .await
            .get(&download.id)
            .map(|active| active.progress.clone());

        if let Some(tracker) = tracker {
            let (downloaded_size, segments) = tracker.snapshot().await;
            if segments.len() == download.segments.len() {
                download.downloaded_size = downloaded_size;
                for (stored, live) in download.segments.iter_mut().zip(segments) {
                    stored.downloaded_bytes = live.downloaded_bytes;
                }
            }
        }
        download
    }
}

fn invalid_state(id: DownloadId, operation: &str, status: Status) -> Error {
    Error::Download(DownloadError::InvalidState {
        id: id.0,
        operation: operation.to_string(),
        current_state: status.to_string(),
    })
}

/// Create the file if missing and grow it to `total_size` if short
///
/// Returns true when the file did not exist.
async fn ensure_allocated(path: &Path, total_size: u64) -> std::result::Result<bool, TransferError> {
    let storage = |e: std::io::Error| {
        TransferError::Storage(format!("Failed to allocate {}: {}", path.display(), e))
    };

    let existed = tokio::fs::try_exists(path).await.map_err(storage)?;
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .await
        .map_err(storage)?;
    let len = file.metadata().await.map_err(storage)?.len();
    if len < total_size {
        file.set_len(total_size).await.map_err(storage)?;
    }
    Ok(!existed)
}
