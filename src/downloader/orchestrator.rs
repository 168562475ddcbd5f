//! Start pipeline and the per-download task that runs segment workers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result, TransferError};
use crate::types::{Download, DownloadId, Event, Status};
use crate::utils;

use super::plan::plan;
use super::probe::probe;
use super::progress::{self, PARTS_FAILED_MESSAGE, ProgressTracker, Resolution};
use super::worker::{self, SegmentJob};
use super::{ActiveDownload, SegmentDownloader};

impl SegmentDownloader {
    /// Start downloading `url`
    ///
    /// Probes the resource, resolves and allocates the output file, plans the
    /// segments and launches one worker per segment. Every attempt yields a
    /// persisted record: when probing or allocation fails, the returned record is
    /// FAILED with an error message and has no segments.
    ///
    /// `file_name` overrides the name derived from the response headers or URL;
    /// `thread_count` defaults to the configured value and is capped at
    /// `max_thread_count`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] once shutdown has begun, or a storage error
    /// when the record itself cannot be persisted.
    pub async fn start_download(
        &self,
        url: &str,
        file_name: Option<&str>,
        thread_count: Option<u32>,
    ) -> Result<Download> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let mut download = Download::new(url.trim(), self.effective_thread_count(thread_count));
        download.start_time = Some(Utc::now());

        if let Err(e) = self.prepare_start(&mut download, file_name).await {
            download.segments.clear();
            if download.file_name.is_empty() {
                download.file_name = utils::filename_from_url(&download.url).unwrap_or_default();
            }
            download.mark_failed(e.to_string());
            download.id = self.store.create(&download).await?;

            tracing::warn!(
                download_id = download.id.0,
                url = %download.url,
                error = %e,
                "Download failed to start"
            );
            self.emit_event(Event::Failed {
                id: download.id,
                error: e.to_string(),
            });
            return Ok(download);
        }

        download.status = Status::InProgress;
        download.error_message = None;
        download.id = self.store.create(&download).await?;
        self.store
            .replace_segments(download.id, &mut download.segments)
            .await?;

        tracing::info!(
            download_id = download.id.0,
            file_name = %download.file_name,
            total_size = download.total_size,
            segments = download.segments.len(),
            "Download started"
        );
        self.emit_event(Event::Started {
            id: download.id,
            file_name: download.file_name.clone(),
            total_size: download.total_size,
        });

        if let Err(e) = self.launch(download.clone()).await {
            download.mark_failed(e.to_string());
            self.store.update(&download).await?;
            self.emit_event(Event::Failed {
                id: download.id,
                error: e.to_string(),
            });
        }
        Ok(download)
    }

    /// Requested thread count, defaulted, with 0 treated as 1 and capped
    pub(crate) fn effective_thread_count(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.config.download.default_thread_count)
            .clamp(1, self.config.download.max_thread_count.max(1))
    }

    /// Probe, name, allocate and plan; nothing is persisted here
    pub(super) async fn prepare_start(
        &self,
        download: &mut Download,
        file_name: Option<&str>,
    ) -> std::result::Result<(), TransferError> {
        let probed = probe(&self.client, &download.url, self.config.download.probe_timeout).await?;

        if !probed.supports_ranges && download.thread_count > 1 {
            tracing::info!(
                url = %download.url,
                "Server does not support range requests, using a single segment"
            );
            download.thread_count = 1;
        }

        let name = utils::resolve_file_name(
            file_name,
            probed.content_disposition.as_deref(),
            probed.content_type.as_deref(),
            &download.url,
            Utc::now().timestamp_millis(),
        );
        let download_dir = self.config.download_dir().clone();

        if self.config.download.check_disk_space {
            check_disk_space(&download_dir, probed.total_size)?;
        }

        let (path, file) = create_output_file(&download_dir.join(&name)).await?;
        if let Err(e) = file.set_len(probed.total_size).await {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(TransferError::Storage(format!(
                "Failed to allocate {} bytes for {}: {}",
                probed.total_size,
                path.display(),
                e
            )));
        }

        download.file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(name);
        download.file_path = path;
        download.total_size = probed.total_size;
        download.segments = plan(probed.total_size, download.thread_count);
        download.thread_count = download.segments.len() as u32;

        Ok(())
    }

    /// Register `download` as active and spawn its task
    ///
    /// Returns false without spawning when a run is already active.
    pub(crate) async fn launch(&self, download: Download) -> Result<bool> {
        let file = open_for_writing(&download.file_path)
            .await
            .map_err(|e| Error::Transfer(TransferError::Storage(e.to_string())))?;

        let tracker = Arc::new(ProgressTracker::new(
            &download,
            self.store.clone(),
            self.event_tx.clone(),
            self.config.download.progress_flush_bytes,
        ));
        let cancel_token = CancellationToken::new();
        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        let id = download.id;

        // Holding the lock across spawn keeps the task from deregistering before
        // its handle is stored
        let mut active = self.active_downloads.lock().await;
        if active.contains_key(&id) {
            tracing::debug!(download_id = id.0, "Download already active, not relaunching");
            return Ok(false);
        }

        let task = {
            let downloader = self.clone();
            let tracker = tracker.clone();
            let cancel = cancel_token.clone();
            tokio::spawn(async move {
                downloader
                    .run_download_task(download, file, tracker, cancel, run_id)
                    .await
            })
        };

        active.insert(
            id,
            ActiveDownload {
                run_id,
                cancel_token,
                handle: Some(task),
                progress: tracker,
            },
        );
        Ok(true)
    }

    /// Run every incomplete segment, then commit the terminal state.
    ///
    /// `cancel` is the pause signal. Worker failures cancel the siblings through
    /// a child token so a fail-fast stop is not mistaken for a pause.
    async fn run_download_task(
        &self,
        download: Download,
        file: Arc<std::fs::File>,
        tracker: Arc<ProgressTracker>,
        cancel: CancellationToken,
        run_id: u64,
    ) {
        let id = download.id;
        let abort = cancel.child_token();
        let stop_flusher = CancellationToken::new();

        let settings = self.worker_settings();
        let mut workers = JoinSet::new();
        for (index, segment) in download.segments.iter().enumerate() {
            if segment.is_complete() {
                continue;
            }
            let settings = settings.clone();
            let job = SegmentJob {
                download_id: id,
                url: download.url.clone(),
                index,
                file: file.clone(),
                tracker: tracker.clone(),
                cancel: abort.clone(),
            };
            workers.spawn(async move { worker::run(&settings, job).await });
        }

        let collect = async {
            let mut outcomes = Vec::with_capacity(workers.len());
            while let Some(joined) = workers.join_next().await {
                let outcome = joined.unwrap_or_else(|e| {
                    if e.is_cancelled() {
                        Err(TransferError::Cancelled)
                    } else {
                        Err(TransferError::Network(format!("segment task panicked: {}", e)))
                    }
                });

                if let Err(e) = &outcome
                    && !e.is_cancelled()
                    && !abort.is_cancelled()
                {
                    tracing::warn!(download_id = id.0, error = %e, "Segment failed, stopping remaining segments");
                    abort.cancel();
                }
                outcomes.push(outcome);
            }
            stop_flusher.cancel();
            outcomes
        };

        let ((), outcomes) = tokio::join!(
            progress::run_flusher(
                tracker.clone(),
                self.config.download.progress_flush_interval,
                stop_flusher.clone(),
            ),
            collect,
        );

        let resolution = progress::resolve(&outcomes, cancel.is_cancelled());
        self.commit(download, &tracker, resolution).await;
        self.deregister(id, run_id).await;
    }

    /// Drop the registry entry of `id` if it still belongs to run `run_id`
    pub(crate) async fn deregister(&self, id: DownloadId, run_id: u64) {
        let mut active = self.active_downloads.lock().await;
        if active.get(&id).is_some_and(|a| a.run_id == run_id) {
            active.remove(&id);
        }
    }

    /// Flush progress and persist the terminal state of a run
    pub(crate) async fn commit(
        &self,
        mut download: Download,
        tracker: &ProgressTracker,
        resolution: Resolution,
    ) {
        let id = download.id;
        tracker.wait_for_writes().await;
        if let Err(e) = tracker.flush().await {
            tracing::error!(download_id = id.0, error = %e, "Failed to flush final progress");
        }

        let (downloaded_size, segments) = tracker.snapshot().await;
        download.downloaded_size = downloaded_size;
        download.segments = segments;

        // Completion is decided by worker outcomes; byte counts must agree
        let resolution = match resolution {
            Resolution::Completed if !download.all_segments_complete() => {
                Resolution::Failed(PARTS_FAILED_MESSAGE.to_string())
            }
            other => other,
        };

        let event = match resolution {
            Resolution::Completed => {
                download.status = Status::Completed;
                download.error_message = None;
                download.completion_time = Some(Utc::now());
                tracing::info!(download_id = id.0, total_size = download.total_size, "Download completed");
                Event::Completed { id }
            }
            Resolution::Paused => {
                download.status = Status::Paused;
                tracing::info!(download_id = id.0, downloaded_size, "Download paused");
                Event::Paused { id }
            }
            Resolution::Failed(message) => {
                tracing::warn!(download_id = id.0, error = %message, "Download failed");
                download.mark_failed(message.clone());
                Event::Failed { id, error: message }
            }
        };

        if let Err(e) = self.store.update(&download).await {
            tracing::error!(download_id = id.0, error = %e, "Failed to persist final download state");
        }
        self.emit_event(event);
    }
}

/// Fail with a storage error when `dir` cannot hold `needed` more bytes
fn check_disk_space(dir: &Path, needed: u64) -> std::result::Result<(), TransferError> {
    match utils::get_available_space(dir) {
        Ok(available) if available < needed => Err(TransferError::Storage(format!(
            "Insufficient disk space: need {} bytes, {} available",
            needed, available
        ))),
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Could not check free disk space");
            Ok(())
        }
    }
}

/// Create `path`, or `<stem>_<millis>.<ext>` when it is taken
async fn create_output_file(
    path: &Path,
) -> std::result::Result<(PathBuf, tokio::fs::File), TransferError> {
    let mut candidate = path.to_path_buf();
    let mut millis = Utc::now().timestamp_millis();

    for _ in 0..16 {
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                candidate = utils::timestamped_path(path, millis);
                millis += 1;
            }
            Err(e) => {
                return Err(TransferError::Storage(format!(
                    "Failed to create {}: {}",
                    candidate.display(),
                    e
                )));
            }
        }
    }

    Err(TransferError::Storage(format!(
        "Could not find a free file name for {}",
        path.display()
    )))
}

/// Open an existing output file for positional writes
pub(crate) async fn open_for_writing(path: &Path) -> std::io::Result<Arc<std::fs::File>> {
    let path = path.to_path_buf();
    let file = tokio::task::spawn_blocking(move || {
        std::fs::OpenOptions::new().write(true).open(&path)
    })
    .await
    .map_err(std::io::Error::other)??;
    Ok(Arc::new(file))
}
