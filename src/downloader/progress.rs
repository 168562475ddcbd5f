//! Progress accumulation, batched persistence and terminal-state resolution.
//!
//! Every worker of a download reports into one [`ProgressTracker`]. The tracker
//! holds the authoritative per-segment byte counts behind a single mutex; the
//! store only sees them when a flush happens, either from the background flusher
//! (on an interval or after enough bytes) or explicitly at terminal commit and
//! on pause.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify, broadcast};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{Result, TransferError};
use crate::store::DownloadStore;
use crate::types::{Download, DownloadId, Event, Segment};

/// Fallback failure message when no worker supplied one
pub(crate) const PARTS_FAILED_MESSAGE: &str = "One or more download parts failed";

struct ProgressState {
    segments: Vec<Segment>,
    downloaded_size: u64,
    dirty: BTreeSet<usize>,
    unflushed_bytes: u64,
}

/// Synchronized byte accumulator for one download
pub(crate) struct ProgressTracker {
    id: DownloadId,
    total_size: u64,
    flush_bytes: u64,
    state: Mutex<ProgressState>,
    flush_requested: Notify,
    /// Positional writes still running on blocking threads
    writes: TaskTracker,
    store: Arc<dyn DownloadStore>,
    event_tx: broadcast::Sender<Event>,
}

impl ProgressTracker {
    pub(crate) fn new(
        download: &Download,
        store: Arc<dyn DownloadStore>,
        event_tx: broadcast::Sender<Event>,
        flush_bytes: u64,
    ) -> Self {
        let segments = download.segments.clone();
        let downloaded_size = segments.iter().map(|s| s.downloaded_bytes).sum();
        Self {
            id: download.id,
            total_size: download.total_size,
            flush_bytes: flush_bytes.max(1),
            state: Mutex::new(ProgressState {
                segments,
                downloaded_size,
                dirty: BTreeSet::new(),
                unflushed_bytes: 0,
            }),
            flush_requested: Notify::new(),
            writes: TaskTracker::new(),
            store,
            event_tx,
        }
    }

    /// Current state of the segment at `index`
    pub(crate) async fn segment(&self, index: usize) -> Option<Segment> {
        self.state.lock().await.segments.get(index).cloned()
    }

    /// Add `bytes` written to the segment at `index`
    ///
    /// Counts are capped at the segment's length.
    pub(crate) async fn record(&self, index: usize, bytes: u64) {
        let mut state = self.state.lock().await;
        self.add_bytes(&mut state, index, bytes);
    }

    /// [`record`](Self::record) for callers on a blocking thread
    pub(crate) fn record_blocking(&self, index: usize, bytes: u64) {
        let mut state = self.state.blocking_lock();
        self.add_bytes(&mut state, index, bytes);
    }

    fn add_bytes(&self, state: &mut ProgressState, index: usize, bytes: u64) {
        let Some(segment) = state.segments.get_mut(index) else {
            return;
        };
        let added = bytes.min(segment.remaining());
        segment.downloaded_bytes += added;

        state.downloaded_size += added;
        state.unflushed_bytes += added;
        state.dirty.insert(index);

        if state.unflushed_bytes >= self.flush_bytes {
            self.flush_requested.notify_one();
        }
    }

    /// Run a file write on a blocking thread, tracked until it returns
    pub(crate) fn spawn_write<F>(&self, write: F) -> tokio::task::JoinHandle<std::io::Result<()>>
    where
        F: FnOnce() -> std::io::Result<()> + Send + 'static,
    {
        self.writes.spawn_blocking(write)
    }

    /// Wait for every write started so far, including ones whose worker is gone
    pub(crate) async fn wait_for_writes(&self) {
        self.writes.close();
        self.writes.wait().await;
    }

    /// Forget everything written to the segment at `index`
    pub(crate) async fn reset(&self, index: usize) {
        let mut state = self.state.lock().await;
        let Some(segment) = state.segments.get_mut(index) else {
            return;
        };
        let dropped = std::mem::take(&mut segment.downloaded_bytes);
        state.downloaded_size -= dropped;
        state.dirty.insert(index);
    }

    /// Sum of all segments' downloaded bytes
    pub(crate) async fn downloaded_size(&self) -> u64 {
        self.state.lock().await.downloaded_size
    }

    /// Copy of the downloaded total and every segment
    pub(crate) async fn snapshot(&self) -> (u64, Vec<Segment>) {
        let state = self.state.lock().await;
        (state.downloaded_size, state.segments.clone())
    }

    /// Write dirty segments and the downloaded total to the store.
    ///
    /// Segments stay dirty when the write fails so the next flush retries them.
    pub(crate) async fn flush(&self) -> Result<()> {
        let (downloaded_size, indices, segments) = {
            let mut state = self.state.lock().await;
            if state.dirty.is_empty() {
                return Ok(());
            }
            let indices = std::mem::take(&mut state.dirty);
            let segments: Vec<Segment> = indices
                .iter()
                .filter_map(|&i| state.segments.get(i).cloned())
                .collect();
            state.unflushed_bytes = 0;
            (state.downloaded_size, indices, segments)
        };

        if let Err(e) = self
            .store
            .write_progress(self.id, downloaded_size, &segments)
            .await
        {
            self.state.lock().await.dirty.extend(indices);
            return Err(e);
        }

        let percent = if self.total_size > 0 {
            downloaded_size as f64 * 100.0 / self.total_size as f64
        } else {
            0.0
        };
        self.event_tx
            .send(Event::Progress {
                id: self.id,
                downloaded_size,
                total_size: self.total_size,
                percent,
            })
            .ok();

        Ok(())
    }
}

/// Flush `tracker` every `interval` or when it asks for it, until `stop` fires.
///
/// Exits without a final flush once `stop` is cancelled; terminal commit owns
/// that last write. Runs inside the download task, so aborting the task also
/// ends the flusher.
pub(crate) async fn run_flusher(
    tracker: Arc<ProgressTracker>,
    interval: Duration,
    stop: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
            _ = tracker.flush_requested.notified() => {}
        }

        if let Err(e) = tracker.flush().await {
            tracing::error!(download_id = tracker.id.0, error = %e, "Failed to persist progress");
        }
    }
}

/// Terminal state a finished set of workers resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Resolution {
    Completed,
    Paused,
    Failed(String),
}

/// Reduce worker outcomes, in the order they finished, to a terminal state.
///
/// All successes complete the download. A cancellation caused by a pause wins
/// over failures; otherwise the first real failure is kept. Cancellation with
/// no pause and no failure still counts as paused.
pub(crate) fn resolve(
    outcomes: &[std::result::Result<(), TransferError>],
    pause_requested: bool,
) -> Resolution {
    if outcomes.iter().all(|o| o.is_ok()) {
        return Resolution::Completed;
    }

    let cancelled = outcomes
        .iter()
        .any(|o| matches!(o, Err(e) if e.is_cancelled()));
    if cancelled && pause_requested {
        return Resolution::Paused;
    }

    match outcomes.iter().find_map(|o| match o {
        Err(e) if !e.is_cancelled() => Some(e.to_string()),
        _ => None,
    }) {
        Some(message) if !message.is_empty() => Resolution::Failed(message),
        Some(_) => Resolution::Failed(PARTS_FAILED_MESSAGE.to_string()),
        None => Resolution::Paused,
    }
}
