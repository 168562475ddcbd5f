//! Persistence seam between the downloader and its record storage.

use async_trait::async_trait;

use crate::Result;
use crate::types::{Download, DownloadId, Segment};

/// Durable storage for download records and their segments.
///
/// The downloader keeps in-memory state authoritative while a download runs
/// and writes through this trait at state transitions and progress flushes.
#[async_trait]
pub trait DownloadStore: Send + Sync {
    /// Persist a new record and return its assigned id
    ///
    /// `download.id` and any segments are ignored.
    async fn create(&self, download: &Download) -> Result<DownloadId>;

    /// Overwrite the record fields of an existing download
    async fn update(&self, download: &Download) -> Result<()>;

    /// Persist one segment's downloaded byte count
    async fn update_segment(&self, id: DownloadId, segment: &Segment) -> Result<()>;

    /// Replace a download's segments, assigning segment ids in place
    async fn replace_segments(&self, id: DownloadId, segments: &mut [Segment]) -> Result<()>;

    /// Load a download with its segments
    async fn get(&self, id: DownloadId) -> Result<Option<Download>>;

    /// Load every download with its segments
    async fn list(&self) -> Result<Vec<Download>>;

    /// Persist a progress snapshot for several segments at once
    async fn write_progress(
        &self,
        id: DownloadId,
        downloaded_size: u64,
        segments: &[Segment],
    ) -> Result<()> {
        for segment in segments {
            self.update_segment(id, segment).await?;
        }
        if let Some(mut download) = self.get(id).await? {
            download.downloaded_size = downloaded_size;
            self.update(&download).await?;
        }
        Ok(())
    }

    /// Mark records left running by a previous process as paused
    async fn pause_interrupted(&self) -> Result<u64>;

    /// Release any held resources; called once during shutdown
    async fn close(&self) {}
}
