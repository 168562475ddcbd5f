//! [`DownloadStore`] backed by SQLite.

use async_trait::async_trait;

use crate::Result;
use crate::store::DownloadStore;
use crate::types::{Download, DownloadId, Segment};

use super::Database;

#[async_trait]
impl DownloadStore for Database {
    async fn create(&self, download: &Download) -> Result<DownloadId> {
        self.insert_download(download).await
    }

    async fn update(&self, download: &Download) -> Result<()> {
        self.update_download(download).await
    }

    async fn update_segment(&self, id: DownloadId, segment: &Segment) -> Result<()> {
        self.update_segment_progress(id, segment).await
    }

    async fn replace_segments(&self, id: DownloadId, segments: &mut [Segment]) -> Result<()> {
        Database::replace_segments(self, id, segments).await
    }

    async fn get(&self, id: DownloadId) -> Result<Option<Download>> {
        self.get_download(id).await
    }

    async fn list(&self) -> Result<Vec<Download>> {
        self.list_downloads().await
    }

    async fn write_progress(
        &self,
        id: DownloadId,
        downloaded_size: u64,
        segments: &[Segment],
    ) -> Result<()> {
        Database::write_progress(self, id, downloaded_size, segments).await
    }

    async fn pause_interrupted(&self) -> Result<u64> {
        self.pause_interrupted_downloads().await
    }

    async fn close(&self) {
        Database::close(self).await
    }
}
