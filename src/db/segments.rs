//! Segment rows and batched progress writes.

use crate::error::DatabaseError;
use crate::types::{DownloadId, Segment};
use crate::{Error, Result};

use super::{Database, SegmentRow};

impl Database {
    /// Get all segments of a download ordered by index
    pub async fn get_segments(&self, download_id: DownloadId) -> Result<Vec<Segment>> {
        let rows = sqlx::query_as::<_, SegmentRow>(
            r#"
            SELECT id, download_id, segment_index, start_byte, end_byte, downloaded_bytes
            FROM download_segments
            WHERE download_id = ?
            ORDER BY segment_index ASC
            "#,
        )
        .bind(download_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get segments: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(Segment::from).collect())
    }

    /// Replace the segments of a download, assigning ids in place
    pub async fn replace_segments(
        &self,
        download_id: DownloadId,
        segments: &mut [Segment],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        sqlx::query("DELETE FROM download_segments WHERE download_id = ?")
            .bind(download_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to clear segments: {}",
                    e
                )))
            })?;

        for segment in segments.iter_mut() {
            let result = sqlx::query(
                r#"
                INSERT INTO download_segments (
                    download_id, segment_index, start_byte, end_byte, downloaded_bytes
                ) VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(download_id)
            .bind(segment.index as i64)
            .bind(segment.start_byte as i64)
            .bind(segment.end_byte as i64)
            .bind(segment.downloaded_bytes as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert segment: {}",
                    e
                )))
            })?;
            segment.id = result.last_insert_rowid();
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit segments: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Update one segment's downloaded byte count
    pub async fn update_segment_progress(
        &self,
        download_id: DownloadId,
        segment: &Segment,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE download_segments SET downloaded_bytes = ? WHERE download_id = ? AND segment_index = ?",
        )
        .bind(segment.downloaded_bytes as i64)
        .bind(download_id)
        .bind(segment.index as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update segment progress: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Write a progress snapshot in one transaction
    ///
    /// Updates the download's `downloaded_size` and each given segment's
    /// `downloaded_bytes`.
    pub async fn write_progress(
        &self,
        download_id: DownloadId,
        downloaded_size: u64,
        segments: &[Segment],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        sqlx::query("UPDATE downloads SET downloaded_size = ? WHERE id = ?")
            .bind(downloaded_size as i64)
            .bind(download_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update downloaded size: {}",
                    e
                )))
            })?;

        for segment in segments {
            sqlx::query(
                "UPDATE download_segments SET downloaded_bytes = ? WHERE download_id = ? AND segment_index = ?",
            )
            .bind(segment.downloaded_bytes as i64)
            .bind(download_id)
            .bind(segment.index as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update segment progress: {}",
                    e
                )))
            })?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit progress: {}",
                e
            )))
        })?;

        Ok(())
    }
}
