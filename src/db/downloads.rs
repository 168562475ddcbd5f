//! Download record CRUD operations.

use crate::error::DatabaseError;
use crate::types::{Download, DownloadId, Status};
use crate::{Error, Result};

use super::{Database, DownloadRow};

const DOWNLOAD_COLUMNS: &str = r#"
    id, url, file_name, file_path, total_size, downloaded_size, thread_count,
    status, error_message, created_at, start_time, completion_time
"#;

impl Database {
    /// Insert a new download record (segments are written separately)
    pub async fn insert_download(&self, download: &Download) -> Result<DownloadId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO downloads (
                url, file_name, file_path, total_size, downloaded_size,
                thread_count, status, error_message, created_at,
                start_time, completion_time
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&download.url)
        .bind(&download.file_name)
        .bind(download.file_path.to_string_lossy().as_ref())
        .bind(download.total_size as i64)
        .bind(download.downloaded_size as i64)
        .bind(download.thread_count as i64)
        .bind(download.status.to_i32())
        .bind(&download.error_message)
        .bind(now)
        .bind(download.start_time.map(|t| t.timestamp()))
        .bind(download.completion_time.map(|t| t.timestamp()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert download: {}",
                e
            )))
        })?;

        Ok(DownloadId(result.last_insert_rowid()))
    }

    /// Get a download row by ID
    pub async fn get_download_row(&self, id: DownloadId) -> Result<Option<DownloadRow>> {
        let row = sqlx::query_as::<_, DownloadRow>(&format!(
            "SELECT {DOWNLOAD_COLUMNS} FROM downloads WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get download: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Get a download with its segments
    pub async fn get_download(&self, id: DownloadId) -> Result<Option<Download>> {
        let Some(row) = self.get_download_row(id).await? else {
            return Ok(None);
        };
        let segments = self.get_segments(id).await?;
        Ok(Some(row.into_download(segments)))
    }

    /// List all downloads, newest first, with their segments
    pub async fn list_downloads(&self) -> Result<Vec<Download>> {
        let rows = sqlx::query_as::<_, DownloadRow>(&format!(
            "SELECT {DOWNLOAD_COLUMNS} FROM downloads ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list downloads: {}",
                e
            )))
        })?;

        let mut downloads = Vec::with_capacity(rows.len());
        for row in rows {
            let segments = self.get_segments(DownloadId(row.id)).await?;
            downloads.push(row.into_download(segments));
        }
        Ok(downloads)
    }

    /// Write every record field of `download` (segments untouched)
    pub async fn update_download(&self, download: &Download) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE downloads SET
                url = ?, file_name = ?, file_path = ?, total_size = ?,
                downloaded_size = ?, thread_count = ?, status = ?,
                error_message = ?, start_time = ?, completion_time = ?
            WHERE id = ?
            "#,
        )
        .bind(&download.url)
        .bind(&download.file_name)
        .bind(download.file_path.to_string_lossy().as_ref())
        .bind(download.total_size as i64)
        .bind(download.downloaded_size as i64)
        .bind(download.thread_count as i64)
        .bind(download.status.to_i32())
        .bind(&download.error_message)
        .bind(download.start_time.map(|t| t.timestamp()))
        .bind(download.completion_time.map(|t| t.timestamp()))
        .bind(download.id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update download: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "download {}",
                download.id
            ))));
        }
        Ok(())
    }

    /// Move every IN_PROGRESS or PENDING download to PAUSED
    ///
    /// Used at startup: no worker survives a process restart, so these
    /// records can only be continued through an explicit resume.
    pub async fn pause_interrupted_downloads(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE downloads SET status = ? WHERE status IN (?, ?)")
            .bind(Status::Paused.to_i32())
            .bind(Status::InProgress.to_i32())
            .bind(Status::Pending.to_i32())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to pause interrupted downloads: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected())
    }

    /// Delete a download (its segments cascade)
    pub async fn delete_download(&self, id: DownloadId) -> Result<()> {
        sqlx::query("DELETE FROM downloads WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete download: {}",
                    e
                )))
            })?;

        Ok(())
    }
}
