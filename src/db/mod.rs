//! Database layer for segment-dl
//!
//! Handles SQLite persistence for downloads and their byte-range segments.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`downloads`] — Download record CRUD
//! - [`segments`] — Segment rows and batched progress writes
//!
//! [`Database`] implements [`DownloadStore`](crate::store::DownloadStore), which is
//! the only interface the downloader uses.

use crate::types::{Download, DownloadId, Segment, Status};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

mod downloads;
mod migrations;
mod segments;
mod store;

/// Download record from database
#[derive(Debug, Clone, FromRow)]
pub struct DownloadRow {
    /// Unique database ID
    pub id: i64,
    /// Source URL
    pub url: String,
    /// Resolved file name
    pub file_name: String,
    /// Destination path
    pub file_path: String,
    /// Total size in bytes
    pub total_size: i64,
    /// Bytes downloaded, as of the last flush
    pub downloaded_size: i64,
    /// Number of segments
    pub thread_count: i64,
    /// Current status (see [`Status::to_i32`])
    pub status: i32,
    /// Error message if download failed
    pub error_message: Option<String>,
    /// Unix timestamp when the record was created
    pub created_at: i64,
    /// Unix timestamp when download started
    pub start_time: Option<i64>,
    /// Unix timestamp when download completed
    pub completion_time: Option<i64>,
}

/// Segment record from database
#[derive(Debug, Clone, FromRow)]
pub struct SegmentRow {
    /// Unique database ID
    pub id: i64,
    /// Download this segment belongs to
    pub download_id: i64,
    /// Position within the download
    pub segment_index: i64,
    /// First byte (inclusive)
    pub start_byte: i64,
    /// Last byte (inclusive)
    pub end_byte: i64,
    /// Bytes written so far
    pub downloaded_bytes: i64,
}

impl From<SegmentRow> for Segment {
    fn from(row: SegmentRow) -> Self {
        Segment {
            id: row.id,
            index: row.segment_index as u32,
            start_byte: row.start_byte as u64,
            end_byte: row.end_byte as u64,
            downloaded_bytes: row.downloaded_bytes as u64,
        }
    }
}

impl DownloadRow {
    /// Combine this row with its segments into a [`Download`]
    pub fn into_download(self, segments: Vec<Segment>) -> Download {
        Download {
            id: DownloadId(self.id),
            url: self.url,
            file_name: self.file_name,
            file_path: PathBuf::from(self.file_path),
            total_size: self.total_size as u64,
            downloaded_size: self.downloaded_size as u64,
            thread_count: self.thread_count as u32,
            status: Status::from_i32(self.status),
            error_message: self.error_message,
            start_time: self.start_time.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
            completion_time: self
                .completion_time
                .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
            segments,
        }
    }
}

/// Database handle for segment-dl
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
