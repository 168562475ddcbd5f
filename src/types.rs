//! Core types for segment-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;

/// Unique identifier for a download
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct DownloadId(pub i64);

impl DownloadId {
    /// Create a new DownloadId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for DownloadId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<DownloadId> for i64 {
    fn from(id: DownloadId) -> Self {
        id.0
    }
}

impl PartialEq<i64> for DownloadId {
    fn eq(&self, other: &i64) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for DownloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DownloadId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// sqlx Type, Encode, and Decode so ids bind directly in queries
impl sqlx::Type<sqlx::Sqlite> for DownloadId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for DownloadId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for DownloadId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Download status
///
/// ```text
/// PENDING -> IN_PROGRESS -> COMPLETED
///                 |    \-> FAILED -> (resume) IN_PROGRESS
///                 \-> PAUSED -> (resume) IN_PROGRESS
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Created, not yet segmented
    Pending,
    /// Workers are (or should be) running
    InProgress,
    /// Stopped by a pause request; partial segments retained
    Paused,
    /// Every segment fully written
    Completed,
    /// A probe, storage or segment failure ended the download
    Failed,
}

impl Status {
    /// Convert integer status code to Status enum
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => Status::Pending,
            1 => Status::InProgress,
            2 => Status::Paused,
            3 => Status::Completed,
            4 => Status::Failed,
            _ => Status::Failed, // Default to Failed for unknown status
        }
    }

    /// Convert Status enum to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            Status::Pending => 0,
            Status::InProgress => 1,
            Status::Paused => 2,
            Status::Completed => 3,
            Status::Failed => 4,
        }
    }

    /// Wire name, as used in JSON and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::InProgress => "IN_PROGRESS",
            Status::Paused => "PAUSED",
            Status::Completed => "COMPLETED",
            Status::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One contiguous, inclusive byte range of a download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    /// Store-assigned id (0 until persisted)
    pub id: i64,
    /// Position of this segment within its download
    pub index: u32,
    /// First byte of the range
    pub start_byte: u64,
    /// Last byte of the range (inclusive)
    pub end_byte: u64,
    /// Bytes of this range written so far
    pub downloaded_bytes: u64,
}

impl Segment {
    /// Create an unsaved segment with nothing downloaded
    pub fn new(index: u32, start_byte: u64, end_byte: u64) -> Self {
        Self {
            id: 0,
            index,
            start_byte,
            end_byte,
            downloaded_bytes: 0,
        }
    }

    /// Number of bytes covered by the range
    pub fn len(&self) -> u64 {
        self.end_byte - self.start_byte + 1
    }

    /// Always false; segments never cover zero bytes
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Bytes still to fetch
    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.downloaded_bytes)
    }

    /// Whether every byte of the range has been written
    pub fn is_complete(&self) -> bool {
        self.downloaded_bytes >= self.len()
    }

    /// File offset of the next byte to fetch
    pub fn next_offset(&self) -> u64 {
        self.start_byte + self.downloaded_bytes
    }
}

/// A download record together with its segments.
#[derive(Clone, Debug, PartialEq)]
pub struct Download {
    /// Store-assigned id (0 until persisted)
    pub id: DownloadId,
    /// Source URL
    pub url: String,
    /// Resolved file name
    pub file_name: String,
    /// Destination path of the output file
    pub file_path: PathBuf,
    /// Total size in bytes (0 only for failed starts)
    pub total_size: u64,
    /// Sum of all segments' downloaded bytes
    pub downloaded_size: u64,
    /// Number of segments
    pub thread_count: u32,
    /// Current status
    pub status: Status,
    /// Failure reason, only set when FAILED
    pub error_message: Option<String>,
    /// When the download first started
    pub start_time: Option<DateTime<Utc>>,
    /// When the download completed
    pub completion_time: Option<DateTime<Utc>>,
    /// Segments ordered by index
    pub segments: Vec<Segment>,
}

impl Download {
    /// Create an unsaved PENDING record for `url`
    pub fn new(url: impl Into<String>, thread_count: u32) -> Self {
        Self {
            id: DownloadId(0),
            url: url.into(),
            file_name: String::new(),
            file_path: PathBuf::new(),
            total_size: 0,
            downloaded_size: 0,
            thread_count,
            status: Status::Pending,
            error_message: None,
            start_time: None,
            completion_time: None,
            segments: Vec::new(),
        }
    }

    /// Percentage of `total_size` downloaded (0.0 to 100.0)
    pub fn progress(&self) -> f64 {
        if self.total_size == 0 {
            return 0.0;
        }
        self.downloaded_size as f64 * 100.0 / self.total_size as f64
    }

    /// Recompute `downloaded_size` from the segments
    pub fn recompute_downloaded(&mut self) {
        self.downloaded_size = self.segments.iter().map(|s| s.downloaded_bytes).sum();
    }

    /// Whether every segment has been fully written
    pub fn all_segments_complete(&self) -> bool {
        !self.segments.is_empty() && self.segments.iter().all(Segment::is_complete)
    }

    /// Move to FAILED with `message`
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = Status::Failed;
        self.error_message = Some(message.into());
    }
}

/// Segment view returned by the REST API
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SegmentInfo {
    /// Segment id
    pub id: i64,
    /// First byte of the range
    pub start_byte: u64,
    /// Last byte of the range (inclusive)
    pub end_byte: u64,
    /// Bytes of this range written so far
    pub downloaded_bytes: u64,
}

/// Download view returned by the REST API and carried by events
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadInfo {
    /// Download id
    pub id: DownloadId,
    /// Source URL
    pub url: String,
    /// Resolved file name
    pub file_name: String,
    /// Destination path
    pub file_path: String,
    /// Total size in bytes
    pub total_size: u64,
    /// Bytes downloaded so far
    pub downloaded_size: u64,
    /// Progress percentage (0.0 to 100.0)
    pub progress: f64,
    /// Number of segments
    pub thread_count: u32,
    /// Current status
    pub status: Status,
    /// Failure reason
    pub error_message: Option<String>,
    /// When the download started
    pub start_time: Option<DateTime<Utc>>,
    /// When the download completed
    pub completion_time: Option<DateTime<Utc>>,
    /// Segments ordered by index
    pub parts: Vec<SegmentInfo>,
}

impl From<&Download> for DownloadInfo {
    fn from(d: &Download) -> Self {
        Self {
            id: d.id,
            url: d.url.clone(),
            file_name: d.file_name.clone(),
            file_path: d.file_path.display().to_string(),
            total_size: d.total_size,
            downloaded_size: d.downloaded_size,
            progress: d.progress(),
            thread_count: d.thread_count,
            status: d.status,
            error_message: d.error_message.clone(),
            start_time: d.start_time,
            completion_time: d.completion_time,
            parts: d
                .segments
                .iter()
                .map(|s| SegmentInfo {
                    id: s.id,
                    start_byte: s.start_byte,
                    end_byte: s.end_byte,
                    downloaded_bytes: s.downloaded_bytes,
                })
                .collect(),
        }
    }
}

impl From<Download> for DownloadInfo {
    fn from(d: Download) -> Self {
        Self::from(&d)
    }
}

/// Event emitted during the download lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Segments planned and workers launched
    Started {
        /// Download ID
        id: DownloadId,
        /// Resolved file name
        file_name: String,
        /// Total size in bytes
        total_size: u64,
    },

    /// Progress flushed to the store
    Progress {
        /// Download ID
        id: DownloadId,
        /// Bytes downloaded so far
        downloaded_size: u64,
        /// Total size in bytes
        total_size: u64,
        /// Progress percentage (0.0 to 100.0)
        percent: f64,
    },

    /// Every segment finished
    Completed {
        /// Download ID
        id: DownloadId,
    },

    /// Download failed
    Failed {
        /// Download ID
        id: DownloadId,
        /// Error message
        error: String,
    },

    /// Workers stopped after a pause request
    Paused {
        /// Download ID
        id: DownloadId,
    },

    /// Workers relaunched for the unfinished segments
    Resumed {
        /// Download ID
        id: DownloadId,
    },

    /// Downloader is shutting down
    Shutdown,
}
