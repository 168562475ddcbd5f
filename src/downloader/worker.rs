//! Range-request transfer of one segment into the shared output file.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_RANGE, HeaderMap, RANGE};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::TransferError;
use crate::retry::download_with_retry;
use crate::types::DownloadId;
use crate::utils::write_all_at;

use super::progress::ProgressTracker;

/// Settings shared by every worker of every download
#[derive(Clone)]
pub(crate) struct WorkerSettings {
    pub(crate) client: reqwest::Client,
    pub(crate) pool: Arc<Semaphore>,
    pub(crate) stall_timeout: Duration,
    pub(crate) retry: RetryConfig,
}

/// One segment to fetch
pub(crate) struct SegmentJob {
    pub(crate) download_id: DownloadId,
    pub(crate) url: String,
    pub(crate) index: usize,
    pub(crate) file: Arc<std::fs::File>,
    pub(crate) tracker: Arc<ProgressTracker>,
    pub(crate) cancel: CancellationToken,
}

/// Fetch the unfinished tail of a segment.
///
/// Waits for a worker-pool permit first. Errors other than cancellation and
/// stall timeouts are prefixed with the segment's byte range.
pub(crate) async fn run(
    settings: &WorkerSettings,
    job: SegmentJob,
) -> Result<(), TransferError> {
    let _permit = tokio::select! {
        biased;
        _ = job.cancel.cancelled() => return Err(TransferError::Cancelled),
        permit = settings.pool.clone().acquire_owned() => {
            permit.map_err(|_| TransferError::Cancelled)?
        }
    };

    let Some(segment) = job.tracker.segment(job.index).await else {
        return Err(TransferError::Storage(format!(
            "segment {} does not exist",
            job.index
        )));
    };

    tracing::debug!(
        download_id = job.download_id.0,
        segment = job.index,
        start = segment.start_byte,
        end = segment.end_byte,
        downloaded = segment.downloaded_bytes,
        "Segment worker started"
    );

    let result = download_with_retry(&settings.retry, &job.cancel, || fetch_remaining(settings, &job))
        .await
        .map_err(|e| e.for_segment(segment.start_byte, segment.end_byte));

    match &result {
        Ok(()) => tracing::debug!(
            download_id = job.download_id.0,
            segment = job.index,
            "Segment complete"
        ),
        Err(e) if e.is_cancelled() => tracing::debug!(
            download_id = job.download_id.0,
            segment = job.index,
            "Segment cancelled"
        ),
        Err(e) => tracing::warn!(
            download_id = job.download_id.0,
            segment = job.index,
            error = %e,
            "Segment failed"
        ),
    }

    result
}

/// One attempt: request `[next_offset, end_byte]` and stream it to disk
async fn fetch_remaining(settings: &WorkerSettings, job: &SegmentJob) -> Result<(), TransferError> {
    let segment = job
        .tracker
        .segment(job.index)
        .await
        .ok_or_else(|| TransferError::Storage(format!("segment {} does not exist", job.index)))?;

    if segment.is_complete() {
        return Ok(());
    }
    if job.cancel.is_cancelled() {
        return Err(TransferError::Cancelled);
    }

    let start = segment.start_byte;
    let end = segment.end_byte;
    let stall = settings.stall_timeout;
    let stalled = || {
        TransferError::Timeout(format!(
            "Segment {}-{} stalled: no data received for {} seconds",
            start,
            end,
            stall.as_secs()
        ))
    };

    let request = settings
        .client
        .get(job.url.as_str())
        .header(ACCEPT, "*/*")
        .header(RANGE, format!("bytes={}-{}", segment.next_offset(), end))
        .send();

    let mut response = tokio::select! {
        biased;
        _ = job.cancel.cancelled() => return Err(TransferError::Cancelled),
        sent = tokio::time::timeout(stall, request) => match sent {
            Err(_) => return Err(stalled()),
            Ok(result) => result?,
        },
    };

    // body_pos: file offset of the next body byte; write_pos: next byte we still need
    let (mut body_pos, mut write_pos) = match response.status() {
        StatusCode::PARTIAL_CONTENT => {
            let offset = segment.next_offset();
            match content_range_start(response.headers()) {
                Some(served) if served == offset => (offset, offset),
                Some(served) => {
                    return Err(TransferError::InvalidResource(format!(
                        "Server returned a range starting at byte {} instead of {}",
                        served, offset
                    )));
                }
                None => {
                    return Err(TransferError::InvalidResource(
                        "Server returned a partial response without a valid Content-Range header"
                            .to_string(),
                    ));
                }
            }
        }
        StatusCode::OK => {
            // Range ignored: the body is the whole resource from byte 0
            if segment.downloaded_bytes > 0 {
                tracing::warn!(
                    download_id = job.download_id.0,
                    segment = job.index,
                    "Server ignored range request, restarting segment"
                );
                job.tracker.reset(job.index).await;
            }
            (0, start)
        }
        status => {
            return Err(TransferError::InvalidResource(format!(
                "Server returned HTTP response code: {}",
                status.as_u16()
            )));
        }
    };

    while write_pos <= end {
        if job.cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let chunk = tokio::select! {
            biased;
            _ = job.cancel.cancelled() => return Err(TransferError::Cancelled),
            next = tokio::time::timeout(stall, response.chunk()) => match next {
                Err(_) => return Err(stalled()),
                Ok(Err(e)) => return Err(TransferError::Network(e.to_string())),
                Ok(Ok(None)) => break,
                Ok(Ok(Some(chunk))) => chunk,
            },
        };

        let chunk_start = body_pos;
        let chunk_end = chunk_start + chunk.len() as u64;
        body_pos = chunk_end;

        // skip whatever precedes the segment (only on a 200 fallback)
        if chunk_end <= write_pos {
            continue;
        }
        let from = (write_pos - chunk_start) as usize;
        let to = (chunk_end.min(end + 1) - chunk_start) as usize;
        let data = chunk.slice(from..to);
        let written = data.len() as u64;

        write_chunk(job, data, write_pos).await?;
        write_pos += written;
    }

    if write_pos <= end {
        return Err(TransferError::Network(format!(
            "connection closed after {} of {} bytes",
            write_pos - start,
            segment.len()
        )));
    }

    Ok(())
}

/// Write `data` at `offset` and count it against the segment.
///
/// Both happen on the blocking thread, so a write that lands on disk is always
/// counted, even when the awaiting worker has been dropped.
async fn write_chunk(job: &SegmentJob, data: Bytes, offset: u64) -> Result<(), TransferError> {
    let file = job.file.clone();
    let tracker = job.tracker.clone();
    let index = job.index;

    job.tracker
        .spawn_write(move || {
            write_all_at(&file, &data, offset)?;
            tracker.record_blocking(index, data.len() as u64);
            Ok(())
        })
        .await
        .map_err(|e| TransferError::Storage(format!("write task failed: {}", e)))?
        .map_err(|e| TransferError::Storage(e.to_string()))
}

/// Start offset of a `Content-Range: bytes <start>-<end>/<total>` header
fn content_range_start(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(CONTENT_RANGE)?.to_str().ok()?;
    let (start, _) = value.trim().strip_prefix("bytes ")?.split_once('-')?;
    start.trim().parse().ok()
}
