//! Download management handlers.

use super::StartDownloadQuery;
use crate::api::AppState;
use crate::error::{DownloadError, Error};
use crate::types::{DownloadId, DownloadInfo};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;

/// POST /downloads - Start a download
///
/// Probe and allocation failures still create a record: the response is 200
/// with status FAILED and the reason in `errorMessage`.
#[utoipa::path(
    post,
    path = "/api/downloads",
    tag = "downloads",
    params(StartDownloadQuery),
    responses(
        (status = 200, description = "Download record (IN_PROGRESS, or FAILED when the start failed)", body = DownloadInfo),
        (status = 400, description = "Missing url parameter"),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn start_download(
    State(state): State<AppState>,
    Query(query): Query<StartDownloadQuery>,
) -> Result<Json<DownloadInfo>, Error> {
    let download = state
        .downloader
        .start_download(&query.url, query.file_name.as_deref(), query.thread_count)
        .await?;
    Ok(Json(DownloadInfo::from(download)))
}

/// GET /downloads - List all downloads
#[utoipa::path(
    get,
    path = "/api/downloads",
    tag = "downloads",
    responses(
        (status = 200, description = "All downloads, newest first", body = Vec<DownloadInfo>),
        (status = 500, description = "Internal server error", body = crate::error::ApiError)
    )
)]
pub async fn list_downloads(State(state): State<AppState>) -> Result<Json<Vec<DownloadInfo>>, Error> {
    let downloads = state.downloader.list_downloads().await?;
    Ok(Json(downloads.iter().map(DownloadInfo::from).collect()))
}

/// GET /downloads/:id - Get single download
#[utoipa::path(
    get,
    path = "/api/downloads/{id}",
    tag = "downloads",
    params(
        ("id" = i64, Path, description = "Download ID")
    ),
    responses(
        (status = 200, description = "Download information", body = DownloadInfo),
        (status = 404, description = "Download not found", body = crate::error::ApiError)
    )
)]
pub async fn get_download(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DownloadInfo>, Error> {
    match state.downloader.get_download(DownloadId(id)).await? {
        Some(download) => Ok(Json(DownloadInfo::from(download))),
        None => Err(Error::Download(DownloadError::NotFound { id })),
    }
}

/// GET /downloads/:id/file - Stream the file of a completed download
#[utoipa::path(
    get,
    path = "/api/downloads/{id}/file",
    tag = "downloads",
    params(
        ("id" = i64, Path, description = "Download ID")
    ),
    responses(
        (status = 200, description = "Raw file contents", content_type = "application/octet-stream"),
        (status = 404, description = "Unknown download, not completed, or file missing", body = crate::error::ApiError)
    )
)]
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, Error> {
    let (download, file) = state.downloader.open_completed_file(DownloadId(id)).await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        download.file_name.replace(['"', '\\'], "_")
    );
    let disposition = HeaderValue::from_str(&disposition)
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    let length = file.metadata().await?.len();

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, HeaderValue::from(length)),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// POST /downloads/:id/pause - Pause download
#[utoipa::path(
    post,
    path = "/api/downloads/{id}/pause",
    tag = "downloads",
    params(
        ("id" = i64, Path, description = "Download ID")
    ),
    responses(
        (status = 200, description = "Download paused", body = DownloadInfo),
        (status = 404, description = "Download not found", body = crate::error::ApiError),
        (status = 409, description = "Download is COMPLETED or FAILED", body = crate::error::ApiError)
    )
)]
pub async fn pause_download(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DownloadInfo>, Error> {
    let download = state.downloader.pause(DownloadId(id)).await?;
    Ok(Json(DownloadInfo::from(download)))
}

/// POST /downloads/:id/resume - Resume download
#[utoipa::path(
    post,
    path = "/api/downloads/{id}/resume",
    tag = "downloads",
    params(
        ("id" = i64, Path, description = "Download ID")
    ),
    responses(
        (status = 200, description = "Download resumed (or unchanged when already running or completed)", body = DownloadInfo),
        (status = 404, description = "Download not found", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn resume_download(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DownloadInfo>, Error> {
    let download = state.downloader.resume(DownloadId(id)).await?;
    Ok(Json(DownloadInfo::from(download)))
}
