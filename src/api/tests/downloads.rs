use super::*;
use crate::error::ApiError;

#[tokio::test]
async fn test_start_download_and_fetch_file() {
    let body = sample_bytes(40_000);
    let server = RangeServer::start(RangeServerOptions::new(body.clone())).await;
    let (app, _downloader, _temp_dir) = test_app().await;

    let uri = format!(
        "/api/downloads?url={}&threadCount=3",
        urlencoding::encode(&server.url("/video.mp4"))
    );
    let response = send(&app, "POST", &uri).await;
    assert_eq!(response.status(), StatusCode::OK);

    let started: serde_json::Value = body_json(response).await;
    assert_eq!(started["status"], "IN_PROGRESS");
    assert_eq!(started["fileName"], "video.mp4");
    assert_eq!(started["totalSize"], 40_000);
    assert_eq!(started["threadCount"], 3);
    assert_eq!(started["parts"].as_array().unwrap().len(), 3);
    assert_eq!(started["parts"][2]["endByte"], 39_999);

    let id = DownloadId(started["id"].as_i64().unwrap());
    let done = wait_until_settled(&app, id).await;
    assert_eq!(done.status, Status::Completed);
    assert!((done.progress - 100.0).abs() < f64::EPSILON);

    let response = send(&app, "GET", &format!("/api/downloads/{id}/file")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/octet-stream"
    );
    assert_eq!(
        response.headers().get("content-disposition").unwrap(),
        "attachment; filename=\"video.mp4\""
    );
    assert_eq!(body_bytes(response).await, body);
}

#[tokio::test]
async fn test_start_with_file_name() {
    let server = RangeServer::start(RangeServerOptions::new(sample_bytes(10))).await;
    let (app, _downloader, _temp_dir) = test_app().await;

    let uri = format!(
        "/api/downloads?url={}&fileName=notes.txt",
        urlencoding::encode(&server.url("/x"))
    );
    let info: DownloadInfo = body_json(send(&app, "POST", &uri).await).await;
    assert_eq!(info.file_name, "notes.txt");
    wait_until_settled(&app, info.id).await;
}

#[tokio::test]
async fn test_failed_start_returns_200_with_failed_record() {
    let (app, _downloader, _temp_dir) = test_app().await;

    let response = send(&app, "POST", "/api/downloads?url=not-a-url").await;
    assert_eq!(response.status(), StatusCode::OK);

    let info: DownloadInfo = body_json(response).await;
    assert_eq!(info.status, Status::Failed);
    assert!(info.error_message.is_some());
    assert!(info.parts.is_empty());
}

#[tokio::test]
async fn test_start_without_url_is_bad_request() {
    let (app, _downloader, _temp_dir) = test_app().await;

    let response = send(&app, "POST", "/api/downloads").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_start_during_shutdown_is_unavailable() {
    let (app, downloader, _temp_dir) = test_app().await;
    downloader.shutdown().await.unwrap();

    let response = send(&app, "POST", "/api/downloads?url=http%3A%2F%2F127.0.0.1%3A1%2Fa").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let error: ApiError = body_json(response).await;
    assert_eq!(error.error.code, "shutting_down");
}

#[tokio::test]
async fn test_list_downloads() {
    let (app, downloader, _temp_dir) = test_app().await;

    let response = send(&app, "GET", "/api/downloads").await;
    assert_eq!(response.status(), StatusCode::OK);
    let empty: Vec<DownloadInfo> = body_json(response).await;
    assert!(empty.is_empty());

    downloader.start_download("bad://one", None, None).await.unwrap();
    downloader.start_download("bad://two", None, None).await.unwrap();

    let listed: Vec<DownloadInfo> = body_json(send(&app, "GET", "/api/downloads").await).await;
    let urls: Vec<&str> = listed.iter().map(|d| d.url.as_str()).collect();
    assert_eq!(urls, vec!["bad://two", "bad://one"]);
}

#[tokio::test]
async fn test_get_unknown_download_is_404() {
    let (app, _downloader, _temp_dir) = test_app().await;

    let response = send(&app, "GET", "/api/downloads/12345").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let error: ApiError = body_json(response).await;
    assert_eq!(error.error.code, "download_not_found");
    assert_eq!(error.error.details.unwrap()["download_id"], 12345);
}

#[tokio::test]
async fn test_file_of_unfinished_download_is_404() {
    let (app, downloader, _temp_dir) = test_app().await;
    let failed = downloader.start_download("bad://x", None, None).await.unwrap();

    let response = send(&app, "GET", &format!("/api/downloads/{}/file", failed.id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pause_and_resume_endpoints() {
    let body = sample_bytes(64 * 1024);
    let server = RangeServer::start(
        RangeServerOptions::new(body.clone()).throttled(1024, Duration::from_millis(30)),
    )
    .await;
    let (app, downloader, _temp_dir) = test_app().await;

    let started = downloader
        .start_download(&server.url("/slow.bin"), None, Some(2))
        .await
        .unwrap();

    let response = send(&app, "POST", &format!("/api/downloads/{}/pause", started.id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let paused: DownloadInfo = body_json(response).await;
    assert_eq!(paused.status, Status::Paused);

    // pausing twice is fine
    let response = send(&app, "POST", &format!("/api/downloads/{}/pause", started.id)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, "POST", &format!("/api/downloads/{}/resume", started.id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let resumed: DownloadInfo = body_json(response).await;
    assert_eq!(resumed.status, Status::InProgress);

    let done = wait_until_settled(&app, started.id).await;
    assert_eq!(done.status, Status::Completed);
    assert_eq!(std::fs::read(&done.file_path).unwrap(), body);
}

#[tokio::test]
async fn test_pause_failed_download_is_conflict() {
    let (app, downloader, _temp_dir) = test_app().await;
    let failed = downloader.start_download("bad://x", None, None).await.unwrap();

    let response = send(&app, "POST", &format!("/api/downloads/{}/pause", failed.id)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let error: ApiError = body_json(response).await;
    assert_eq!(error.error.code, "invalid_state");
}

#[tokio::test]
async fn test_pause_and_resume_unknown_download_is_404() {
    let (app, _downloader, _temp_dir) = test_app().await;

    let response = send(&app, "POST", "/api/downloads/77/pause").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, "POST", "/api/downloads/77/resume").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
