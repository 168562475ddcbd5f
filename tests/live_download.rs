#![cfg(feature = "live-tests")]

//! Live tests against a real HTTP server.
//!
//! Gated behind the `live-tests` feature flag. The target is read from `.env`:
//!
//! - `LIVE_TEST_URL` - a file served with `Accept-Ranges: bytes`
//! - `LIVE_TEST_THREADS` - segment count (optional, default: 8)
//!
//! ```bash
//! cargo test --features live-tests --test live_download -- --nocapture
//! ```

mod common;

use segment_dl::Status;
use serial_test::serial;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn live_segmented_download_completes() {
    let (url, threads) = skip_if_no_live_url!();
    let (downloader, _dir) = common::create_test_downloader().await;

    let started = downloader
        .start_download(&url, None, Some(threads))
        .await
        .expect("start_download failed");
    assert_eq!(
        started.status,
        Status::InProgress,
        "start failed: {:?}",
        started.error_message
    );
    println!(
        "Downloading {} ({} bytes, {} segments)",
        started.file_name,
        started.total_size,
        started.segments.len()
    );

    let done = common::wait_for_terminal(&downloader, started.id, Duration::from_secs(600)).await;
    assert_eq!(done.status, Status::Completed, "{:?}", done.error_message);

    let on_disk = std::fs::metadata(&done.file_path).unwrap().len();
    assert_eq!(on_disk, done.total_size);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn live_pause_and_resume() {
    let (url, threads) = skip_if_no_live_url!();
    let (downloader, _dir) = common::create_test_downloader().await;

    let started = downloader
        .start_download(&url, None, Some(threads))
        .await
        .expect("start_download failed");
    if started.status != Status::InProgress {
        panic!("start failed: {:?}", started.error_message);
    }

    tokio::time::sleep(Duration::from_millis(500)).await;
    let paused = downloader.pause(started.id).await.unwrap();
    println!(
        "Paused at {} of {} bytes ({})",
        paused.downloaded_size, paused.total_size, paused.status
    );

    if paused.status == Status::Paused {
        downloader.resume(started.id).await.unwrap();
    }
    let done = common::wait_for_terminal(&downloader, started.id, Duration::from_secs(600)).await;
    assert_eq!(done.status, Status::Completed, "{:?}", done.error_message);
}
