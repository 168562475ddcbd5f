//! Test configuration helpers: temporary downloaders and `.env` settings for live tests

use segment_dl::config::{DownloadConfig, PersistenceConfig};
use segment_dl::{Config, SegmentDownloader};
use std::time::Duration;
use tempfile::TempDir;

/// Config rooted in `dir`, with fast progress flushes
pub fn test_config(dir: &TempDir) -> Config {
    Config {
        download: DownloadConfig {
            download_dir: dir.path().join("downloads"),
            check_disk_space: false,
            progress_flush_interval: Duration::from_millis(50),
            pause_grace_period: Duration::from_secs(5),
            ..Default::default()
        },
        persistence: PersistenceConfig {
            database_path: dir.path().join("segment-dl.db"),
        },
        ..Default::default()
    }
}

/// Create a downloader in a fresh temporary directory
///
/// The returned TempDir must be kept alive for the duration of the test.
pub async fn create_test_downloader() -> (SegmentDownloader, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let downloader = SegmentDownloader::new(test_config(&dir))
        .await
        .expect("Failed to create downloader");
    (downloader, dir)
}

/// URL for live tests, read from `LIVE_TEST_URL` (loads `.env` first)
///
/// Optional `LIVE_TEST_THREADS` sets the segment count (default: 8).
pub fn live_test_target() -> Option<(String, u32)> {
    dotenvy::dotenv().ok();

    let url = std::env::var("LIVE_TEST_URL").ok()?;
    let threads = std::env::var("LIVE_TEST_THREADS")
        .ok()
        .and_then(|t| t.parse().ok())
        .unwrap_or(8);
    Some((url, threads))
}

/// Skip a test when no live URL is configured
#[macro_export]
macro_rules! skip_if_no_live_url {
    () => {
        match $crate::common::live_test_target() {
            Some(target) => target,
            None => {
                eprintln!("Skipping test: LIVE_TEST_URL not set in .env");
                return;
            }
        }
    };
}
