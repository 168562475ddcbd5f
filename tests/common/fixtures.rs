//! Test content generators and polling helpers

use segment_dl::{Download, DownloadId, SegmentDownloader, Status};
use std::time::Duration;

/// Deterministic test content that differs at every segment boundary
pub fn sample_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 251) % 256) as u8).collect()
}

/// Poll until the download leaves IN_PROGRESS and its task has exited
pub async fn wait_for_terminal(
    downloader: &SegmentDownloader,
    id: DownloadId,
    timeout: Duration,
) -> Download {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let download = downloader
            .get_download(id)
            .await
            .expect("get_download failed")
            .expect("download disappeared");
        if !matches!(download.status, Status::InProgress | Status::Pending)
            && downloader.active_count().await == 0
        {
            return download;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "download {id} still {} after {timeout:?}",
            download.status
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Poll until at least `bytes` have been downloaded
pub async fn wait_for_bytes(downloader: &SegmentDownloader, id: DownloadId, bytes: u64) {
    for _ in 0..500 {
        let download = downloader.get_download(id).await.unwrap().unwrap();
        if download.downloaded_size >= bytes {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("download {id} never reached {bytes} bytes");
}
