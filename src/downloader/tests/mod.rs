use super::test_helpers::{
    RangeServer, RangeServerOptions, create_test_downloader, create_test_downloader_with,
    sample_bytes,
};
use super::*;
use crate::error::DownloadError;
use crate::types::{Download, Status};
use std::time::Duration;


/// Poll the store until the download leaves IN_PROGRESS (or give up after 10s)
async fn wait_for_terminal(downloader: &SegmentDownloader, id: DownloadId) -> Download {
    for _ in 0..500 {
        let download = downloader.store.get(id).await.unwrap().unwrap();
        if !matches!(download.status, Status::InProgress | Status::Pending)
            && downloader.active_count().await == 0
        {
            return download;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("download {id} did not settle");
}

/// Poll until at least `bytes` have been written for `id`
async fn wait_for_progress(downloader: &SegmentDownloader, id: DownloadId, bytes: u64) {
    for _ in 0..500 {
        let download = downloader.get_download(id).await.unwrap().unwrap();
        if download.downloaded_size >= bytes {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("download {id} never reached {bytes} bytes");
}
