mod migrations;

use crate::types::{Download, Segment, Status};
use std::path::PathBuf;

/// Unsaved IN_PROGRESS download of `total_size` bytes split into `parts` segments
pub(super) fn sample_download(total_size: u64, parts: u32) -> Download {
    let mut download = Download::new("http://example.com/files/sample.bin", parts);
    download.file_name = "sample.bin".to_string();
    download.file_path = PathBuf::from("/downloads/sample.bin");
    download.total_size = total_size;
    download.status = Status::InProgress;
    download.start_time = Some(chrono::Utc::now());

    let part = total_size / parts as u64;
    download.segments = (0..parts)
        .map(|i| {
            let start = i as u64 * part;
            let end = if i + 1 == parts {
                total_size - 1
            } else {
                start + part - 1
            };
            Segment::new(i, start, end)
        })
        .collect();
    download
}
