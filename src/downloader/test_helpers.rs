//! Shared test helpers: downloader instances and a byte-range HTTP server.

use crate::config::Config;
use crate::downloader::SegmentDownloader;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// Helper to create a test SegmentDownloader instance with a persistent database.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader() -> (SegmentDownloader, tempfile::TempDir) {
    create_test_downloader_with(|_| {}).await
}

/// Like [`create_test_downloader`], letting the caller adjust the config first
pub(crate) async fn create_test_downloader_with(
    adjust: impl FnOnce(&mut Config),
) -> (SegmentDownloader, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();

    let mut config = Config::default();
    config.persistence.database_path = temp_dir.path().join("test.db");
    config.download.download_dir = temp_dir.path().join("downloads");
    config.download.check_disk_space = false;
    config.download.progress_flush_interval = Duration::from_millis(50);
    config.download.pause_grace_period = Duration::from_secs(5);
    adjust(&mut config);

    let downloader = SegmentDownloader::new(config).await.unwrap();
    (downloader, temp_dir)
}

/// Deterministic, non-repeating-looking test content
pub(crate) fn sample_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 251) % 256) as u8).collect()
}

/// Behaviour of a [`RangeServer`]
#[derive(Clone)]
pub(crate) struct RangeServerOptions {
    pub(crate) body: Arc<Vec<u8>>,
    pub(crate) accept_ranges: bool,
    pub(crate) ignore_ranges: bool,
    pub(crate) content_type: Option<String>,
    pub(crate) content_disposition: Option<String>,
    pub(crate) chunk_size: usize,
    pub(crate) chunk_delay: Duration,
    /// Range starts answered with HTTP 500
    pub(crate) fail_ranges_from: Vec<u64>,
    /// Range starts whose body is cut short after this many bytes
    pub(crate) truncate_ranges_from: Vec<(u64, usize)>,
}

impl RangeServerOptions {
    pub(crate) fn new(body: Vec<u8>) -> Self {
        Self {
            body: Arc::new(body),
            accept_ranges: true,
            ignore_ranges: false,
            content_type: Some("application/octet-stream".to_string()),
            content_disposition: None,
            chunk_size: 64 * 1024,
            chunk_delay: Duration::ZERO,
            fail_ranges_from: Vec::new(),
            truncate_ranges_from: Vec::new(),
        }
    }

    /// Stream the body slowly: `chunk_size` bytes every `delay`
    pub(crate) fn throttled(mut self, chunk_size: usize, delay: Duration) -> Self {
        self.chunk_size = chunk_size.max(1);
        self.chunk_delay = delay;
        self
    }
}

/// A request the server saw
#[derive(Clone, Debug)]
pub(crate) struct SeenRequest {
    pub(crate) method: String,
    pub(crate) range: Option<String>,
}

/// Minimal HTTP/1.1 server answering HEAD and ranged GET requests over raw TCP
pub(crate) struct RangeServer {
    addr: SocketAddr,
    requests: Arc<tokio::sync::Mutex<Vec<SeenRequest>>>,
    shutdown: CancellationToken,
}

impl RangeServer {
    pub(crate) async fn start(options: RangeServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();

        let seen = requests.clone();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let socket = tokio::select! {
                    _ = stop.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((socket, _)) => socket,
                        Err(_) => break,
                    },
                };
                let options = options.clone();
                let seen = seen.clone();
                let stop = stop.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = stop.cancelled() => {}
                        _ = serve_connection(socket, options, seen) => {}
                    }
                });
            }
        });

        Self {
            addr,
            requests,
            shutdown,
        }
    }

    /// URL of `path` on this server
    pub(crate) fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub(crate) async fn requests(&self) -> Vec<SeenRequest> {
        self.requests.lock().await.clone()
    }

    /// Range headers of GET requests, in arrival order
    pub(crate) async fn get_ranges(&self) -> Vec<Option<String>> {
        self.requests()
            .await
            .into_iter()
            .filter(|r| r.method == "GET")
            .map(|r| r.range)
            .collect()
    }
}

impl Drop for RangeServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn serve_connection(
    mut socket: TcpStream,
    options: RangeServerOptions,
    seen: Arc<tokio::sync::Mutex<Vec<SeenRequest>>>,
) {
    let mut buf = Vec::with_capacity(1024);
    let mut tmp = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut tmp).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&tmp[..n]),
        }
        if buf.len() > 64 * 1024 {
            return;
        }
    }

    let head = String::from_utf8_lossy(&buf).to_string();
    let mut lines = head.split("\r\n");
    let method = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or_default()
        .to_string();
    let range = lines.find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("range")
            .then(|| value.trim().to_string())
    });

    seen.lock().await.push(SeenRequest {
        method: method.clone(),
        range: range.clone(),
    });

    let total = options.body.len() as u64;
    let mut headers = String::new();
    if options.accept_ranges {
        headers.push_str("Accept-Ranges: bytes\r\n");
    }
    if let Some(ct) = &options.content_type {
        headers.push_str(&format!("Content-Type: {}\r\n", ct));
    }
    if let Some(cd) = &options.content_disposition {
        headers.push_str(&format!("Content-Disposition: {}\r\n", cd));
    }

    if method == "HEAD" {
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
            total, headers
        );
        let _ = socket.write_all(response.as_bytes()).await;
        return;
    }

    let requested = range
        .as_deref()
        .filter(|_| !options.ignore_ranges)
        .and_then(|r| parse_range(r, total));

    let (status, start, end) = match requested {
        Some((start, _)) if options.fail_ranges_from.contains(&start) => {
            let response =
                "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
            let _ = socket.write_all(response.as_bytes()).await;
            return;
        }
        Some((start, end)) => {
            headers.push_str(&format!("Content-Range: bytes {}-{}/{}\r\n", start, end, total));
            ("206 Partial Content", start, end)
        }
        None => ("200 OK", 0, total.saturating_sub(1)),
    };

    let body = &options.body[start as usize..=end as usize];
    let limit = options
        .truncate_ranges_from
        .iter()
        .find(|(from, _)| *from == start)
        .map(|(_, n)| (*n).min(body.len()))
        .unwrap_or(body.len());

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
        status,
        body.len(),
        headers
    );
    if socket.write_all(response.as_bytes()).await.is_err() {
        return;
    }

    for chunk in body[..limit].chunks(options.chunk_size) {
        if socket.write_all(chunk).await.is_err() {
            return;
        }
        let _ = socket.flush().await;
        if !options.chunk_delay.is_zero() {
            tokio::time::sleep(options.chunk_delay).await;
        }
    }
    let _ = socket.shutdown().await;
}

fn parse_range(value: &str, total: u64) -> Option<(u64, u64)> {
    let range = value.strip_prefix("bytes=")?;
    let (start, end) = range.split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end: u64 = match end.trim() {
        "" => total.checked_sub(1)?,
        e => e.parse::<u64>().ok()?.min(total.checked_sub(1)?),
    };
    (start <= end).then_some((start, end))
}
