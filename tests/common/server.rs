//! A small origin server that answers HEAD and `Range` GET requests
//!
//! Written against raw TCP so the exact status line and headers are under the
//! test's control.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A file served with byte-range support
pub struct OriginServer {
    addr: SocketAddr,
    ranges: Arc<Mutex<Vec<String>>>,
    task: tokio::task::JoinHandle<()>,
}

impl OriginServer {
    /// Serve `body`, sending `chunk_size` bytes every `delay`
    pub async fn start(body: Vec<u8>, chunk_size: usize, delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let ranges = Arc::new(Mutex::new(Vec::new()));
        let body = Arc::new(body);

        let seen = ranges.clone();
        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let body = body.clone();
                let seen = seen.clone();
                tokio::spawn(serve(socket, body, seen, chunk_size.max(1), delay));
            }
        });

        Self { addr, ranges, task }
    }

    /// Serve `body` as fast as possible
    pub async fn fast(body: Vec<u8>) -> Self {
        Self::start(body, 64 * 1024, Duration::ZERO).await
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// `Range` header values received so far
    pub fn ranges(&self) -> Vec<String> {
        self.ranges.lock().unwrap().clone()
    }
}

impl Drop for OriginServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut socket: TcpStream,
    body: Arc<Vec<u8>>,
    seen: Arc<Mutex<Vec<String>>>,
    chunk_size: usize,
    delay: Duration,
) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    let head = String::from_utf8_lossy(&head).to_string();
    let is_head = head.starts_with("HEAD ");
    let range = head.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.eq_ignore_ascii_case("range")
            .then(|| value.trim().to_string())
    });

    let total = body.len();
    if is_head {
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {total}\r\nAccept-Ranges: bytes\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n"
        );
        let _ = socket.write_all(response.as_bytes()).await;
        return;
    }

    let (start, end) = match range.as_deref().and_then(|r| parse_range(r, total)) {
        Some(bounds) => bounds,
        None => (0, total - 1),
    };
    if let Some(range) = range {
        seen.lock().unwrap().push(range);
    }

    let slice = &body[start..=end];
    let response = format!(
        "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {start}-{end}/{total}\r\nConnection: close\r\n\r\n",
        slice.len()
    );
    if socket.write_all(response.as_bytes()).await.is_err() {
        return;
    }
    for chunk in slice.chunks(chunk_size) {
        if socket.write_all(chunk).await.is_err() {
            return;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    let _ = socket.shutdown().await;
}

fn parse_range(value: &str, total: usize) -> Option<(usize, usize)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    let start: usize = start.parse().ok()?;
    let end: usize = end.parse::<usize>().ok()?.min(total - 1);
    (start <= end).then_some((start, end))
}
