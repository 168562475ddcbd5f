//! REST API server example
//!
//! Runs segment-dl with the REST API enabled and pauses every running
//! download on Ctrl+C, so the next run can resume them.
//!
//! After starting, you can:
//! - View Swagger UI at http://localhost:8089/swagger-ui
//! - Start downloads via POST http://localhost:8089/api/downloads?url=...
//! - Monitor progress via GET http://localhost:8089/api/downloads
//! - Stream events via GET http://localhost:8089/api/events

use std::sync::Arc;
use segment_dl::config::{ApiConfig, Config, DownloadConfig};
use segment_dl::{SegmentDownloader, run_with_shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let config = Config {
        download: DownloadConfig {
            download_dir: "downloads".into(),
            default_thread_count: 8,
            ..Default::default()
        },
        api: ApiConfig {
            cors_origins: vec!["*".to_string()],
            ..Default::default()
        },
        ..Default::default()
    };

    let downloader = Arc::new(SegmentDownloader::new(config).await?);
    let api = downloader.spawn_api_server();

    println!("Starting segment-dl REST API server");
    println!("Swagger UI: http://localhost:8089/swagger-ui");
    println!("API Base: http://localhost:8089/api");
    println!();
    println!("Example commands:");
    println!("  # Start a download with 8 segments");
    println!("  curl -X POST 'http://localhost:8089/api/downloads?url=https%3A%2F%2Fexample.com%2Fbig.iso&threadCount=8'");
    println!();
    println!("  # Pause and resume");
    println!("  curl -X POST http://localhost:8089/api/downloads/1/pause");
    println!("  curl -X POST http://localhost:8089/api/downloads/1/resume");
    println!();
    println!("  # Stream events (Server-Sent Events)");
    println!("  curl -N http://localhost:8089/api/events");

    run_with_shutdown((*downloader).clone()).await?;
    api.abort();

    Ok(())
}
