//! Application state for the API server

use crate::{Config, SegmentDownloader};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
#[derive(Clone)]
pub struct AppState {
    /// The downloader all handlers delegate to
    pub downloader: Arc<SegmentDownloader>,

    /// Configuration the router was built with
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(downloader: Arc<SegmentDownloader>, config: Arc<Config>) -> Self {
        Self { downloader, config }
    }
}
