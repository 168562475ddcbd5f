//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`downloads`] - Starting, inspecting and controlling downloads
//! - [`system`] - Health, events, OpenAPI

use serde::{Deserialize, Serialize};

mod downloads;
mod system;

pub use downloads::*;
pub use system::*;

/// Query parameters for POST /downloads
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct StartDownloadQuery {
    /// Absolute http(s) URL of the resource
    pub url: String,
    /// File name to save as (default: derived from the response or URL)
    pub file_name: Option<String>,
    /// Number of segments (default: `download.default_thread_count`)
    pub thread_count: Option<u32>,
}
