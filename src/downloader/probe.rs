//! Metadata probe against the remote resource.

use std::time::Duration;

use reqwest::header::{
    ACCEPT, ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, HeaderName,
};

use crate::error::TransferError;

/// What a HEAD request told us about the resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Size of the resource in bytes (always > 0)
    pub total_size: u64,
    /// Whether the server advertised `Accept-Ranges: bytes`
    pub supports_ranges: bool,
    /// `Content-Type` header, if any
    pub content_type: Option<String>,
    /// `Content-Disposition` header, if any
    pub content_disposition: Option<String>,
}

/// Parse `url` and require an absolute http(s) address
pub(crate) fn validate_url(url: &str) -> Result<url::Url, TransferError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| TransferError::InvalidResource(format!("Invalid URL '{}': {}", url, e)))?;

    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
        scheme => Err(TransferError::InvalidResource(format!(
            "Unsupported URL scheme '{}': only http and https are allowed",
            scheme
        ))),
    }
}

/// Issue a HEAD request for `url` and read its size and range support.
///
/// Connection failures and timeouts map to [`TransferError::UnreachableResource`];
/// a non-success status or a missing/zero `Content-Length` maps to
/// [`TransferError::InvalidResource`].
pub async fn probe(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<ProbeResult, TransferError> {
    let parsed = validate_url(url)?;

    let response = client
        .head(parsed)
        .header(ACCEPT, "*/*")
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| TransferError::UnreachableResource(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(TransferError::InvalidResource(format!(
            "Server returned HTTP response code: {}",
            status.as_u16()
        )));
    }

    let headers = response.headers();
    let header_str = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    // reqwest's content_length() reports the (empty) HEAD body, so read the header
    let total_size = header_str(CONTENT_LENGTH)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|&n| n > 0)
        .ok_or_else(|| {
            TransferError::InvalidResource("Invalid file size or file not accessible".to_string())
        })?;

    let supports_ranges = header_str(ACCEPT_RANGES)
        .map(|v| v.split(',').any(|unit| unit.trim().eq_ignore_ascii_case("bytes")))
        .unwrap_or(false);

    let result = ProbeResult {
        total_size,
        supports_ranges,
        content_type: header_str(CONTENT_TYPE),
        content_disposition: header_str(CONTENT_DISPOSITION),
    };

    tracing::debug!(
        url = %url,
        total_size = result.total_size,
        supports_ranges = result.supports_ranges,
        "Probed remote resource"
    );

    Ok(result)
}
