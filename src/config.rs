//! Configuration types for segment-dl

use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Download behavior configuration (directories, segmentation, timeouts)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadConfig {
    /// Download directory (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Segments per download when the caller gives no hint (default: 4)
    #[serde(default = "default_thread_count")]
    pub default_thread_count: u32,

    /// Upper bound for a caller-supplied thread count (default: 32)
    #[serde(default = "default_max_thread_count")]
    pub max_thread_count: u32,

    /// Worker pool size shared by all downloads (default: 16)
    ///
    /// Bounds the number of segment requests in flight across every download,
    /// independently of how many downloads are running.
    #[serde(default = "default_max_concurrent_segments")]
    pub max_concurrent_segments: usize,

    /// A worker that receives no data for this long fails with a timeout (default: 30s)
    #[serde(default = "default_stall_timeout", with = "duration_serde")]
    pub stall_timeout: Duration,

    /// How long a pause waits for workers to exit (default: 10s)
    #[serde(default = "default_pause_grace_period", with = "duration_serde")]
    pub pause_grace_period: Duration,

    /// TCP connect timeout for probe and range requests (default: 10s)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Overall timeout for the HEAD probe (default: 30s)
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    pub probe_timeout: Duration,

    /// Minimum time between progress flushes to the store (default: 500ms)
    #[serde(default = "default_progress_flush_interval", with = "millis_serde")]
    pub progress_flush_interval: Duration,

    /// Bytes accumulated since the last flush that force a new one (default: 4 MiB)
    #[serde(default = "default_progress_flush_bytes")]
    pub progress_flush_bytes: u64,

    /// User-Agent header sent with every request (default: "Mozilla/5.0")
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Refuse to allocate a file larger than the free space (default: true)
    #[serde(default = "default_true")]
    pub check_disk_space: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            default_thread_count: default_thread_count(),
            max_thread_count: default_max_thread_count(),
            max_concurrent_segments: default_max_concurrent_segments(),
            stall_timeout: default_stall_timeout(),
            pause_grace_period: default_pause_grace_period(),
            connect_timeout: default_connect_timeout(),
            probe_timeout: default_probe_timeout(),
            progress_flush_interval: default_progress_flush_interval(),
            progress_flush_bytes: default_progress_flush_bytes(),
            user_agent: default_user_agent(),
            check_disk_space: true,
        }
    }
}

/// Main configuration for [`SegmentDownloader`](crate::SegmentDownloader)
///
/// Sub-config fields are flattened, so the JSON format is a single flat object
/// apart from `persistence` and `api`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Download behavior settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Segment retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// REST API
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Check invariants that serde defaults cannot express
    pub fn validate(&self) -> crate::Result<()> {
        if self.download.default_thread_count == 0 {
            return Err(crate::Error::Config {
                message: "default_thread_count must be at least 1".to_string(),
                key: Some("default_thread_count".to_string()),
            });
        }
        if self.download.max_thread_count < self.download.default_thread_count {
            return Err(crate::Error::Config {
                message: "max_thread_count must not be below default_thread_count".to_string(),
                key: Some("max_thread_count".to_string()),
            });
        }
        if self.download.max_concurrent_segments == 0 {
            return Err(crate::Error::Config {
                message: "max_concurrent_segments must be at least 1".to_string(),
                key: Some("max_concurrent_segments".to_string()),
            });
        }
        Ok(())
    }
}

/// Retry configuration for failed segment transfers
///
/// With the default of zero retries a failing segment fails its download
/// immediately.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Retries after the first failed attempt of a segment (default: 0)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PersistenceConfig {
    /// Database path (default: "./segment-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:8089)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: the local frontend dev servers)
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_thread_count() -> u32 {
    4
}

fn default_max_thread_count() -> u32 {
    32
}

fn default_max_concurrent_segments() -> usize {
    16
}

fn default_stall_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_pause_grace_period() -> Duration {
    Duration::from_secs(10)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_progress_flush_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_progress_flush_bytes() -> u64 {
    4 * 1024 * 1024
}

fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./segment-dl.db")
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    0
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8089))
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:3004".to_string(),
    ]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Sub-second durations are written as milliseconds
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
