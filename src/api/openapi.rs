//! OpenAPI documentation and schema generation
//!
//! utoipa generates the document at compile time from the handler annotations.

use utoipa::OpenApi;

/// OpenAPI documentation for the segment-dl REST API
///
/// The document can be accessed via:
/// - `/api/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "segment-dl REST API",
        version = "0.1.0",
        description = "REST API for starting, pausing, resuming and retrieving segmented HTTP downloads",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8089", description = "Local development server")
    ),
    paths(
        // Downloads
        crate::api::routes::start_download,
        crate::api::routes::list_downloads,
        crate::api::routes::get_download,
        crate::api::routes::download_file,
        crate::api::routes::pause_download,
        crate::api::routes::resume_download,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        crate::types::DownloadId,
        crate::types::Status,
        crate::types::DownloadInfo,
        crate::types::SegmentInfo,
        crate::types::Event,

        crate::config::Config,
        crate::config::DownloadConfig,
        crate::config::RetryConfig,
        crate::config::PersistenceConfig,
        crate::config::ApiConfig,

        crate::api::routes::StartDownloadQuery,

        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "downloads", description = "Start, inspect, pause, resume and fetch downloads"),
        (name = "system", description = "Health checks, OpenAPI spec, events"),
    )
)]
pub struct ApiDoc;
