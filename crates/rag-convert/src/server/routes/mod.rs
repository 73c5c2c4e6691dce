//! API routes for the conversion server

pub mod convert;
pub mod info;
pub mod jobs;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Service information
        .route("/", get(info::root))
        .route("/supported-formats", get(info::supported_formats))
        .route("/chunking-info", get(info::chunking_info))
        // Synchronous conversion - with larger body limit for file uploads
        .route(
            "/convert",
            post(convert::convert_file).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route(
            "/convert-chunked",
            post(convert::convert_chunked).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route(
            "/convert-multiple",
            post(convert::convert_multiple).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        // Async conversion with progress tracking
        .route(
            "/convert-chunked-async",
            post(jobs::submit_job).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        // Job management
        .route("/jobs", get(jobs::list_jobs))
        .route("/job/:id", get(jobs::get_job).delete(jobs::delete_job))
}
