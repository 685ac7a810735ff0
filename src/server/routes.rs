//! Router configuration for the content server.

use std::path::Path;

use axum::{routing::get, Router};
use tower_http::services::ServeFile;

use super::handlers;

pub const PLAYER_ROUTE: &str = "/";
pub const VIDEO_ROUTE: &str = "/video";

/// Create a router serving the player page and the video file.
///
/// `ServeFile` answers plain requests with 200, `Range: bytes=a-b` with 206 and
/// a `Content-Range` header, and malformed or unsatisfiable ranges with 416.
pub fn create_router(video_path: &Path) -> Router {
    Router::new()
        .route(PLAYER_ROUTE, get(handlers::player))
        .route_service(VIDEO_ROUTE, ServeFile::new(video_path))
}
