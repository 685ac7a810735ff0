//! HTTP request handlers for the content server.

use axum::{http::header, response::IntoResponse};

use super::routes::VIDEO_ROUTE;
use super::templates;

/// Player page at "/".
pub async fn player() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        templates::player_page(VIDEO_ROUTE),
    )
}
