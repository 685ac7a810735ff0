//! Content server for a single session.
//!
//! Serves exactly two resources over the onion service's local listener:
//! - `/` - the player page
//! - `/video` - the workspace video, with byte-range support for seeking
//!
//! Each session builds its own router; nothing is registered globally.

mod handlers;
mod routes;
mod templates;

pub use routes::{create_router, PLAYER_ROUTE, VIDEO_ROUTE};

use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// HTTP server for one session's video.
pub struct ContentServer {
    video_path: PathBuf,
    router: Router,
}

impl ContentServer {
    pub fn new(video_path: &Path) -> Self {
        Self {
            video_path: video_path.to_path_buf(),
            router: create_router(video_path),
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` in a background task until the handle is stopped.
    ///
    /// Serve errors are logged from the task; they do not end the session.
    pub fn spawn(self, listener: TcpListener) -> ServerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let addr = listener.local_addr().ok();
        let video_path = self.video_path;
        let router = self.router;

        let task = tokio::spawn(async move {
            match addr {
                Some(addr) => info!("Serving {} on {}", video_path.display(), addr),
                None => info!("Serving {}", video_path.display()),
            }

            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;

            match result {
                Ok(()) => info!("Content server stopped"),
                Err(e) => error!("Content server failed: {}", e),
            }
        });

        ServerHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Handle to a running content server.
pub struct ServerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Close the listener and wait up to `grace` for in-flight responses.
    ///
    /// Connections still streaming after `grace` are dropped.
    pub async fn stop(mut self, grace: Duration) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        if tokio::time::timeout(grace, &mut self.task).await.is_err() {
            warn!(
                "Content server still busy after {:?}, dropping connections",
                grace
            );
            self.task.abort();
            let _ = (&mut self.task).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tower::ServiceExt;

    const VIDEO: &[u8] = b"0123456789abcdefghij";

    fn setup_video() -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vid-compressed.mp4");
        std::fs::write(&path, VIDEO).unwrap();
        (dir, path)
    }

    async fn get(router: Router, uri: &str, range: Option<&str>) -> axum::response::Response {
        let mut request = Request::builder().uri(uri);
        if let Some(range) = range {
            request = request.header(header::RANGE, range);
        }
        router
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_player_page() {
        let (_dir, path) = setup_video();
        let response = get(create_router(&path), "/", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/html"));
        let body = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(body.contains(r#"src="/video""#));
    }

    #[tokio::test]
    async fn test_video_full_body() {
        let (_dir, path) = setup_video();
        let response = get(create_router(&path), "/video", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
        assert_eq!(body_bytes(response).await, VIDEO);
    }

    #[tokio::test]
    async fn test_video_range() {
        let (_dir, path) = setup_video();
        let response = get(create_router(&path), "/video", Some("bytes=2-5")).await;

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 2-5/20");
        assert_eq!(body_bytes(response).await, b"2345");
    }

    #[tokio::test]
    async fn test_video_open_ended_range() {
        let (_dir, path) = setup_video();
        let response = get(create_router(&path), "/video", Some("bytes=15-")).await;

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 15-19/20");
        assert_eq!(body_bytes(response).await, b"fghij");
    }

    #[tokio::test]
    async fn test_video_bad_ranges() {
        let (_dir, path) = setup_video();
        for range in ["bytes=abc", "bytes=50-60", "pages=1-2"] {
            let response = get(create_router(&path), "/video", Some(range)).await;
            assert_eq!(
                response.status(),
                StatusCode::RANGE_NOT_SATISFIABLE,
                "range {:?}",
                range
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (_dir, path) = setup_video();
        let response = get(create_router(&path), "/etc/passwd", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_routers_are_independent() {
        let (_dir_a, path_a) = setup_video();
        let dir_b = tempdir().unwrap();
        let path_b = dir_b.path().join("other.mp4");
        std::fs::write(&path_b, b"other").unwrap();

        let a = ContentServer::new(&path_a);
        let b = ContentServer::new(&path_b);
        assert_eq!(body_bytes(get(a.router(), "/video", None).await).await, VIDEO);
        assert_eq!(body_bytes(get(b.router(), "/video", None).await).await, b"other");
    }

    #[tokio::test]
    async fn test_spawn_serves_and_stops() {
        let (_dir, path) = setup_video();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = ContentServer::new(&path).spawn(listener);

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /video HTTP/1.1\r\nHost: test\r\nRange: bytes=0-3\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8_lossy(&response);
        assert!(response.starts_with("HTTP/1.1 206"));
        assert!(response.ends_with("0123"));

        handle.stop(Duration::from_secs(5)).await;
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
