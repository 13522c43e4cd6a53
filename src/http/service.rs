//! Request handlers for the download service.
//!
//! # Endpoints
//!
//! - `GET /files/{*path}`: stream a file under the served root. The client is
//!   identified by the `x-client-id` header, falling back to the peer IP.
//!   Answers 429 when the client is throttled and 503 when the limiter cannot
//!   track another client.
//! - `GET /stats`: tracked identifier count and current limiter settings.
//! - `GET /health`: returns `OK`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::download::{DownloadRequest, FileInfo, GatedDownloader, LocalDownloader};
use crate::error::TollgateError;
use crate::ratelimit::Limiter;

/// Header carrying the identifier downloads are rate limited on.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

const STREAM_BUFFER: usize = 64 * 1024;

/// Shared state behind every handler.
pub struct AppState {
    pub gate: Arc<GatedDownloader<Limiter, LocalDownloader>>,
    pub root_dir: PathBuf,
}

impl AppState {
    pub fn new(limiter: Arc<Limiter>, root_dir: PathBuf) -> Self {
        Self {
            gate: Arc::new(GatedDownloader::new(limiter, LocalDownloader)),
            root_dir,
        }
    }

    fn limiter(&self) -> &Limiter {
        self.gate.control()
    }
}

/// Response body of `GET /stats`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub tracked: usize,
    pub capacity: usize,
    pub reset_cycle_secs: u64,
    pub reset_tokens: u64,
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/files/{*path}", get(handle_download))
        .route("/stats", get(handle_stats))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

impl IntoResponse for TollgateError {
    fn into_response(self) -> Response {
        let status = match &self {
            TollgateError::CapacityExceeded { .. } => StatusCode::SERVICE_UNAVAILABLE,
            TollgateError::NotFound(_) => StatusCode::NOT_FOUND,
            TollgateError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            TollgateError::InvalidConfig(_) | TollgateError::Config(_) | TollgateError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

fn client_id(request: &Request) -> Option<String> {
    if let Some(value) = request.headers().get(CLIENT_ID_HEADER) {
        return value
            .to_str()
            .ok()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

async fn handle_download(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    request: Request,
) -> Result<Response, TollgateError> {
    let Some(client_id) = client_id(&request) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "missing client identifier" })),
        )
            .into_response());
    };

    let file = FileInfo::resolve(&state.root_dir, &path).await?;
    let download = DownloadRequest { client_id, path };

    match state.gate.admit(&download) {
        Ok(true) => {}
        Ok(false) => {
            debug!(client_id = %download.client_id, "Download throttled");
            return Ok((
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "error": "rate limit exceeded" })),
            )
                .into_response());
        }
        Err(e) => {
            warn!(client_id = %download.client_id, error = %e, "Rejected new client");
            return Err(e);
        }
    }

    let content_disposition = file
        .file_name()
        .and_then(|name| HeaderValue::from_str(&format!("attachment; filename=\"{name}\"")).ok());
    let content_length = file.size;
    debug!(
        client_id = %download.client_id,
        path = %download.path,
        bytes = content_length,
        "Streaming file"
    );

    let stream = ReaderStream::with_capacity(file.into_file(), STREAM_BUFFER);
    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));
    if let Some(value) = content_disposition {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

async fn handle_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let limiter = state.limiter();
    let settings = limiter.settings();
    Json(StatsResponse {
        tracked: limiter.size(),
        capacity: settings.capacity,
        reset_cycle_secs: settings.reset_cycle,
        reset_tokens: settings.reset_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::ManualClock;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn write(dir: &TempDir, relative: &str, contents: &[u8]) {
        let path = dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    fn app(dir: &TempDir, capacity: usize, tokens: u64) -> (Router, Arc<AppState>) {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = Arc::new(Limiter::with_clock(capacity, 60, tokens, clock).unwrap());
        let state = Arc::new(AppState::new(limiter, dir.path().to_path_buf()));
        (router(state.clone()), state)
    }

    fn get_file(path: &str, client_id: Option<&str>) -> Request {
        let mut builder = Request::builder().uri(format!("/files/{path}"));
        if let Some(id) = client_id {
            builder = builder.header(CLIENT_ID_HEADER, id);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_download_streams_file() {
        let dir = TempDir::new().unwrap();
        write(&dir, "pkg/app.tar", b"archive-bytes");
        let (app, _) = app(&dir, 4, 2);

        let response = app.oneshot(get_file("pkg/app.tar", Some("alice"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "13");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"app.tar\""
        );
        assert_eq!(body_bytes(response).await, b"archive-bytes");
    }

    #[tokio::test]
    async fn test_large_download_matches_content_length() {
        let dir = TempDir::new().unwrap();
        let payload: Vec<u8> = (0..STREAM_BUFFER * 3 + 17).map(|i| (i % 251) as u8).collect();
        write(&dir, "big.bin", &payload);
        let (app, _) = app(&dir, 4, 2);

        let response = app.oneshot(get_file("big.bin", Some("alice"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_LENGTH],
            payload.len().to_string().as_str()
        );
        assert_eq!(body_bytes(response).await, payload);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_out_of_root_rejected_without_charge() {
        let outside = TempDir::new().unwrap();
        write(&outside, "secret", b"s3cr3t");
        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret"), dir.path().join("leak")).unwrap();
        let (app, state) = app(&dir, 4, 1);

        let response = app.oneshot(get_file("leak", Some("alice"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.limiter().size(), 0);
    }

    #[tokio::test]
    async fn test_download_throttled() {
        let dir = TempDir::new().unwrap();
        write(&dir, "f", b"x");
        let (app, _) = app(&dir, 4, 0);

        let first = app.clone().oneshot(get_file("f", Some("alice"))).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(get_file("f", Some("alice"))).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_download_capacity_exceeded() {
        let dir = TempDir::new().unwrap();
        write(&dir, "f", b"x");
        let (app, state) = app(&dir, 1, 5);

        let first = app.clone().oneshot(get_file("f", Some("alice"))).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(get_file("f", Some("bob"))).await.unwrap();
        assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.limiter().size(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_does_not_charge_client() {
        let dir = TempDir::new().unwrap();
        let (app, state) = app(&dir, 4, 1);

        let response = app.oneshot(get_file("ghost", Some("alice"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(state.limiter().size(), 0);
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir, 4, 1);

        let response = app
            .oneshot(get_file("a/%2E%2E/%2E%2E/secret", Some("alice")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_client_id_falls_back_to_peer_address() {
        let dir = TempDir::new().unwrap();
        write(&dir, "f", b"x");
        let (app, state) = app(&dir, 4, 1);

        let mut request = get_file("f", None);
        let peer: SocketAddr = "10.0.0.7:51000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.limiter().snapshot("10.0.0.7").is_some());
    }

    #[tokio::test]
    async fn test_missing_client_id() {
        let dir = TempDir::new().unwrap();
        write(&dir, "f", b"x");
        let (app, _) = app(&dir, 4, 1);

        let response = app.oneshot(get_file("f", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stats() {
        let dir = TempDir::new().unwrap();
        write(&dir, "f", b"x");
        let (app, _) = app(&dir, 4, 3);

        app.clone().oneshot(get_file("f", Some("alice"))).await.unwrap();
        let response = app
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let stats: StatsResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(stats.tracked, 1);
        assert_eq!(stats.capacity, 4);
        assert_eq!(stats.reset_cycle_secs, 60);
        assert_eq!(stats.reset_tokens, 3);
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir, 4, 1);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"OK");
    }
}
