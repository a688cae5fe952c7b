//! HTTP front door: `GET /:file` answers with the preview for one upload.

use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::PreviewConfig;
use crate::job::{JobRunner, PreviewRequest};
use crate::outcome::ResultCode;

#[derive(Clone)]
pub struct ServerState {
    config: Arc<PreviewConfig>,
    runner: JobRunner,
}

impl ServerState {
    pub fn new(config: PreviewConfig, runner: JobRunner) -> Self {
        Self {
            config: Arc::new(config),
            runner,
        }
    }
}

pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/:file", get(preview))
        .layer(cors)
        .with_state(state)
}

/// Identifiers are used verbatim as file names, so anything that could
/// address another directory is refused.
pub fn is_valid_file_id(file_id: &str) -> bool {
    !file_id.is_empty()
        && file_id != "."
        && file_id != ".."
        && !file_id.contains(['/', '\\', '\0'])
}

async fn preview(State(state): State<ServerState>, Path(file_id): Path<String>) -> Response {
    if !is_valid_file_id(&file_id) {
        return (StatusCode::BAD_REQUEST, "Invalid file identifier").into_response();
    }

    let cache = state.runner.cache();
    if let Some(artifact) = cache.lookup(&file_id).await {
        return serve_artifact(&artifact).await;
    }

    let upload = state.config.upload_path(&file_id);
    if !tokio::fs::try_exists(&upload).await.unwrap_or(false) {
        return (StatusCode::NOT_FOUND, "No such upload").into_response();
    }

    let outcome = state.runner.run(PreviewRequest::new(file_id, upload)).await;
    match (outcome.code, outcome.artifact) {
        (ResultCode::Success, Some(artifact)) => serve_artifact(&artifact).await,
        (code, _) => status_of(code).into_response(),
    }
}

fn status_of(code: ResultCode) -> StatusCode {
    StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn serve_artifact(path: &FsPath) -> Response {
    match tokio::fs::read(path).await {
        Ok(bytes) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "image/webp")
            .header(header::CONTENT_LENGTH, bytes.len())
            .header(header::CACHE_CONTROL, "public, max-age=86400")
            .body(Body::from(bytes))
            .unwrap_or_else(|e| {
                log::error!(target: "nimbus_preview::server", "Failed to build response: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }),
        Err(e) => {
            log::error!(
                target: "nimbus_preview::server",
                "Failed to read artifact {}: {}",
                path.display(),
                e
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_identifiers_that_escape_the_root() {
        assert!(is_valid_file_id("clip.mp4"));
        assert!(is_valid_file_id("..hidden"));
        assert!(is_valid_file_id("weird name (1).MP4"));
        assert!(!is_valid_file_id(""));
        assert!(!is_valid_file_id("."));
        assert!(!is_valid_file_id(".."));
        assert!(!is_valid_file_id("../etc/passwd"));
        assert!(!is_valid_file_id("a\\b"));
        assert!(!is_valid_file_id("a\0b"));
    }

    #[test]
    fn result_codes_become_statuses() {
        assert_eq!(status_of(ResultCode::UnsupportedType), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(status_of(ResultCode::RenderFailure), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_of(ResultCode::Timeout), StatusCode::REQUEST_TIMEOUT);
    }
}
