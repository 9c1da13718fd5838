mod upload;
mod video;

use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{get, post},
    Router,
};

pub(crate) fn get_router() -> Router {
    Router::new()
        .route("/api/upload/initialize", post(upload::initialize))
        .route("/api/upload/chunk", post(upload::chunk))
        .route("/api/upload/status", get(upload::status))
        .route("/api/video/trim", post(video::trim))
        .route("/api/video/join", post(video::join))
        .layer(DefaultBodyLimit::max(upload::CHUNK_BODY_LIMIT))
}
