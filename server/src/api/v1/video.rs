//! Synchronous video operations.

use axum::extract::{Extension, Json};
use axum::http::StatusCode;
use tracing::instrument;

use crate::error::ServerResult;
use crate::State;
use reel::api::v1::video::{JoinRequest, TrimRequest};

/// Trims a video to a range.
#[instrument(skip_all)]
#[axum_macros::debug_handler]
pub(crate) async fn trim(
    Extension(state): Extension<State>,
    Json(request): Json<TrimRequest>,
) -> ServerResult<StatusCode> {
    state
        .media
        .trim(
            &request.file_name,
            request.start_time,
            request.duration,
            &request.output_file,
        )
        .await?;

    tracing::info!(
        file_name = %request.file_name,
        output_file = %request.output_file,
        "Trimmed video"
    );

    Ok(StatusCode::OK)
}

/// Joins videos back to back.
#[instrument(skip_all)]
#[axum_macros::debug_handler]
pub(crate) async fn join(
    Extension(state): Extension<State>,
    Json(request): Json<JoinRequest>,
) -> ServerResult<StatusCode> {
    state.media.join(&request.parts, &request.output_file).await?;

    tracing::info!(
        parts = request.parts.len(),
        output_file = %request.output_file,
        "Joined videos"
    );

    Ok(StatusCode::OK)
}
