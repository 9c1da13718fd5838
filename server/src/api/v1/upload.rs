//! The chunked-upload protocol.
//!
//! Any replica may serve any of these requests: the session store keeps
//! the protocol state, the chunk store holds the blobs, and the catalog
//! and search indexer trail behind as best-effort observers.
//!
//! Completion detection doubles as leader election. `apply_chunk` is
//! atomic in the session store, so across all replicas exactly one call
//! observes the transition to `finalizing`. That caller, whichever
//! replica it ran on, performs assembly inline before responding.

use anyhow::anyhow;
use axum::{
    extract::{Extension, Json},
    http::HeaderMap,
};
use bytes::Bytes;
use chrono::Utc;
use tracing::instrument;

use crate::database::ReelDatabase;
use crate::error::{ServerError, ServerResult};
use crate::search::spawn_index;
use crate::State;
use reel::api::v1::upload::{
    ChunkUploadResponse, InitializeUploadRequest, InitializeUploadResponse, UploadStatusResponse,
    REEL_CHUNK_INDEX, REEL_FILE_ID,
};
use reel::file_id::FileId;
use reel::file_name::validate_file_name;
use reel::session::{SessionStatus, UploadSession};

/// Size of every chunk except possibly the last.
pub(crate) const CHUNK_SIZE: u64 = 1024 * 1024;

/// Maximum declared size of an upload.
const MAX_FILE_SIZE: u64 = 1000 * 1024 * 1024;

/// Request body cap: one chunk plus framing slack.
pub(crate) const CHUNK_BODY_LIMIT: usize = CHUNK_SIZE as usize + 64 * 1024;

/// How many file IDs to try before giving up on a collision streak.
const FILE_ID_ATTEMPTS: usize = 3;

/// Initializes an upload session.
#[instrument(skip_all)]
#[axum_macros::debug_handler]
pub(crate) async fn initialize(
    Extension(state): Extension<State>,
    Json(request): Json<InitializeUploadRequest>,
) -> ServerResult<Json<InitializeUploadResponse>> {
    if request.file_size == 0 {
        return Err(ServerError::InvalidRequestBody(anyhow!(
            "fileSize must be positive"
        )));
    }

    if request.file_size > MAX_FILE_SIZE {
        return Err(ServerError::FileTooLarge);
    }

    validate_file_name(&request.file_name)?;

    let sessions = state.sessions().await?;
    let now = Utc::now().timestamp();

    // The chunk count is derived from the server-chosen chunk size; the
    // count hinted by the client is not trusted.
    let mut created = None;
    for _ in 0..FILE_ID_ATTEMPTS {
        let session = UploadSession::new(
            FileId::generate(),
            request.file_name.clone(),
            request.file_size,
            CHUNK_SIZE,
            now,
        );

        match sessions.create(&session).await {
            Ok(()) => {
                created = Some(session);
                break;
            }
            Err(ServerError::SessionAlreadyExists) => {
                tracing::warn!("File ID collision, regenerating");
                continue;
            }
            Err(e) => return Err(e),
        }
    }
    let session = created.ok_or(ServerError::InternalServerError)?;

    let chunk_store = state.chunk_store().await?;
    chunk_store.create_staging(&session.file_id).await?;

    match state.search().await {
        Ok(search) => {
            let search = search.clone();
            let directory = chunk_store.staging_dir(&session.file_id);
            let indexed = session.clone();
            spawn_index(async move { search.index_initialize(&indexed, &directory).await });
        }
        Err(e) => tracing::warn!("Search indexer unavailable: {}", e),
    }

    tracing::info!(
        file_id = %session.file_id,
        file_size = session.total_size,
        total_chunks = session.total_chunks,
        "Initialized upload"
    );

    Ok(Json(InitializeUploadResponse {
        file_id: session.file_id.clone(),
        file_name: session.file_name,
        file_size: session.total_size,
        total_chunks: session.total_chunks,
        chunk_size: session.chunk_size,
    }))
}

/// Accepts one chunk.
#[instrument(skip_all)]
#[axum_macros::debug_handler]
pub(crate) async fn chunk(
    Extension(state): Extension<State>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<Json<ChunkUploadResponse>> {
    let file_id = file_id_header(&headers)?;
    let chunk_index: u32 = headers
        .get(REEL_CHUNK_INDEX)
        .ok_or_else(|| ServerError::InvalidRequestBody(anyhow!("X-Chunk-Index must be set")))?
        .to_str()
        .ok()
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| {
            ServerError::InvalidRequestBody(anyhow!("X-Chunk-Index must be a non-negative integer"))
        })?;

    let sessions = state.sessions().await?;
    let session = sessions.load(&file_id).await?;

    if chunk_index >= session.total_chunks {
        return Err(ServerError::InvalidRequestBody(anyhow!(
            "chunk index {} is out of range (the upload has {} chunks)",
            chunk_index,
            session.total_chunks
        )));
    }

    if body.len() as u64 > session.chunk_size {
        return Err(ServerError::InvalidRequestBody(anyhow!(
            "chunk of {} bytes exceeds the chunk size of {}",
            body.len(),
            session.chunk_size
        )));
    }

    let chunk_store = state.chunk_store().await?;
    let chunk_path = chunk_store
        .write_chunk(&file_id, chunk_index, &body)
        .await?;

    // Durable audit trail only; the bytes are already on disk and the
    // session store is the authority, so a catalog failure must not
    // fail the upload.
    match state.database().await {
        Ok(database) => {
            if let Err(e) = database
                .upsert_chunk(&file_id, session.total_chunks, chunk_index, &chunk_path)
                .await
            {
                tracing::warn!("Failed to record chunk in catalog: {}", e);
            }
        }
        Err(e) => tracing::warn!("Catalog unavailable: {}", e),
    }

    let outcome = sessions
        .apply_chunk(&file_id, chunk_index, body.len() as u64)
        .await?;

    match state.search().await {
        Ok(search) => {
            let search = search.clone();
            let file_id = file_id.clone();
            let file_name = outcome.session.file_name.clone();
            spawn_index(async move {
                search
                    .index_chunk(&file_id, chunk_index, &chunk_path, &file_name)
                    .await
            });
        }
        Err(e) => tracing::warn!("Search indexer unavailable: {}", e),
    }

    let session = if outcome.just_completed {
        finalize(&state, outcome.session).await?
    } else {
        outcome.session
    };

    let message = match session.status {
        SessionStatus::Completed => "Upload complete".to_string(),
        _ => format!("Chunk {} received", chunk_index),
    };

    Ok(Json(ChunkUploadResponse {
        received: true,
        status: session.status,
        progress: session.progress(),
        uploaded_size: session.uploaded_size,
        total_size: session.total_size,
        message,
    }))
}

/// Returns the progress of an upload. Pure read.
#[instrument(skip_all)]
#[axum_macros::debug_handler]
pub(crate) async fn status(
    Extension(state): Extension<State>,
    headers: HeaderMap,
) -> ServerResult<Json<UploadStatusResponse>> {
    let file_id = file_id_header(&headers)?;

    let sessions = state.sessions().await?;
    let session = sessions.load(&file_id).await?;

    Ok(Json(UploadStatusResponse {
        status: session.status,
        progress: session.progress(),
        uploaded_size: session.uploaded_size,
        total_size: session.total_size,
        total_chunks: session.total_chunks,
        uploaded_chunks: session.uploaded_chunks,
    }))
}

/// Assembles the final artifact.
///
/// Runs on the single replica whose `apply_chunk` completed the upload.
/// The artifact is durable once the staged file is renamed into place;
/// everything after that point is best-effort cleanup and bookkeeping.
#[instrument(skip_all, fields(file_id = %session.file_id))]
async fn finalize(state: &State, mut session: UploadSession) -> ServerResult<UploadSession> {
    let sessions = state.sessions().await?;
    let chunk_store = state.chunk_store().await?;

    let final_size = match chunk_store
        .assemble(&session.file_id, &session.file_name, session.total_chunks)
        .await
    {
        Ok(size) => size,
        Err(e) => {
            // keep the staging directory for inspection
            if let Err(status_err) = sessions
                .set_status(&session.file_id, SessionStatus::Failed)
                .await
            {
                tracing::error!("Failed to mark session as failed: {}", status_err);
            }
            return Err(e);
        }
    };

    match state.database().await {
        Ok(database) => {
            if let Err(e) = database
                .upsert_final(
                    &session.file_id,
                    final_size,
                    &chunk_store.final_path(&session.file_name),
                )
                .await
            {
                tracing::warn!("Failed to record final file in catalog: {}", e);
            }
        }
        Err(e) => tracing::warn!("Catalog unavailable: {}", e),
    }

    match state.search().await {
        Ok(search) => {
            let search = search.clone();
            let directory = chunk_store.staging_dir(&session.file_id);
            let indexed = session.clone();
            spawn_index(async move { search.index_complete(&indexed, &directory).await });
        }
        Err(e) => tracing::warn!("Search indexer unavailable: {}", e),
    }

    if let Err(e) = chunk_store.remove_staging(&session.file_id).await {
        tracing::warn!("Failed to remove staging directory: {}", e);
    }

    sessions.delete(&session.file_id).await?;

    tracing::info!(file_size = final_size, "Assembled final file");

    session.status = SessionStatus::Completed;
    session.updated_at = Utc::now().timestamp();

    Ok(session)
}

fn file_id_header(headers: &HeaderMap) -> ServerResult<FileId> {
    let value = headers
        .get(REEL_FILE_ID)
        .ok_or_else(|| ServerError::InvalidRequestBody(anyhow!("X-File-Id must be set")))?
        .to_str()
        .map_err(|_| ServerError::InvalidRequestBody(anyhow!("X-File-Id is not valid UTF-8")))?;

    Ok(value.parse()?)
}
