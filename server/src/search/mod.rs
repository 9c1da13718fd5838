//! Search indexing of upload lifecycle events.
//!
//! One indexer exists per process, created lazily on first use and
//! shared by every handler; the underlying HTTP client pools its
//! connections. Indexing is best-effort only: a failure is logged and
//! the upload carries on, so none of these calls sit on the
//! correctness path.

use std::future::Future;
use std::path::Path;

use anyhow::anyhow;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::json;

use crate::config::SearchConfig;
use crate::error::{ServerError, ServerResult};
use reel::file_id::FileId;
use reel::session::UploadSession;

#[derive(Debug)]
pub struct SearchIndexer {
    client: Client,
    endpoint: String,
    index: String,
}

impl SearchIndexer {
    pub fn new(config: &SearchConfig) -> ServerResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(ServerError::indexer_error)?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_owned(),
            index: config.index.clone(),
        })
    }

    /// Indexes the creation of an upload session.
    pub async fn index_initialize(
        &self,
        session: &UploadSession,
        directory: &Path,
    ) -> ServerResult<()> {
        self.put_document(
            session.file_id.as_str(),
            json!({
                "event": "initialize_upload",
                "directory": directory.to_string_lossy(),
                "file_name": session.file_name,
                "file_size": session.total_size,
            }),
        )
        .await
    }

    /// Indexes the arrival of one chunk.
    pub async fn index_chunk(
        &self,
        file_id: &FileId,
        chunk_index: u32,
        chunk_path: &Path,
        file_name: &str,
    ) -> ServerResult<()> {
        self.put_document(
            &format!("{}_{}", file_id, chunk_index),
            json!({
                "event": "chunk_upload",
                "chunk_path": chunk_path.to_string_lossy(),
                "file_name": file_name,
                "chunk_index": chunk_index,
            }),
        )
        .await
    }

    /// Indexes the completion of an upload.
    pub async fn index_complete(
        &self,
        session: &UploadSession,
        directory: &Path,
    ) -> ServerResult<()> {
        self.put_document(
            session.file_id.as_str(),
            json!({
                "event": "complete_upload",
                "directory": directory.to_string_lossy(),
                "file_name": session.file_name,
                "file_size": session.total_size,
                "total_chunks": session.total_chunks,
            }),
        )
        .await
    }

    /// Writes one document, succeeding iff the engine returns 2xx.
    async fn put_document(&self, doc_id: &str, body: serde_json::Value) -> ServerResult<()> {
        let url = format!("{}/{}/_doc/{}", self.endpoint, self.index, doc_id);

        let response = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(ServerError::indexer_error)?;

        let status = response.status();
        // drain the body so the connection can be reused
        let _ = response.bytes().await;

        if !status.is_success() {
            return Err(ServerError::IndexerError(anyhow!(
                "search engine returned {} for {}",
                status,
                url
            )));
        }

        Ok(())
    }
}

/// Fires an indexing future on a background task, logging failures.
pub(crate) fn spawn_index<F>(future: F)
where
    F: Future<Output = ServerResult<()>> + Send + 'static,
{
    tokio::task::spawn(async move {
        if let Err(e) = future.await {
            tracing::warn!("Failed to index lifecycle event: {}", e);
        }
    });
}
