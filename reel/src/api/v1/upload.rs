use serde::{Deserialize, Serialize};

use crate::file_id::FileId;
use crate::session::SessionStatus;

/// Header carrying the upload identifier.
pub const REEL_FILE_ID: &str = "X-File-Id";

/// Header carrying the chunk index.
pub const REEL_CHUNK_INDEX: &str = "X-Chunk-Index";

/// Request to initialize an upload.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeUploadRequest {
    /// Name of the final artifact.
    pub file_name: String,

    /// Declared byte length of the file.
    pub file_size: u64,

    /// The client's idea of the chunk count.
    ///
    /// This is informational only; the server derives the authoritative
    /// count from its own chunk size.
    #[serde(default)]
    pub total_chunks: Option<u32>,
}

/// Response to a successful initialization.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeUploadResponse {
    /// The generated upload identifier.
    pub file_id: FileId,

    /// Echo of the artifact name.
    pub file_name: String,

    /// Echo of the declared size.
    pub file_size: u64,

    /// Authoritative chunk count.
    pub total_chunks: u32,

    /// The fixed chunk size the client must slice the file into.
    pub chunk_size: u64,
}

/// Response to an accepted chunk.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploadResponse {
    /// Always `true` for a 2xx response.
    pub received: bool,

    /// Session status after this chunk was recorded.
    pub status: SessionStatus,

    /// Upload progress in percent, rounded down.
    pub progress: u8,

    /// Bytes accepted so far.
    pub uploaded_size: u64,

    /// Declared byte length of the file.
    pub total_size: u64,

    /// Human-readable summary.
    pub message: String,
}

/// Response to a status query.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatusResponse {
    /// Current session status.
    pub status: SessionStatus,

    /// Upload progress in percent, rounded down.
    pub progress: u8,

    /// Bytes accepted so far.
    pub uploaded_size: u64,

    /// Declared byte length of the file.
    pub total_size: u64,

    /// Authoritative chunk count.
    pub total_chunks: u32,

    /// Number of distinct chunks accepted so far.
    pub uploaded_chunks: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_casing() {
        let request: InitializeUploadRequest = serde_json::from_str(
            r#"{"fileName": "a.txt", "fileSize": 500, "totalChunks": 1}"#,
        )
        .unwrap();
        assert_eq!(request.file_name, "a.txt");
        assert_eq!(request.file_size, 500);
        assert_eq!(request.total_chunks, Some(1));

        // the chunk-count hint is optional
        let request: InitializeUploadRequest =
            serde_json::from_str(r#"{"fileName": "a.txt", "fileSize": 500}"#).unwrap();
        assert_eq!(request.total_chunks, None);

        let response = ChunkUploadResponse {
            received: true,
            status: SessionStatus::Uploading,
            progress: 33,
            uploaded_size: 1_048_576,
            total_size: 3_000_000,
            message: "Chunk received".to_string(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "uploading");
        assert_eq!(value["uploadedSize"], 1_048_576);
        assert_eq!(value["totalSize"], 3_000_000);
    }
}
