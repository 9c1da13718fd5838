//! The shared session store.
//!
//! Sessions are keyed by `upload:<file_id>` and shared by every replica.
//! The store is the authority on protocol state: chunk receipts are
//! recorded through `apply_chunk`, whose atomicity is what makes
//! concurrent ingestion across replicas coherent and what guarantees
//! that exactly one replica is elected to assemble the final file.

mod redis;


use async_trait::async_trait;

use crate::error::ServerResult;
use reel::file_id::FileId;
use reel::session::{SessionStatus, UploadSession};

pub(crate) use self::redis::RedisSessionStore;

/// Result of atomically recording a chunk.
#[derive(Debug)]
pub struct ChunkOutcome {
    /// The session after the mutation.
    pub session: UploadSession,

    /// Whether this call completed the upload.
    ///
    /// Exactly one `apply_chunk` call per upload returns `true` across
    /// the entire fleet; the caller that observes it performs assembly.
    pub just_completed: bool,
}

#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Creates a new session.
    ///
    /// Fails with `SessionAlreadyExists` if a session with the same
    /// file ID is present.
    async fn create(&self, session: &UploadSession) -> ServerResult<()>;

    /// Retrieves a session.
    ///
    /// Fails with `InvalidSession` if absent and `CorruptSession` if the
    /// stored payload cannot be decoded.
    async fn load(&self, file_id: &FileId) -> ServerResult<UploadSession>;

    /// Atomically records the receipt of one chunk.
    ///
    /// The read-modify-write is a single atomic step in the store:
    /// concurrent calls for distinct indices cannot lose updates, and
    /// re-applying an index that is already set returns the session
    /// unchanged.
    async fn apply_chunk(
        &self,
        file_id: &FileId,
        chunk_index: u32,
        chunk_len: u64,
    ) -> ServerResult<ChunkOutcome>;

    /// Overwrites the lifecycle status of a session.
    async fn set_status(&self, file_id: &FileId, status: SessionStatus) -> ServerResult<()>;

    /// Deletes a session. Idempotent.
    async fn delete(&self, file_id: &FileId) -> ServerResult<()>;
}

/// Returns the store key of a session.
fn session_key(file_id: &FileId) -> String {
    format!("upload:{}", file_id)
}
