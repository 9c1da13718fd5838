//! Upload sessions.
//!
//! The session is the single source of truth for the progress of one
//! upload. It lives in the shared session store as one JSON document so
//! that any replica can serve any chunk; the field names below are stable
//! wire identifiers and must not change between releases.
//!
//! ## Chunk bitmap
//!
//! Which chunk indices have been received is tracked as a bitmap
//! transported as a string of `'0'`/`'1'` bytes, one per chunk. The
//! encoding is linear in the number of chunks and can be manipulated
//! in place by the session store's atomic update script.

use std::fmt;

use serde::{de, Deserialize, Serialize, Serializer};

use crate::error::{ReelError, ReelResult};
use crate::file_id::FileId;

/// Status of an upload session.
///
/// The status moves on the wire as a lowercase string tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// The session exists but no chunk has been accepted yet.
    Initializing,

    /// At least one chunk has been accepted.
    Uploading,

    /// Every chunk has been accepted and assembly is in progress.
    Finalizing,

    /// The final artifact has been assembled.
    Completed,

    /// Assembly failed; the staging directory is retained for inspection.
    Failed,
}

impl SessionStatus {
    /// Returns the wire tag of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Uploading => "uploading",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether the session has reached a terminal state.
    ///
    /// Terminal sessions are eligible for deletion and reject mutation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracks which chunk indices of an upload have been received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkBitmap(Vec<u8>);

impl ChunkBitmap {
    /// Creates an all-zero bitmap for `total_chunks` chunks.
    pub fn new(total_chunks: u32) -> Self {
        Self(vec![b'0'; total_chunks as usize])
    }

    /// Returns the number of chunks tracked.
    pub fn len(&self) -> u32 {
        self.0.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether chunk `index` has been received.
    pub fn is_set(&self, index: u32) -> bool {
        self.0.get(index as usize) == Some(&b'1')
    }

    /// Marks chunk `index` as received.
    ///
    /// Returns `false` if the bit was already set.
    pub fn set(&mut self, index: u32) -> bool {
        let slot = &mut self.0[index as usize];
        if *slot == b'1' {
            return false;
        }
        *slot = b'1';
        true
    }

    /// Returns the number of received chunks.
    pub fn count_set(&self) -> u32 {
        self.0.iter().filter(|&&b| b == b'1').count() as u32
    }

    /// Whether every chunk has been received.
    pub fn is_full(&self) -> bool {
        self.0.iter().all(|&b| b == b'1')
    }
}

impl Serialize for ChunkBitmap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // The inner bytes are all ASCII by construction.
        serializer.serialize_str(std::str::from_utf8(&self.0).unwrap())
    }
}

impl<'de> Deserialize<'de> for ChunkBitmap {
    fn deserialize<D: de::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use de::Error;
        let s = String::deserialize(deserializer)?;
        if !s.bytes().all(|b| b == b'0' || b == b'1') {
            return Err(Error::custom("chunk bitmap may only contain '0' and '1'"));
        }
        Ok(Self(s.into_bytes()))
    }
}

/// Outcome of recording a chunk in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The chunk was new and the session was updated.
    Applied {
        /// Whether this chunk completed the upload.
        ///
        /// Exactly one `record_chunk` call per upload observes `true`;
        /// the caller that does is elected to perform assembly.
        just_completed: bool,
    },

    /// The chunk was already recorded and the session is unchanged.
    AlreadyRecorded,
}

/// The server-side record of one upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    /// The upload identifier.
    pub file_id: FileId,

    /// Client-supplied name of the final artifact.
    pub file_name: String,

    /// Declared byte length of the file.
    pub total_size: u64,

    /// Fixed chunk length chosen by the server (except possibly the last chunk).
    pub chunk_size: u64,

    /// Total number of chunks, derived from `total_size` and `chunk_size`.
    pub total_chunks: u32,

    /// Number of distinct chunk indices accepted so far.
    pub uploaded_chunks: u32,

    /// Sum of the byte lengths of accepted chunks.
    pub uploaded_size: u64,

    /// Per-index receipt bitmap. `popcount(chunk_status) == uploaded_chunks`
    /// always holds.
    pub chunk_status: ChunkBitmap,

    /// Lifecycle state.
    pub status: SessionStatus,

    /// Unix timestamp (seconds) of session creation.
    pub created_at: i64,

    /// Unix timestamp (seconds) of the last mutation.
    pub updated_at: i64,
}

impl UploadSession {
    /// Creates a fresh session for a declared file size.
    ///
    /// The number of chunks is derived from the server-chosen chunk size;
    /// any count hinted by the client is not trusted.
    pub fn new(file_id: FileId, file_name: String, total_size: u64, chunk_size: u64, now: i64) -> Self {
        let total_chunks = total_size.div_ceil(chunk_size) as u32;

        Self {
            file_id,
            file_name,
            total_size,
            chunk_size,
            total_chunks,
            uploaded_chunks: 0,
            uploaded_size: 0,
            chunk_status: ChunkBitmap::new(total_chunks),
            status: SessionStatus::Initializing,
            created_at: now,
            updated_at: now,
        }
    }

    /// Records the receipt of one chunk.
    ///
    /// This is the canonical mutation of the protocol: the session store's
    /// atomic update executes exactly this logic. Re-recording an index
    /// that is already set leaves the session unchanged, so duplicate
    /// deliveries (client retries, proxy retries) are safe.
    pub fn record_chunk(
        &mut self,
        chunk_index: u32,
        chunk_len: u64,
        now: i64,
    ) -> ReelResult<ApplyOutcome> {
        if self.status.is_terminal() {
            return Err(ReelError::SessionNotWritable {
                status: self.status.as_str(),
            });
        }

        if chunk_index >= self.total_chunks {
            return Err(ReelError::ChunkIndexOutOfRange {
                index: chunk_index,
                total_chunks: self.total_chunks,
            });
        }

        if !self.chunk_status.is_set(chunk_index)
            && self.uploaded_size + chunk_len > self.total_size
        {
            return Err(ReelError::ChunkTooLarge { index: chunk_index });
        }

        if !self.chunk_status.set(chunk_index) {
            return Ok(ApplyOutcome::AlreadyRecorded);
        }

        self.uploaded_chunks += 1;
        self.uploaded_size += chunk_len;
        self.updated_at = now;

        let just_completed = self.uploaded_chunks == self.total_chunks;
        self.status = if just_completed {
            SessionStatus::Finalizing
        } else {
            SessionStatus::Uploading
        };

        Ok(ApplyOutcome::Applied { just_completed })
    }

    /// Returns the upload progress as a percentage, rounded down.
    pub fn progress(&self) -> u8 {
        if self.total_size == 0 {
            return 100;
        }
        (self.uploaded_size * 100 / self.total_size) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(total_size: u64, chunk_size: u64) -> UploadSession {
        UploadSession::new(
            FileId::generate(),
            "movie.mp4".to_string(),
            total_size,
            chunk_size,
            1000,
        )
    }

    #[test]
    fn test_chunk_derivation() {
        assert_eq!(session(500, 1024).total_chunks, 1);
        assert_eq!(session(3_000_000, 1_048_576).total_chunks, 3);
        assert_eq!(session(1_048_576, 1_048_576).total_chunks, 1);
        assert_eq!(session(1_048_577, 1_048_576).total_chunks, 2);
    }

    #[test]
    fn test_record_chunk_bookkeeping() {
        let mut s = session(2500, 1024);
        assert_eq!(s.total_chunks, 3);

        // chunks may arrive in any order
        for (index, len, expected_count) in [(2u32, 452u64, 1u32), (0, 1024, 2)] {
            let outcome = s.record_chunk(index, len, 2000).unwrap();
            assert_eq!(
                outcome,
                ApplyOutcome::Applied {
                    just_completed: false
                }
            );
            assert_eq!(s.uploaded_chunks, expected_count);
            assert_eq!(s.status, SessionStatus::Uploading);
            // the bitmap and the counter always agree
            assert_eq!(s.chunk_status.count_set(), s.uploaded_chunks);
        }

        let outcome = s.record_chunk(1, 1024, 3000).unwrap();
        assert_eq!(
            outcome,
            ApplyOutcome::Applied {
                just_completed: true
            }
        );
        assert_eq!(s.status, SessionStatus::Finalizing);
        assert_eq!(s.uploaded_size, 2500);
        assert_eq!(s.uploaded_chunks, 3);
        assert!(s.chunk_status.is_full());
        assert_eq!(s.updated_at, 3000);
    }

    #[test]
    fn test_record_chunk_is_idempotent() {
        let mut s = session(2048, 1024);
        s.record_chunk(0, 1024, 2000).unwrap();

        let before = s.clone();
        let outcome = s.record_chunk(0, 1024, 9999).unwrap();
        assert_eq!(outcome, ApplyOutcome::AlreadyRecorded);
        assert_eq!(s, before);
    }

    #[test]
    fn test_record_chunk_bounds() {
        let mut s = session(2048, 1024);

        assert!(matches!(
            s.record_chunk(2, 10, 2000),
            Err(ReelError::ChunkIndexOutOfRange { index: 2, .. })
        ));

        // the declared total size is an upper bound on accepted bytes
        assert!(matches!(
            s.record_chunk(0, 4096, 2000),
            Err(ReelError::ChunkTooLarge { index: 0 })
        ));
        assert_eq!(s.uploaded_size, 0);
    }

    #[test]
    fn test_terminal_sessions_reject_mutation() {
        let mut s = session(1024, 1024);
        s.status = SessionStatus::Failed;

        assert!(matches!(
            s.record_chunk(0, 1024, 2000),
            Err(ReelError::SessionNotWritable { status: "failed" })
        ));
    }

    #[test]
    fn test_progress() {
        let mut s = session(1000, 256);
        assert_eq!(s.progress(), 0);
        s.record_chunk(0, 256, 2000).unwrap();
        assert_eq!(s.progress(), 25);
        s.record_chunk(1, 256, 2000).unwrap();
        s.record_chunk(2, 256, 2000).unwrap();
        assert_eq!(s.progress(), 76);
        s.record_chunk(3, 232, 2000).unwrap();
        assert_eq!(s.progress(), 100);
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut s = session(2500, 1024);
        s.record_chunk(1, 1024, 2000).unwrap();

        let encoded = serde_json::to_string(&s).unwrap();
        let decoded: UploadSession = serde_json::from_str(&encoded).unwrap();
        assert_eq!(s, decoded);

        // the bitmap travels as a compact string, not an array
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["chunk_status"], "010");
        assert_eq!(value["status"], "uploading");
    }

    #[test]
    fn test_bitmap_rejects_junk() {
        assert!(serde_json::from_str::<ChunkBitmap>("\"0120\"").is_err());
        assert!(serde_json::from_str::<ChunkBitmap>("\"01\"").is_ok());
    }
}
