//! Error handling.

use std::error::Error as StdError;
use std::io;

use displaydoc::Display;

pub type ReelResult<T> = Result<T, ReelError>;

/// An error.
#[derive(Debug, Display)]
pub enum ReelError {
    /// Invalid file ID "{id}": {reason}
    InvalidFileId { id: String, reason: &'static str },

    /// Invalid file name "{name}": {reason}
    InvalidFileName { name: String, reason: &'static str },

    /// Chunk index {index} is out of range (the upload has {total_chunks} chunks)
    ChunkIndexOutOfRange { index: u32, total_chunks: u32 },

    /// Chunk {index} would exceed the declared size of the upload
    ChunkTooLarge { index: u32 },

    /// The session is {status} and can no longer be modified
    SessionNotWritable { status: &'static str },

    /// I/O error: {error}.
    IoError { error: io::Error },
}

impl ReelError {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidFileId { .. } => "InvalidFileId",
            Self::InvalidFileName { .. } => "InvalidFileName",
            Self::ChunkIndexOutOfRange { .. } => "ChunkIndexOutOfRange",
            Self::ChunkTooLarge { .. } => "ChunkTooLarge",
            Self::SessionNotWritable { .. } => "SessionNotWritable",
            Self::IoError { .. } => "IoError",
        }
    }
}

impl StdError for ReelError {}

impl From<io::Error> for ReelError {
    fn from(error: io::Error) -> Self {
        Self::IoError { error }
    }
}
