//! Upload identifiers.
//!
//! A file ID is the primary key of an upload session: 32 lowercase
//! hexadecimal characters generated from 16 cryptographically random
//! bytes when the upload is initialized. Every chunk and status request
//! carries it, and the staging directory on disk is named after it.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{de, Deserialize, Serialize};

use crate::error::{ReelError, ReelResult};

/// The exact length of a file ID.
pub const FILE_ID_LENGTH: usize = 32;

/// The identifier of an upload.
#[derive(Serialize, Deserialize, Clone, Debug, Hash, Eq, PartialEq)]
#[serde(transparent)]
pub struct FileId(#[serde(deserialize_with = "FileId::deserialize")] String);

impl FileId {
    /// Creates a file ID from a String.
    pub fn new(id: String) -> ReelResult<Self> {
        validate_file_id(&id)?;
        Ok(Self(id))
    }

    /// Generates a fresh random file ID.
    pub fn generate() -> Self {
        let mut bytes = [0u8; FILE_ID_LENGTH / 2];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Returns the string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deserializes a potentially-invalid file ID.
    fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        use de::Error;
        String::deserialize(deserializer).and_then(|s| {
            validate_file_id(&s).map_err(|e| Error::custom(e.to_string()))?;
            Ok(s)
        })
    }
}

impl FromStr for FileId {
    type Err = ReelError;

    fn from_str(id: &str) -> ReelResult<Self> {
        Self::new(id.to_owned())
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn validate_file_id(id: &str) -> ReelResult<()> {
    let invalid = |reason| ReelError::InvalidFileId {
        id: id.to_owned(),
        reason,
    };

    if id.len() != FILE_ID_LENGTH {
        return Err(invalid("Must be exactly 32 characters"));
    }

    if !id
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(invalid("Must be lowercase hexadecimal"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_valid() {
        let id = FileId::generate();
        assert_eq!(id.as_str().len(), FILE_ID_LENGTH);
        FileId::new(id.as_str().to_owned()).unwrap();

        assert_ne!(FileId::generate(), FileId::generate());
    }

    #[test]
    fn test_parse() {
        let valid = "0123456789abcdef0123456789abcdef";
        assert_eq!(valid.parse::<FileId>().unwrap().as_str(), valid);

        // too short
        assert!("abc123".parse::<FileId>().is_err());

        // uppercase
        assert!("0123456789ABCDEF0123456789ABCDEF".parse::<FileId>().is_err());

        // non-hex
        assert!("0123456789abcdef0123456789abcdeg".parse::<FileId>().is_err());

        // path traversal cannot hide in a file ID
        assert!("../../../../../../../etc/passwd".parse::<FileId>().is_err());
    }

    #[test]
    fn test_deserialize_rejects_invalid() {
        let valid: FileId = serde_json::from_str("\"0123456789abcdef0123456789abcdef\"").unwrap();
        assert_eq!(valid.as_str(), "0123456789abcdef0123456789abcdef");

        assert!(serde_json::from_str::<FileId>("\"not a file id\"").is_err());
    }
}
