//! Artifact file names.
//!
//! The client-supplied file name decides where the assembled artifact is
//! written under the upload directory, so it must be a plain base name.

use crate::error::{ReelError, ReelResult};

/// The maximum allowable length of a file name, in bytes.
pub const MAX_FILE_NAME_LENGTH: usize = 255;

/// Validates a client-supplied file name.
pub fn validate_file_name(name: &str) -> ReelResult<()> {
    let invalid = |reason| ReelError::InvalidFileName {
        name: name.to_owned(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("Must not be empty"));
    }

    if name.len() > MAX_FILE_NAME_LENGTH {
        return Err(invalid("Must be at most 255 bytes"));
    }

    if name == "." || name == ".." {
        return Err(invalid("Must not be a directory reference"));
    }

    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(invalid("Must not contain path separators"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_names() {
        validate_file_name("movie.mp4").unwrap();
        validate_file_name("clip (final) v2.mov").unwrap();
        validate_file_name(".hidden").unwrap();
    }

    #[test]
    fn test_rejects_unsafe_names() {
        assert!(validate_file_name("").is_err());
        assert!(validate_file_name(".").is_err());
        assert!(validate_file_name("..").is_err());
        assert!(validate_file_name("../escape.mp4").is_err());
        assert!(validate_file_name("a/b.mp4").is_err());
        assert!(validate_file_name("a\\b.mp4").is_err());
        assert!(validate_file_name("nul\0byte").is_err());
        assert!(validate_file_name(&"x".repeat(256)).is_err());
    }
}
