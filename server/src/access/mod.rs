//! Access control.
//!
//! Every mutating endpoint requires a bearer token from a fixed
//! allowlist compiled into the binary. There is no per-upload access
//! control beyond this: a valid token may touch any upload.

pub(crate) mod http;

/// Tokens accepted by the service.
const VALID_TOKENS: &[&str] = &[
    "9f2c1d8a47e6b3059c8d1f0a2b4e6c81",
    "51b7aa03d9c42e6f8810b5a7c3d9e2f4",
];

/// Extracts the bearer token from an `Authorization` header value.
pub fn parse_authorization_header(authorization: &str) -> Option<&str> {
    let (scheme, token) = authorization.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Whether a token is on the allowlist.
pub fn is_valid_token(token: &str) -> bool {
    VALID_TOKENS.contains(&token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_authorization_header() {
        assert_eq!(parse_authorization_header("Bearer abc"), Some("abc"));
        assert_eq!(parse_authorization_header("bearer abc"), Some("abc"));
        assert_eq!(parse_authorization_header("Bearer  abc "), Some("abc"));

        assert_eq!(parse_authorization_header("Basic abc"), None);
        assert_eq!(parse_authorization_header("Bearer"), None);
        assert_eq!(parse_authorization_header("Bearer "), None);
        assert_eq!(parse_authorization_header(""), None);
    }

    #[test]
    fn test_token_allowlist() {
        assert!(is_valid_token(VALID_TOKENS[0]));
        assert!(!is_valid_token("not_a_token"));
        assert!(!is_valid_token(""));
    }
}
