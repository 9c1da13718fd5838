//! HTTP middleware for access control.

use axum::{
    http::{header::AUTHORIZATION, Method, Request},
    middleware::Next,
    response::Response,
};

use super::{is_valid_token, parse_authorization_header};
use crate::error::{ServerError, ServerResult};

/// Performs auth.
///
/// Requests without a valid bearer token are rejected before any of the
/// body is read. Preflight requests and the health-check root are
/// exempt; the edge router probes `/` without credentials.
pub(crate) async fn apply_auth<B>(req: Request<B>, next: Next<B>) -> ServerResult<Response> {
    if req.method() == Method::OPTIONS || req.uri().path() == "/" {
        return Ok(next.run(req).await);
    }

    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_authorization_header);

    match token {
        Some(token) if is_valid_token(token) => {
            tracing::trace!("Accepted valid token");
            Ok(next.run(req).await)
        }
        Some(_) => {
            tracing::debug!("Rejecting invalid token");
            Err(ServerError::Unauthorized)
        }
        None => Err(ServerError::Unauthorized),
    }
}
