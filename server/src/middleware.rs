use axum::{
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Appends the CORS header set to every response.
///
/// Preflight requests are answered here with 204 and never reach the
/// routes (or auth).
pub(crate) async fn apply_cors<B>(req: Request<B>, next: Next<B>) -> Response {
    if req.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        append_cors_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(req).await;
    append_cors_headers(response.headers_mut());
    response
}

fn append_cors_headers(headers: &mut HeaderMap) {
    headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("POST, GET, OPTIONS"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("Content-Type, X-File-Id, X-Chunk-Index, Accept, Authorization"),
    );
    headers.insert(
        "Access-Control-Expose-Headers",
        HeaderValue::from_static("Authorization"),
    );
}
