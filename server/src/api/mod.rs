//! HTTP API.

mod v1;

use axum::{response::Html, routing::get, Router};

async fn placeholder() -> Html<&'static str> {
    Html(include_str!("placeholder.html"))
}

pub(crate) fn get_router() -> Router {
    Router::new()
        .route("/", get(placeholder))
        .merge(v1::get_router())
}
