//! Router assembly: Pokemon and common routes behind the body limit and request span layers.

mod common;
mod pokemon;

pub use common::{common_routes, common_routes_with_ready};
pub use pokemon::pokemon_routes;

use crate::config::Settings;
use crate::state::AppState;
use axum::{
    extract::{DefaultBodyLimit, Request},
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Full application router.
pub fn app(state: AppState, settings: &Settings) -> Router {
    Router::new()
        .merge(pokemon_routes(state.clone()))
        .merge(common_routes_with_ready(state))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(settings.max_body_bytes))
        .layer(middleware::from_fn(request_span))
}

/// Run each request inside a span with a generated request id, echoed in `x-request-id`.
async fn request_span(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path()
    );
    async move {
        let mut res = next.run(req).await;
        tracing::info!(status = res.status().as_u16(), "response");
        if let Ok(v) = HeaderValue::from_str(&request_id.to_string()) {
            res.headers_mut().insert(REQUEST_ID_HEADER, v);
        }
        res
    }
    .instrument(span)
    .await
}
