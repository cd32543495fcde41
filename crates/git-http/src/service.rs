//! Mounting the protocol handlers into an axum application.

use std::time::Instant;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics::histogram;

use crate::handlers;
use crate::routes::{Operation, Route, match_route};
use crate::state::GitHttpState;

/// Matches the request against the Git routes after percent-decoding the
/// path. Paths that do not decode to UTF-8 never match.
pub fn route_request(request: &Request) -> Option<Route> {
    let path = urlencoding::decode(request.uri().path()).ok()?;
    match_route(&path, request.uri().query())
}

/// Runs the handler for an already matched route.
pub async fn dispatch(state: GitHttpState, route: Route, request: Request) -> Response {
    let started = Instant::now();
    let operation = route.operation();
    let (parts, body) = request.into_parts();

    let result = match operation {
        Operation::Advertisement => {
            handlers::info_refs(&state, &route, parts.uri.query(), &parts.headers).await
        }
        Operation::Fetch => handlers::upload_pack(&state, &route, &parts.headers, body).await,
        Operation::Push => handlers::receive_pack(&state, &route, &parts.headers, body).await,
    };

    histogram!("git_http.request_ms", "operation" => operation.as_str())
        .record(started.elapsed().as_secs_f64() * 1000.0);

    match result {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(operation = operation.as_str(), status = %err.status(), error = %err, "request failed");
            err.into_response()
        }
    }
}

/// Middleware for `axum::middleware::from_fn_with_state`. Git requests are
/// answered here; everything else goes on to `next`.
pub async fn middleware(
    State(state): State<GitHttpState>,
    request: Request,
    next: Next,
) -> Response {
    match route_request(&request) {
        Some(route) => dispatch(state, route, request).await,
        None => next.run(request).await,
    }
}

/// A router serving only Git requests. Anything else is a 404.
pub fn router(state: GitHttpState) -> Router {
    Router::new().fallback(fallback).with_state(state)
}

async fn fallback(State(state): State<GitHttpState>, request: Request) -> Response {
    match route_request(&request) {
        Some(route) => dispatch(state, route, request).await,
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}
