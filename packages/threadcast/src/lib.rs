//! Live post distribution for discussion threads.
//!
//! Clients open a WebSocket on `/api/boards/{board}/threads/{threadId}` and
//! receive every post created in that thread. Posts are submitted over the
//! same socket or via `POST .../posts`; either way the created post is
//! broadcast to the thread's open connections.

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use uuid::Uuid;

pub mod config;
pub mod handlers;
pub mod identity;
pub mod live;
pub mod metrics;
pub mod models;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;

use crate::live::LiveContext;
use crate::metrics::ServerMetrics;

#[derive(Clone)]
pub struct AppState {
    pub live: LiveContext,
    /// Server metrics for observability
    pub metrics: Arc<ServerMetrics>,
    /// Cancelled on server shutdown; each live session runs on a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(live: LiveContext, shutdown: CancellationToken) -> Self {
        Self {
            metrics: live.metrics.clone(),
            live,
            shutdown,
        }
    }
}

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

/// All routes, with the live thread middleware in front of them.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route(
            "/api/boards/{board}/threads/{thread}/posts",
            post(handlers::create_post),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            handlers::live_thread_middleware,
        ))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
