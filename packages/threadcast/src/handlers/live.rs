use axum::{
    extract::{FromRequestParts, Request, State, WebSocketUpgrade},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::AppState;
use crate::live;
use crate::models::ThreadId;

/// Segment index of the thread id in `/api/boards/{board}/threads/{threadId}`
/// (index 0 is the empty segment before the leading slash).
const THREAD_ID_SEGMENT: usize = 5;

/// Extract the thread id from a live thread path. Anything that is not
/// exactly `/api/boards/{board}/threads/{integer}` yields `None`.
pub fn parse_thread_target(path: &str) -> Option<ThreadId> {
    let segments: Vec<&str> = path.trim_end_matches('/').split('/').collect();
    match segments.as_slice() {
        ["", "api", "boards", board, "threads", _] if !board.is_empty() => {
            segments[THREAD_ID_SEGMENT].parse().ok()
        }
        _ => None,
    }
}

/// Accept WebSocket upgrades on live thread paths. Every other request,
/// including plain GETs on the same path, goes to the next handler as is.
pub async fn live_thread_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(thread_id) = parse_thread_target(request.uri().path()) else {
        return next.run(request).await;
    };

    let (mut parts, body) = request.into_parts();
    let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!(thread_id = %thread_id, %rejection, "not a websocket upgrade, passing through");
            return next.run(Request::from_parts(parts, body)).await;
        }
    };

    let ctx = state.live.clone();
    let cancel = state.shutdown.child_token();
    ws.on_upgrade(move |socket| live::run(socket, ctx, thread_id, cancel))
}
