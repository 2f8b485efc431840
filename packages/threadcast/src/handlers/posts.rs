use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use crate::AppState;
use crate::live::{ErrorReply, GENERIC_ERROR_MESSAGE};
use crate::models::{PostDraft, ThreadId};
use crate::store::PostError;

/// Create a post over plain HTTP and publish it to the thread's live
/// connections. The response carries the same representation they receive.
pub async fn create_post(
    State(state): State<AppState>,
    Path((board, thread_id)): Path<(String, ThreadId)>,
    Json(draft): Json<PostDraft>,
) -> Response {
    match state.live.store.create(thread_id, draft).await {
        Ok(post) => {
            if let Err(e) = state.live.broadcaster.publish(thread_id, &post) {
                error!(post_id = post.id, error = %e, "failed to encode post for broadcast");
            }
            debug!(%board, thread_id = %thread_id, post_id = post.id, "post created over http");
            Json(post).into_response()
        }
        Err(PostError::ValidationFailed(message)) => {
            (StatusCode::BAD_REQUEST, Json(ErrorReply::new(message))).into_response()
        }
        Err(PostError::Unexpected(e)) => {
            error!(%board, thread_id = %thread_id, error = %e, "post creation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorReply::new(GENERIC_ERROR_MESSAGE)),
            )
                .into_response()
        }
    }
}
