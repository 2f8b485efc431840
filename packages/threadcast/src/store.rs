//! Post creation seam.
//!
//! Live sessions and the HTTP submission path both create posts through
//! [`PostStore`]. The store decides what a valid post is; callers only
//! distinguish a validation failure (shown to the submitter) from anything
//! else (reported generically).

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::debug;

use crate::models::{Post, PostDraft, ThreadId};

pub const EMPTY_POST_MESSAGE: &str = "Post was empty";
pub const TOO_LONG_MESSAGE: &str = "Post is too long";

#[derive(Debug, thiserror::Error)]
pub enum PostError {
    /// The draft was rejected; the message is safe to show to the submitter.
    #[error("{0}")]
    ValidationFailed(String),

    /// Anything else. The cause is logged, never sent to clients.
    #[error("unexpected post store failure: {0}")]
    Unexpected(#[from] anyhow::Error),
}

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Durably create a post in `thread_id` and return its canonical form.
    async fn create(&self, thread_id: ThreadId, draft: PostDraft) -> Result<Post, PostError>;
}

/// In-process store. Posts live as long as the process does.
pub struct MemoryPostStore {
    next_id: AtomicI64,
    max_content_chars: usize,
    /// Threads that already have an opening post.
    opened: DashSet<ThreadId>,
}

impl MemoryPostStore {
    pub fn new(max_content_chars: usize) -> Self {
        Self {
            next_id: AtomicI64::new(1),
            max_content_chars,
            opened: DashSet::new(),
        }
    }

    fn validate(&self, draft: &PostDraft) -> Result<(), PostError> {
        if draft.is_blank() {
            return Err(PostError::ValidationFailed(EMPTY_POST_MESSAGE.to_string()));
        }
        if let Some(content) = &draft.content {
            if content.chars().count() > self.max_content_chars {
                return Err(PostError::ValidationFailed(TOO_LONG_MESSAGE.to_string()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn create(&self, thread_id: ThreadId, draft: PostDraft) -> Result<Post, PostError> {
        self.validate(&draft)?;

        let is_op = self.opened.insert(thread_id);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let trimmed = |s: Option<String>| {
            s.map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let post = Post {
            id,
            thread_id,
            content: trimmed(draft.content),
            image: trimmed(draft.image),
            is_op,
            created_at: Utc::now(),
        };
        debug!(post_id = id, thread_id = %thread_id, is_op, "created post");
        Ok(post)
    }
}
