//! Live thread wire protocol. All frames are JSON text with lowerCamelCase
//! field names.

use serde::{Deserialize, Serialize};

use crate::models::PostDraft;

/// Reply text for failures whose cause is not shown to clients.
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred.";

/// First frame on every connection: the correlation token it was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAnnouncement {
    pub guid: String,
}

/// A submission from a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Token to address a failure reply to. Only consulted on error.
    /// Sent as `guid` or `token`; a frame carrying both is rejected.
    #[serde(default, alias = "token")]
    pub guid: Option<String>,
    #[serde(default)]
    pub post: Option<PostDraft>,
}

impl InboundMessage {
    /// The submitted draft; a missing or null post is a blank draft.
    pub fn draft(&self) -> PostDraft {
        self.post.clone().unwrap_or_default()
    }
}

/// Private error reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReply {
    pub message: String,
}

impl ErrorReply {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
