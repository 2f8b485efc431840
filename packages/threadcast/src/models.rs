use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a discussion thread. Threads are created elsewhere; here the id
/// is only a grouping key for live connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub i64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ThreadId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(ThreadId)
    }
}

impl From<i64> for ThreadId {
    fn from(id: i64) -> Self {
        ThreadId(id)
    }
}

/// A post as submitted by a client, before the store has accepted it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDraft {
    #[serde(default)]
    pub content: Option<String>,
    /// Reference to an already-uploaded image.
    #[serde(default)]
    pub image: Option<String>,
}

impl PostDraft {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            image: None,
        }
    }

    /// True when neither content nor image carries anything but whitespace.
    pub fn is_blank(&self) -> bool {
        let blank = |s: &Option<String>| s.as_deref().is_none_or(|v| v.trim().is_empty());
        blank(&self.content) && blank(&self.image)
    }
}

/// Canonical representation of a created post; this is what live
/// connections receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub thread_id: ThreadId,
    pub content: Option<String>,
    pub image: Option<String>,
    pub is_op: bool,
    pub created_at: DateTime<Utc>,
}
