use std::sync::Arc;
use std::time::Duration;
use threadcast_auth::{SigningKey, TokenIssuer};
use tokio_util::sync::CancellationToken;

use crate::AppState;
use crate::live::LiveContext;
use crate::metrics::ServerMetrics;
use crate::store::{MemoryPostStore, PostStore};

/// Live context over an in-memory store and a fixed signing key.
pub fn test_live_context() -> LiveContext {
    test_live_context_with_store(Arc::new(MemoryPostStore::new(2000)))
}

/// Like `test_live_context`, with a caller-supplied store (failure doubles).
pub fn test_live_context_with_store(store: Arc<dyn PostStore>) -> LiveContext {
    let tokens = TokenIssuer::new(SigningKey::from_bytes([0x11; 32]), Duration::from_secs(3600));
    LiveContext::new(store, tokens, Arc::new(ServerMetrics::new()), 32)
}

/// Fully wired `AppState` for handler tests.
pub fn test_app_state() -> AppState {
    AppState::new(test_live_context(), CancellationToken::new())
}
