//! Shared state for live sessions and private reply routing.

use std::sync::Arc;
use threadcast_auth::TokenIssuer;
use tracing::{debug, warn};

use super::broadcast::BroadcastCoordinator;
use super::connection::{ConnectionId, SendError};
use super::protocol::ErrorReply;
use super::registry::ConnectionRegistry;
use crate::metrics::ServerMetrics;
use crate::models::ThreadId;
use crate::store::PostStore;

/// Where a private reply ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivateDelivery {
    Delivered,
    /// The submission carried no token.
    MissingToken,
    /// The token was malformed, mis-signed, or expired.
    InvalidToken,
    /// The token named a connection not registered under this thread.
    NotRegistered,
    NotOpen,
    SendFailed,
}

/// Everything a live session needs, cloned into each connection task.
#[derive(Clone)]
pub struct LiveContext {
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: Arc<BroadcastCoordinator>,
    pub store: Arc<dyn PostStore>,
    pub tokens: Arc<TokenIssuer>,
    pub metrics: Arc<ServerMetrics>,
    /// Outbound queue depth per connection.
    pub send_channel_capacity: usize,
}

impl LiveContext {
    pub fn new(
        store: Arc<dyn PostStore>,
        tokens: TokenIssuer,
        metrics: Arc<ServerMetrics>,
        send_channel_capacity: usize,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(BroadcastCoordinator::new(registry.clone(), metrics.clone()));
        Self {
            registry,
            broadcaster,
            store,
            tokens: Arc::new(tokens),
            metrics,
            send_channel_capacity,
        }
    }

    /// Send `{ "message": ... }` to the connection named by `token`, if it is
    /// still registered under `thread_id` and open. Misses are dropped.
    pub fn reply_privately(
        &self,
        thread_id: ThreadId,
        token: Option<&str>,
        message: &str,
    ) -> PrivateDelivery {
        let delivery = self.route_private(thread_id, token, message);
        if delivery == PrivateDelivery::Delivered {
            self.metrics.private_error_sent();
        } else {
            self.metrics.addressing_miss();
            debug!(thread_id = %thread_id, ?delivery, "dropped private reply");
        }
        delivery
    }

    fn route_private(
        &self,
        thread_id: ThreadId,
        token: Option<&str>,
        message: &str,
    ) -> PrivateDelivery {
        let Some(token) = token else {
            return PrivateDelivery::MissingToken;
        };
        let Some(connection_id) = self.tokens.verify(token) else {
            return PrivateDelivery::InvalidToken;
        };
        let connection_id = ConnectionId::from(connection_id);
        let Some(handle) = self.registry.lookup(thread_id, &connection_id) else {
            return PrivateDelivery::NotRegistered;
        };
        if !handle.is_open() {
            return PrivateDelivery::NotOpen;
        }

        let text = match serde_json::to_string(&ErrorReply::new(message)) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "failed to encode error reply");
                return PrivateDelivery::SendFailed;
            }
        };
        match handle.send(text.into()) {
            Ok(()) => PrivateDelivery::Delivered,
            Err(SendError::NotOpen) => PrivateDelivery::NotOpen,
            Err(e) => {
                warn!(conn_id = %connection_id, error = %e, "failed to queue error reply");
                PrivateDelivery::SendFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::connection::SendState;
    use crate::live::connection::test_support::handle_with_outbox;
    use crate::test_helpers::test_live_context;

    #[test]
    fn reply_reaches_only_the_named_connection() {
        let ctx = test_live_context();
        let (a, mut oa) = handle_with_outbox("a", 7);
        let (b, mut ob) = handle_with_outbox("b", 7);
        ctx.registry.register(ThreadId(7), a.id().clone(), a);
        ctx.registry.register(ThreadId(7), b.id().clone(), b);

        let token = ctx.tokens.mint("a").unwrap();
        let delivery = ctx.reply_privately(ThreadId(7), Some(&token), "Post was empty");

        assert_eq!(delivery, PrivateDelivery::Delivered);
        assert_eq!(oa.drain(), vec![r#"{"message":"Post was empty"}"#.to_string()]);
        assert!(ob.drain().is_empty());
        assert_eq!(ctx.metrics.snapshot().replies.private_errors, 1);
    }

    #[test]
    fn missing_and_invalid_tokens_are_dropped() {
        let ctx = test_live_context();
        assert_eq!(
            ctx.reply_privately(ThreadId(7), None, "x"),
            PrivateDelivery::MissingToken
        );
        assert_eq!(
            ctx.reply_privately(ThreadId(7), Some("garbage"), "x"),
            PrivateDelivery::InvalidToken
        );
        assert_eq!(ctx.metrics.snapshot().replies.addressing_misses, 2);
    }

    #[test]
    fn token_for_departed_connection_is_dropped() {
        let ctx = test_live_context();
        let token = ctx.tokens.mint("gone").unwrap();
        assert_eq!(
            ctx.reply_privately(ThreadId(7), Some(&token), "x"),
            PrivateDelivery::NotRegistered
        );
    }

    #[test]
    fn token_is_scoped_to_the_thread() {
        let ctx = test_live_context();
        let (a, mut oa) = handle_with_outbox("a", 7);
        ctx.registry.register(ThreadId(7), a.id().clone(), a);
        let token = ctx.tokens.mint("a").unwrap();

        assert_eq!(
            ctx.reply_privately(ThreadId(8), Some(&token), "x"),
            PrivateDelivery::NotRegistered
        );
        assert!(oa.drain().is_empty());
    }

    #[test]
    fn closing_target_is_not_sent_to() {
        let ctx = test_live_context();
        let (a, oa) = handle_with_outbox("a", 7);
        ctx.registry.register(ThreadId(7), a.id().clone(), a);
        oa.state.set(SendState::Closing);
        let token = ctx.tokens.mint("a").unwrap();

        assert_eq!(
            ctx.reply_privately(ThreadId(7), Some(&token), "x"),
            PrivateDelivery::NotOpen
        );
    }

    #[test]
    fn token_from_another_issuer_is_invalid() {
        let ctx = test_live_context();
        let (a, _oa) = handle_with_outbox("a", 7);
        ctx.registry.register(ThreadId(7), a.id().clone(), a);
        let foreign = threadcast_auth::TokenIssuer::new(
            threadcast_auth::SigningKey::from_bytes([0xee; 32]),
            std::time::Duration::from_secs(60),
        );
        let token = foreign.mint("a").unwrap();

        assert_eq!(
            ctx.reply_privately(ThreadId(7), Some(&token), "x"),
            PrivateDelivery::InvalidToken
        );
    }
}
