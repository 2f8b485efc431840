//! Live thread distribution
//!
//! Every WebSocket connected to a thread:
//! - Is announced its correlation token as the first frame
//! - Receives every post created in that thread, including its own
//! - Receives failure replies only for submissions that named its token

mod broadcast;
mod connection;
mod context;
mod protocol;
mod registry;
mod session;

#[cfg(test)]
mod e2e_tests;

pub use broadcast::{BroadcastCoordinator, PublishReport};
pub use connection::{ConnectionHandle, ConnectionId, SendError, SendState};
#[cfg(test)]
pub(crate) use connection::test_support;
pub use context::{LiveContext, PrivateDelivery};
pub use protocol::{ErrorReply, GENERIC_ERROR_MESSAGE, InboundMessage, TokenAnnouncement};
pub use registry::ConnectionRegistry;
pub use session::{ConnectionSession, SessionError, SessionState, SubmissionOutcome, run};
