//! Per-connection session: announce, receive submissions, publish or reply
//! privately, tear down.
//!
//! ```text
//! upgrade ────open()──▶ Open ──receive loop──▶ Closing ──▶ Closed
//!                         ▲   │                  (unregister, close frame)
//!                         └───┘ one submission
//! ```
//!
//! The socket is split: the receive half stays in the session task, the send
//! half belongs to a writer task that drains the connection's outbox. Anything
//! that wants to reach this connection (broadcasts, private replies, the
//! session itself) goes through the [`ConnectionHandle`].

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use futures::FutureExt;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::panic::AssertUnwindSafe;
use threadcast_auth::TokenError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::broadcast::PublishReport;
use super::connection::{ConnectionHandle, ConnectionId, Outbox, SendError, SendState, SendStateCell};
use super::context::{LiveContext, PrivateDelivery};
use super::protocol::{GENERIC_ERROR_MESSAGE, InboundMessage, TokenAnnouncement};
use crate::models::ThreadId;
use crate::store::PostError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closing,
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to mint correlation token: {0}")]
    Token(#[from] TokenError),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to queue announcement: {0}")]
    Send(#[from] SendError),
}

/// Result of processing one text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// The post was created and broadcast to the thread.
    Published(PublishReport),
    /// Creation failed; `message` was routed privately.
    Rejected {
        message: String,
        delivery: PrivateDelivery,
    },
    /// The frame was not a valid submission and was ignored.
    Malformed,
}

pub struct ConnectionSession {
    ctx: LiveContext,
    thread_id: ThreadId,
    connection_id: ConnectionId,
    handle: ConnectionHandle,
    send_state: SendStateCell,
    state: SessionState,
}

impl ConnectionSession {
    /// Upgrade → Open. Queues the token announcement and registers the
    /// connection. The announcement is queued before registration so that no
    /// broadcast can overtake it.
    pub(crate) fn open(ctx: LiveContext, thread_id: ThreadId) -> Result<(Self, Outbox), SessionError> {
        let connection_id = ConnectionId::generate();
        let (handle, outbox) =
            ConnectionHandle::new(connection_id.clone(), thread_id, ctx.send_channel_capacity);

        let token = ctx.tokens.mint(connection_id.as_str())?;
        let announcement = serde_json::to_string(&TokenAnnouncement { guid: token })?;
        handle.send(announcement.into())?;

        ctx.registry
            .register(thread_id, connection_id.clone(), handle.clone());
        ctx.metrics.connection_opened();
        info!(thread_id = %thread_id, conn_id = %connection_id, "live connection opened");

        let send_state = outbox.state.clone();
        let session = Self {
            ctx,
            thread_id,
            connection_id,
            handle,
            send_state,
            state: SessionState::Open,
        };
        Ok((session, outbox))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Process one text frame: create the post and broadcast it, or route the
    /// failure to the connection named by the frame's own token.
    pub async fn handle_text(&self, text: &str) -> SubmissionOutcome {
        let inbound: InboundMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                self.ctx.metrics.frame_rejected();
                debug!(conn_id = %self.connection_id, error = %e, "ignoring malformed frame");
                return SubmissionOutcome::Malformed;
            }
        };

        let created = AssertUnwindSafe(self.ctx.store.create(self.thread_id, inbound.draft()))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(PostError::Unexpected(anyhow::anyhow!("post store panicked"))));

        let message = match created {
            Ok(post) => match self.ctx.broadcaster.publish(self.thread_id, &post) {
                Ok(report) => return SubmissionOutcome::Published(report),
                Err(e) => {
                    error!(post_id = post.id, error = %e, "failed to encode post for broadcast");
                    GENERIC_ERROR_MESSAGE.to_string()
                }
            },
            Err(PostError::ValidationFailed(message)) => {
                debug!(conn_id = %self.connection_id, %message, "submission rejected");
                message
            }
            Err(PostError::Unexpected(e)) => {
                warn!(conn_id = %self.connection_id, error = %e, "post creation failed");
                GENERIC_ERROR_MESSAGE.to_string()
            }
        };

        let delivery = self
            .ctx
            .reply_privately(self.thread_id, inbound.guid.as_deref(), &message);
        SubmissionOutcome::Rejected { message, delivery }
    }

    /// Open → Closing. The connection stops accepting frames and leaves the
    /// registry before the writer is told to close the socket.
    pub(crate) fn begin_close(&mut self) {
        if self.state != SessionState::Open {
            return;
        }
        self.state = SessionState::Closing;
        if self.send_state.get() == SendState::Open {
            self.send_state.set(SendState::Closing);
        }
        self.ctx
            .registry
            .unregister(self.thread_id, &self.connection_id);
    }

    /// Closing → Closed.
    pub(crate) fn finish_close(&mut self) {
        if self.state != SessionState::Closing {
            return;
        }
        self.state = SessionState::Closed;
        self.send_state.set(SendState::Closed);
        self.ctx.metrics.connection_closed();
        info!(thread_id = %self.thread_id, conn_id = %self.connection_id, "live connection closed");
    }

    async fn receive_loop(
        &self,
        stream: &mut SplitStream<WebSocket>,
        cancel: &CancellationToken,
    ) {
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(conn_id = %self.connection_id, "session cancelled");
                    break;
                }
                frame = stream.next() => frame,
            };

            match frame {
                None => break,
                Some(Err(e)) => {
                    debug!(conn_id = %self.connection_id, error = %e, "receive failed");
                    break;
                }
                Some(Ok(Message::Close(_))) => break,
                Some(Ok(Message::Text(text))) if !text.as_str().trim().is_empty() => {
                    self.ctx.metrics.frame_received();
                    self.handle_text(text.as_str()).await;
                }
                Some(Ok(Message::Binary(_))) => {
                    self.ctx.metrics.frame_rejected();
                    debug!(conn_id = %self.connection_id, "binary frame rejected");
                }
                // Empty text, ping and pong: nothing to process.
                Some(Ok(_)) => {}
            }

            if !self.handle.is_open() {
                debug!(conn_id = %self.connection_id, "send side no longer open");
                break;
            }
        }
    }
}

/// Run a live session on an upgraded socket until the peer leaves or
/// `cancel` fires.
pub async fn run(socket: WebSocket, ctx: LiveContext, thread_id: ThreadId, cancel: CancellationToken) {
    let (sink, mut stream) = socket.split();
    let metrics = ctx.metrics.clone();

    let (mut session, outbox) = match ConnectionSession::open(ctx, thread_id) {
        Ok(opened) => opened,
        Err(e) => {
            error!(thread_id = %thread_id, error = %e, "failed to open live session");
            return;
        }
    };

    let writer_stop = CancellationToken::new();
    let writer = tokio::spawn(run_writer(sink, outbox, writer_stop.clone(), metrics));

    session.receive_loop(&mut stream, &cancel).await;

    session.begin_close();
    writer_stop.cancel();
    if let Err(e) = writer.await {
        warn!(conn_id = %session.connection_id, error = %e, "writer task failed");
    }
    session.finish_close();
}

/// Drain the outbox into the socket. On stop, flush what is already queued
/// and send a normal-closure close frame.
async fn run_writer(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbox: Outbox,
    stop: CancellationToken,
    metrics: std::sync::Arc<crate::metrics::ServerMetrics>,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            next = outbox.rx.recv() => next,
        };
        let Some(text) = next else { break };
        if let Err(e) = sink.send(Message::Text(text)).await {
            debug!(error = %e, "socket write failed");
            outbox.state.set(SendState::Closed);
            return;
        }
        metrics.frame_sent();
    }

    while let Ok(text) = outbox.rx.try_recv() {
        if sink.send(Message::Text(text)).await.is_err() {
            outbox.state.set(SendState::Closed);
            return;
        }
        metrics.frame_sent();
    }

    let close = CloseFrame {
        code: close_code::NORMAL,
        reason: Utf8Bytes::from_static("Closing"),
    };
    if let Err(e) = sink.send(Message::Close(Some(close))).await {
        debug!(error = %e, "close handshake failed");
    }
    outbox.state.set(SendState::Closed);
}
