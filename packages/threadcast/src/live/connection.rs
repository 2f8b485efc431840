//! Live connection handles.
//!
//! A [`ConnectionHandle`] is the registry's view of a connection: it can send
//! a text frame and report whether the connection is still open, nothing
//! more. The socket itself stays with the session that accepted it; frames
//! travel through a bounded channel to that session's writer task.

use axum::extract::ws::Utf8Bytes;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::mpsc;

use crate::models::ThreadId;

/// Process-unique id assigned at accept time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SendState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl SendState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SendState::Open,
            1 => SendState::Closing,
            _ => SendState::Closed,
        }
    }
}

/// Shared send-state, written by the owning session and its writer task.
#[derive(Debug, Clone)]
pub(crate) struct SendStateCell(Arc<AtomicU8>);

impl SendStateCell {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(SendState::Open as u8)))
    }

    pub(crate) fn get(&self) -> SendState {
        SendState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: SendState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("connection is not open")]
    NotOpen,
    #[error("outbound queue is full")]
    Full,
    #[error("outbound queue is closed")]
    Closed,
}

/// Non-owning handle to one live connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    thread_id: ThreadId,
    tx: mpsc::Sender<Utf8Bytes>,
    state: SendStateCell,
}

/// The owning end of a connection's outbound queue.
pub(crate) struct Outbox {
    pub(crate) rx: mpsc::Receiver<Utf8Bytes>,
    pub(crate) state: SendStateCell,
}

impl ConnectionHandle {
    /// Create a handle and the outbox its frames are delivered to.
    pub(crate) fn new(id: ConnectionId, thread_id: ThreadId, capacity: usize) -> (Self, Outbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let state = SendStateCell::new();
        let handle = Self {
            id,
            thread_id,
            tx,
            state: state.clone(),
        };
        (handle, Outbox { rx, state })
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn state(&self) -> SendState {
        self.state.get()
    }

    pub fn is_open(&self) -> bool {
        self.state() == SendState::Open
    }

    /// Queue a text frame without waiting.
    pub fn send(&self, text: Utf8Bytes) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::NotOpen);
        }
        self.tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("thread_id", &self.thread_id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A registered-looking connection whose frames can be read back directly.
    pub(crate) fn handle_with_outbox(id: &str, thread: i64) -> (ConnectionHandle, Outbox) {
        ConnectionHandle::new(ConnectionId::from(id), ThreadId(thread), 32)
    }

    impl Outbox {
        pub(crate) fn drain(&mut self) -> Vec<String> {
            let mut frames = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                frames.push(frame.as_str().to_string());
            }
            frames
        }
    }
}
