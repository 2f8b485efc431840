//! Process-wide counters for live connections, broadcasts and private
//! replies, served as JSON by `/metrics` and summarized by `/health`.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Default)]
pub struct ServerMetrics {
    /// Currently open live connections
    pub active_connections: AtomicU64,
    /// Connections accepted since start
    pub total_connections: AtomicU64,

    /// Text frames received from clients
    pub frames_received: AtomicU64,
    /// Frames rejected before processing (binary, malformed JSON)
    pub frames_rejected: AtomicU64,
    /// Frames written to client sockets
    pub frames_sent: AtomicU64,

    /// Publish calls
    pub broadcasts: AtomicU64,
    /// Copies handed to recipients
    pub deliveries: AtomicU64,
    /// Recipients skipped because they were not open
    pub skipped_recipients: AtomicU64,
    /// Per-recipient send failures (full or closed outbox)
    pub failed_sends: AtomicU64,

    /// Error replies delivered to the submitting connection
    pub private_errors: AtomicU64,
    /// Error replies dropped because the target could not be resolved
    pub addressing_misses: AtomicU64,

    start_time: Option<Instant>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn broadcast(&self, delivered: u64, skipped: u64, failed: u64) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.deliveries.fetch_add(delivered, Ordering::Relaxed);
        self.skipped_recipients.fetch_add(skipped, Ordering::Relaxed);
        self.failed_sends.fetch_add(failed, Ordering::Relaxed);
    }

    pub fn private_error_sent(&self) {
        self.private_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn addressing_miss(&self) {
        self.addressing_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
            },
            frames: FrameMetrics {
                received: self.frames_received.load(Ordering::Relaxed),
                rejected: self.frames_rejected.load(Ordering::Relaxed),
                sent: self.frames_sent.load(Ordering::Relaxed),
            },
            broadcasts: BroadcastMetrics {
                published: self.broadcasts.load(Ordering::Relaxed),
                delivered: self.deliveries.load(Ordering::Relaxed),
                skipped: self.skipped_recipients.load(Ordering::Relaxed),
                failed: self.failed_sends.load(Ordering::Relaxed),
            },
            replies: ReplyMetrics {
                private_errors: self.private_errors.load(Ordering::Relaxed),
                addressing_misses: self.addressing_misses.load(Ordering::Relaxed),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub frames: FrameMetrics,
    pub broadcasts: BroadcastMetrics,
    pub replies: ReplyMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMetrics {
    pub received: u64,
    pub rejected: u64,
    pub sent: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastMetrics {
    pub published: u64,
    pub delivered: u64,
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyMetrics {
    pub private_errors: u64,
    pub addressing_misses: u64,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub threads: u64,
    pub connections: u64,
    pub uptime_secs: u64,
}
