//! Fan-out of one payload to every open connection of a thread.

use axum::extract::ws::Utf8Bytes;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::connection::SendError;
use super::registry::ConnectionRegistry;
use crate::metrics::ServerMetrics;
use crate::models::ThreadId;

/// Outcome of one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Handles in the snapshot.
    pub recipients: usize,
    pub delivered: usize,
    /// Handles not in the open state.
    pub skipped: usize,
    /// Open handles whose queue refused the frame.
    pub failed: usize,
}

pub struct BroadcastCoordinator {
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<ServerMetrics>,
}

impl BroadcastCoordinator {
    pub fn new(registry: Arc<ConnectionRegistry>, metrics: Arc<ServerMetrics>) -> Self {
        Self { registry, metrics }
    }

    /// Serialize `payload` once and queue it for every open connection
    /// registered under `thread_id` at the time of the call.
    pub fn publish<T: Serialize>(
        &self,
        thread_id: ThreadId,
        payload: &T,
    ) -> Result<PublishReport, serde_json::Error> {
        let text: Utf8Bytes = serde_json::to_string(payload)?.into();
        Ok(self.publish_text(thread_id, text))
    }

    /// Queue an already-serialized frame. Every recipient shares the same
    /// buffer.
    pub fn publish_text(&self, thread_id: ThreadId, text: Utf8Bytes) -> PublishReport {
        let recipients = self.registry.snapshot(thread_id);
        let mut report = PublishReport {
            recipients: recipients.len(),
            ..Default::default()
        };

        for handle in &recipients {
            if !handle.is_open() {
                report.skipped += 1;
                continue;
            }
            match handle.send(text.clone()) {
                Ok(()) => report.delivered += 1,
                // Raced with the session closing between the check and the send.
                Err(SendError::NotOpen) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        thread_id = %thread_id,
                        conn_id = %handle.id(),
                        error = %e,
                        "failed to queue broadcast for connection"
                    );
                }
            }
        }

        self.metrics.broadcast(
            report.delivered as u64,
            report.skipped as u64,
            report.failed as u64,
        );
        debug!(
            thread_id = %thread_id,
            recipients = report.recipients,
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            "broadcast published"
        );
        report
    }
}
