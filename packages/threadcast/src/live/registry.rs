//! Connection registry: thread id → connection id → handle.
//!
//! The outer map is a sharded [`DashMap`]; each thread's group is a plain
//! `HashMap` mutated only while its entry guard is held. Removing the last
//! connection of a thread and pruning the group therefore happen under one
//! guard, so a concurrent register for the same thread never lands in a
//! group that has already been dropped from the map.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashMap;
use tracing::debug;

use super::connection::{ConnectionHandle, ConnectionId};
use crate::models::ThreadId;

#[derive(Default)]
pub struct ConnectionRegistry {
    threads: DashMap<ThreadId, HashMap<ConnectionId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `connection_id` under `thread_id`, creating the
    /// thread group if needed.
    pub fn register(
        &self,
        thread_id: ThreadId,
        connection_id: ConnectionId,
        handle: ConnectionHandle,
    ) {
        let mut group = self.threads.entry(thread_id).or_default();
        let replaced = group.insert(connection_id.clone(), handle).is_some();
        debug!(
            thread_id = %thread_id,
            conn_id = %connection_id,
            replaced,
            peers = group.len(),
            "registered connection"
        );
    }

    /// Remove a connection. Returns whether it was present. The thread group
    /// is pruned when it becomes empty.
    pub fn unregister(&self, thread_id: ThreadId, connection_id: &ConnectionId) -> bool {
        match self.threads.entry(thread_id) {
            Entry::Occupied(mut group) => {
                let removed = group.get_mut().remove(connection_id).is_some();
                if group.get().is_empty() {
                    group.remove();
                    debug!(thread_id = %thread_id, "pruned empty thread group");
                }
                if removed {
                    debug!(thread_id = %thread_id, conn_id = %connection_id, "unregistered connection");
                }
                removed
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Point-in-time copy of every handle registered for `thread_id`.
    pub fn snapshot(&self, thread_id: ThreadId) -> Vec<ConnectionHandle> {
        self.threads
            .get(&thread_id)
            .map(|group| group.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Find one connection, for addressing a private reply.
    pub fn lookup(
        &self,
        thread_id: ThreadId,
        connection_id: &ConnectionId,
    ) -> Option<ConnectionHandle> {
        self.threads
            .get(&thread_id)
            .and_then(|group| group.get(connection_id).cloned())
    }

    /// Number of threads with at least one registered connection.
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Total registered connections across all threads.
    pub fn connection_count(&self) -> usize {
        self.threads.iter().map(|group| group.len()).sum()
    }

    pub fn contains_thread(&self, thread_id: ThreadId) -> bool {
        self.threads.contains_key(&thread_id)
    }
}
