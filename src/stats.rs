use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Point-in-time snapshot of relay counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayStats {
    /// Total number of connections accepted
    pub total_connections: u64,
    /// Currently active connections
    pub active_connections: u64,
    /// Total bytes copied client -> destination
    pub bytes_sent: u64,
    /// Total bytes copied destination -> client
    pub bytes_received: u64,
    /// Connections rejected by the block list
    pub blocked_connections: u64,
    /// Timestamp when the tracker was created (Unix timestamp)
    pub start_time: u64,
}

/// Shared counters updated by the relay pumps
///
/// Cloning shares the underlying counters.
#[derive(Debug, Clone)]
pub struct RelayStatsTracker {
    total_connections: Arc<AtomicU64>,
    active_connections: Arc<AtomicU64>,
    bytes_sent: Arc<AtomicU64>,
    bytes_received: Arc<AtomicU64>,
    blocked_connections: Arc<AtomicU64>,
    start_time: u64,
}

impl RelayStatsTracker {
    pub fn new() -> Self {
        Self {
            total_connections: Arc::new(AtomicU64::new(0)),
            active_connections: Arc::new(AtomicU64::new(0)),
            bytes_sent: Arc::new(AtomicU64::new(0)),
            bytes_received: Arc::new(AtomicU64::new(0)),
            blocked_connections: Arc::new(AtomicU64::new(0)),
            start_time: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }

    /// Called when a connection is accepted
    pub fn connection_started(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Called when a connection handler finishes
    pub fn connection_ended(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Called when a connection is rejected by the block list
    pub fn connection_blocked(&self) {
        self.blocked_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Add bytes copied client -> destination
    pub fn add_bytes_sent(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Add bytes copied destination -> client
    pub fn add_bytes_received(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Take a snapshot of the counters
    pub fn snapshot(&self) -> RelayStats {
        RelayStats {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            blocked_connections: self.blocked_connections.load(Ordering::Relaxed),
            start_time: self.start_time,
        }
    }
}

impl Default for RelayStatsTracker {
    fn default() -> Self {
        Self::new()
    }
}
