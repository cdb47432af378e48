//! Observability and Metrics
//!
//! This module provides metrics collection for monitoring engine health:
//! session churn, upgrades, liveness failures, and packet traffic.
//!
//! Uses atomic counters for thread-safe metrics collection. Each `Server`
//! owns its own collector so isolated engine instances never share counts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Metrics collector for engine operations
#[derive(Debug)]
pub struct Metrics {
    /// Total sessions opened
    pub sessions_opened: AtomicU64,
    /// Total sessions closed
    pub sessions_closed: AtomicU64,
    /// Currently open sessions
    pub sessions_active: AtomicU64,
    /// Upgrades completed (polling -> socket)
    pub upgrades_completed: AtomicU64,
    /// Upgrade attempts abandoned or rejected
    pub upgrades_abandoned: AtomicU64,
    /// Sessions closed by ping timeout
    pub ping_timeouts: AtomicU64,
    /// Transport packets received
    pub packets_received: AtomicU64,
    /// Transport packets sent
    pub packets_sent: AtomicU64,
    /// Payload bytes received
    pub bytes_received: AtomicU64,
    /// Payload bytes sent
    pub bytes_sent: AtomicU64,
    /// Sessions terminated by decode errors
    pub decode_errors: AtomicU64,
    /// Requests rejected before reaching a session
    pub rejected_requests: AtomicU64,
    /// Successful namespace connections
    pub namespace_connects: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            sessions_opened: AtomicU64::new(0),
            sessions_closed: AtomicU64::new(0),
            sessions_active: AtomicU64::new(0),
            upgrades_completed: AtomicU64::new(0),
            upgrades_abandoned: AtomicU64::new(0),
            ping_timeouts: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            rejected_requests: AtomicU64::new(0),
            namespace_connects: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a new session
    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session teardown
    pub fn session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn upgrade_completed(&self) {
        self.upgrades_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn upgrade_abandoned(&self) {
        self.upgrades_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ping_timeout(&self) {
        self.ping_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an inbound packet
    pub fn packet_received(&self, byte_count: u64) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record an outbound packet
    pub fn packet_sent(&self, byte_count: u64) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_rejected(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn namespace_connected(&self) {
        self.namespace_connects.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            upgrades_completed: self.upgrades_completed.load(Ordering::Relaxed),
            upgrades_abandoned: self.upgrades_abandoned.load(Ordering::Relaxed),
            ping_timeouts: self.ping_timeouts.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            namespace_connects: self.namespace_connects.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            sessions_opened = snapshot.sessions_opened,
            sessions_closed = snapshot.sessions_closed,
            sessions_active = snapshot.sessions_active,
            upgrades_completed = snapshot.upgrades_completed,
            upgrades_abandoned = snapshot.upgrades_abandoned,
            ping_timeouts = snapshot.ping_timeouts,
            packets_received = snapshot.packets_received,
            packets_sent = snapshot.packets_sent,
            bytes_received = snapshot.bytes_received,
            bytes_sent = snapshot.bytes_sent,
            decode_errors = snapshot.decode_errors,
            rejected_requests = snapshot.rejected_requests,
            namespace_connects = snapshot.namespace_connects,
            uptime_seconds = snapshot.uptime_seconds,
            "Engine metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub sessions_active: u64,
    pub upgrades_completed: u64,
    pub upgrades_abandoned: u64,
    pub ping_timeouts: u64,
    pub packets_received: u64,
    pub packets_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub decode_errors: u64,
    pub rejected_requests: u64,
    pub namespace_connects: u64,
    pub uptime_seconds: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
