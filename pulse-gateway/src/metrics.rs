//! Observable metrics for one engine instance.
//!
//! Outside the spec's stated scope (logging/config/CLI are explicitly
//! external collaborators, §1) but grounded in the ambient tooling the
//! teacher repo ships alongside its protocol code — plain atomics, no
//! external metrics backend wired in.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters and gauges for one gateway engine.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub events_received: AtomicU64,
    pub events_dispatched: AtomicU64,
    pub ws_messages_received: AtomicU64,
    pub bytes_received: AtomicU64,
    pub heartbeats_sent: AtomicU64,
    pub heartbeats_acked: AtomicU64,
    pub reconnections: AtomicU64,
    pub session_resumes: AtomicU64,
    pub identifies_sent: AtomicU64,
    last_heartbeat_latency: RwLock<Duration>,
    connected_at: RwLock<Option<Instant>>,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_events_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_events_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_ws_messages(&self) {
        self.ws_messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_received(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn inc_heartbeats_sent(&self) {
        self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_heartbeats_acked(&self) {
        self.heartbeats_acked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reconnections(&self) {
        self.reconnections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_session_resumes(&self) {
        self.session_resumes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_identifies(&self) {
        self.identifies_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_heartbeat_latency(&self, latency: Duration) {
        *self.last_heartbeat_latency.write() = latency;
    }

    pub fn heartbeat_latency(&self) -> Duration {
        *self.last_heartbeat_latency.read()
    }

    pub fn mark_connected(&self) {
        *self.connected_at.write() = Some(Instant::now());
    }

    pub fn mark_disconnected(&self) {
        *self.connected_at.write() = None;
    }

    pub fn uptime(&self) -> Option<Duration> {
        self.connected_at.read().map(|t| t.elapsed())
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            ws_messages_received: self.ws_messages_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
            heartbeats_acked: self.heartbeats_acked.load(Ordering::Relaxed),
            reconnections: self.reconnections.load(Ordering::Relaxed),
            session_resumes: self.session_resumes.load(Ordering::Relaxed),
            identifies_sent: self.identifies_sent.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`EngineMetrics`]' counters.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub events_received: u64,
    pub events_dispatched: u64,
    pub ws_messages_received: u64,
    pub bytes_received: u64,
    pub heartbeats_sent: u64,
    pub heartbeats_acked: u64,
    pub reconnections: u64,
    pub session_resumes: u64,
    pub identifies_sent: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = EngineMetrics::new();
        metrics.inc_events_received();
        metrics.inc_events_received();
        metrics.add_bytes_received(1024);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.events_received, 2);
        assert_eq!(snapshot.bytes_received, 1024);
    }

    #[test]
    fn tracks_connection_uptime_and_latency() {
        let metrics = EngineMetrics::new();
        metrics.mark_connected();
        metrics.record_heartbeat_latency(Duration::from_millis(50));

        assert!(metrics.uptime().is_some());
        assert_eq!(metrics.heartbeat_latency(), Duration::from_millis(50));

        metrics.mark_disconnected();
        assert!(metrics.uptime().is_none());
    }
}
