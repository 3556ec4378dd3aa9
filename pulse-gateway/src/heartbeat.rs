//! Heartbeat Controller (§4.D): periodic liveness probe with ack tracking.
//!
//! State is driven entirely by HELLO/heartbeat-ack/timer events on the
//! engine's own task, so a single `RwLock` (rather than atomics per field)
//! is enough — there is never concurrent access, just a convenient `Sync`
//! container so the controller can live alongside the rest of engine state.

use parking_lot::RwLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Inner {
    ack: bool,
    last_ack: Option<Instant>,
    last_sent: Option<Instant>,
    interval_ms: Option<u64>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            ack: false,
            last_ack: None,
            last_sent: None,
            interval_ms: None,
        }
    }
}

/// Tracks heartbeat ack state for one connection.
///
/// A fresh controller starts with `ack=false` and no timestamps or
/// interval (§3); `on_hello` is what actually arms it.
#[derive(Debug, Default)]
pub struct HeartbeatController {
    inner: RwLock<Inner>,
}

impl HeartbeatController {
    pub fn new() -> Self {
        Self::default()
    }

    /// HELLO supplies the interval and implicitly acks the connection so
    /// the first scheduled tick doesn't immediately look like a timeout.
    pub fn on_hello(&self, interval: Duration) {
        let mut inner = self.inner.write();
        inner.ack = true;
        inner.last_ack = Some(Instant::now());
        inner.interval_ms = Some(interval.as_millis() as u64);
    }

    pub fn interval(&self) -> Option<Duration> {
        self.inner.read().interval_ms.map(Duration::from_millis)
    }

    /// Call right before sending a heartbeat frame.
    pub fn mark_sent(&self) {
        let mut inner = self.inner.write();
        inner.ack = false;
        inner.last_sent = Some(Instant::now());
    }

    /// Call on HEARTBEAT_ACK.
    pub fn mark_acked(&self) {
        let mut inner = self.inner.write();
        inner.ack = true;
        inner.last_ack = Some(Instant::now());
    }

    /// Whether the most recent heartbeat has been acked. `false` at the
    /// start of a timer tick means the prior heartbeat went unanswered —
    /// the caller must force a reconnect.
    pub fn is_acked(&self) -> bool {
        self.inner.read().ack
    }

    /// Round-trip time of the most recent acked heartbeat, if any.
    pub fn latency(&self) -> Option<Duration> {
        let inner = self.inner.read();
        match (inner.last_sent, inner.last_ack) {
            (Some(sent), Some(ack)) if ack >= sent => Some(ack.duration_since(sent)),
            _ => None,
        }
    }

    /// Clear all state on disconnect (§4.D step 5); the timer itself is
    /// stopped by the caller.
    pub fn clear(&self) {
        *self.inner.write() = Inner::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unacked_with_no_interval() {
        let hb = HeartbeatController::new();
        assert!(!hb.is_acked());
        assert!(hb.interval().is_none());
    }

    #[test]
    fn hello_arms_the_controller() {
        let hb = HeartbeatController::new();
        hb.on_hello(Duration::from_millis(41250));
        assert!(hb.is_acked());
        assert_eq!(hb.interval(), Some(Duration::from_millis(41250)));
    }

    #[test]
    fn send_then_ack_cycle() {
        let hb = HeartbeatController::new();
        hb.on_hello(Duration::from_millis(1000));
        hb.mark_sent();
        assert!(!hb.is_acked());
        hb.mark_acked();
        assert!(hb.is_acked());
    }

    #[test]
    fn clear_resets_to_initial_state() {
        let hb = HeartbeatController::new();
        hb.on_hello(Duration::from_millis(1000));
        hb.mark_sent();
        hb.clear();
        assert!(!hb.is_acked());
        assert!(hb.interval().is_none());
    }
}
