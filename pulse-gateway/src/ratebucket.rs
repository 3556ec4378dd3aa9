//! Token-bucket pacing of outbound frames (§4.C).
//!
//! `RateBucket` is driven entirely from the engine's single logical task:
//! `add` either runs the work inline or queues it, and `unlock`/`drain`
//! run the queue as tokens become available. There is no internal timer;
//! the engine's own select loop calls `drain` on a fixed cadence,
//! matching the cooperative single-task model in §5.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// A unit of deferred outbound work: the bytes to send plus the `direct`
/// flag no longer applies once something reaches the bucket (paced sends
/// are never direct), so this only needs to carry the encoded frame.
pub type Work = Box<dyn FnOnce() + Send>;

/// Token-bucket rate limiter with lock/unlock/clear semantics.
pub struct RateBucket {
    capacity: u32,
    window: Duration,
    tokens: u32,
    locked: bool,
    queue: VecDeque<Work>,
    window_started_at: Instant,
}

impl RateBucket {
    /// `capacity` tokens are restored every `window`.
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            tokens: capacity,
            locked: false,
            queue: VecDeque::new(),
            window_started_at: Instant::now(),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Refill the bucket if a full window has elapsed since the last
    /// refill. Call before `add`/`drain` to keep `tokens` current.
    fn refill(&mut self) {
        let elapsed = self.window_started_at.elapsed();
        if elapsed >= self.window {
            self.tokens = self.capacity;
            self.window_started_at = Instant::now();
        }
    }

    /// Submit work: run it immediately if tokens are available and the
    /// bucket is unlocked, otherwise queue it for a later drain.
    pub fn add(&mut self, work: Work) {
        self.refill();
        if !self.locked && self.tokens > 0 {
            self.tokens -= 1;
            work();
        } else {
            self.queue.push_back(work);
        }
    }

    /// Lock the bucket: every subsequent `add` queues regardless of token
    /// availability. Used while the transport is down or unidentified.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Unlock the bucket and drain as much of the queue as tokens allow.
    pub fn unlock(&mut self) {
        self.locked = false;
        self.drain();
    }

    /// Run queued work while tokens remain. Call on a refill tick too, so
    /// a long-locked connection catches up once unlocked.
    pub fn drain(&mut self) {
        self.refill();
        while !self.locked && self.tokens > 0 {
            match self.queue.pop_front() {
                Some(work) => {
                    self.tokens -= 1;
                    work();
                }
                None => break,
            }
        }
    }

    /// Discard all queued work without running it. Used on disconnect so
    /// stale sends never reach a dead transport.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

impl Default for RateBucket {
    /// Defaults from §6: 120 tokens per 60 000 ms.
    fn default() -> Self {
        Self::new(120, Duration::from_millis(60_000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn runs_immediately_while_tokens_remain() {
        let mut bucket = RateBucket::new(2, Duration::from_secs(60));
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        bucket.add(Box::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(bucket.queued_len(), 0);
    }

    #[test]
    fn queues_once_tokens_are_exhausted() {
        let mut bucket = RateBucket::new(1, Duration::from_secs(60));
        let ran = Arc::new(AtomicUsize::new(0));

        let r1 = ran.clone();
        bucket.add(Box::new(move || {
            r1.fetch_add(1, Ordering::SeqCst);
        }));
        let r2 = ran.clone();
        bucket.add(Box::new(move || {
            r2.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(bucket.queued_len(), 1);
    }

    #[test]
    fn locked_bucket_queues_even_with_tokens() {
        let mut bucket = RateBucket::new(5, Duration::from_secs(60));
        bucket.lock();
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        bucket.add(Box::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(bucket.queued_len(), 1);
    }

    #[test]
    fn unlock_drains_queue_subject_to_tokens() {
        let mut bucket = RateBucket::new(1, Duration::from_secs(60));
        bucket.lock();
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let r = ran.clone();
            bucket.add(Box::new(move || {
                r.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(bucket.queued_len(), 3);

        bucket.unlock();
        // Only one token available, so only one queued item runs.
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(bucket.queued_len(), 2);
    }

    #[test]
    fn clear_discards_queue_without_running_it() {
        let mut bucket = RateBucket::new(0, Duration::from_secs(60));
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        bucket.add(Box::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(bucket.queued_len(), 1);

        bucket.clear();
        assert_eq!(bucket.queued_len(), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
