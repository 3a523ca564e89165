use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Hard ceiling on the token balance.
const CAPACITY: f64 = 200_000.0;

/// Tokens spent per admitted message.
const TOKENS_PER_MESSAGE: f64 = 1.0;

/// Continuous token-bucket admission controller.
///
/// Tokens accrue at `rate` per second up to [`CAPACITY`]; each admitted
/// message spends one. The whole decision sits under a single mutex; the
/// operation is constant-time, so contention stays cheap even with every
/// worker hitting it.
pub struct TokenBucket {
    state: Mutex<State>,
    processed: AtomicU64,
    throttled: AtomicU64,
    epoch: Instant,
}

struct State {
    rate: u32,
    tokens: f64,
    last_credit_us: Option<u64>,
    /// Admissions inside the current one-second accounting window.
    window_count: u64,
    window_start_us: u64,
}

impl TokenBucket {
    /// Creates a bucket at `rate` tokens/second with an empty balance; the
    /// first second of admissions is paid for by accrual alone.
    pub fn new(rate: u32) -> Self {
        Self {
            state: Mutex::new(State {
                rate,
                tokens: 0.0,
                last_credit_us: None,
                window_count: 0,
                window_start_us: 0,
            }),
            processed: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    /// Admits or throttles one message against the live clock.
    pub fn admit(&self) -> bool {
        self.admit_at(self.epoch.elapsed().as_micros() as u64)
    }

    /// Admission decision at an explicit microsecond clock reading
    /// (monotonic, arbitrary epoch).
    pub fn admit_at(&self, now_us: u64) -> bool {
        let mut state = self.state.lock().unwrap();

        if let Some(last) = state.last_credit_us {
            let elapsed = now_us.saturating_sub(last);
            if elapsed > 0 {
                let credit = f64::from(state.rate) * elapsed as f64 / 1_000_000.0;
                state.tokens = (state.tokens + credit).min(CAPACITY);
            }
        }
        state.last_credit_us = Some(now_us);

        if state.tokens >= TOKENS_PER_MESSAGE {
            state.tokens -= TOKENS_PER_MESSAGE;
            state.window_count += 1;
            if now_us.saturating_sub(state.window_start_us) >= 1_000_000 {
                state.window_count = 0;
                state.window_start_us = now_us;
            }
            self.processed.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.throttled.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Replaces the rate and refills the balance to `min(rate, capacity)` so
    /// a rate increase takes effect immediately instead of stalling.
    pub fn set_rate(&self, rate: u32) {
        let mut state = self.state.lock().unwrap();
        state.rate = rate;
        state.tokens = f64::from(rate).min(CAPACITY);
    }

    pub fn rate(&self) -> u32 {
        self.state.lock().unwrap().rate
    }

    /// Total admissions since construction.
    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Total rejections since construction.
    pub fn throttled_count(&self) -> u64 {
        self.throttled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steady_state_tracks_configured_rate() {
        let bucket = TokenBucket::new(1_000);

        // 10,000 attempts spread uniformly over one second.
        let mut admitted = 0u64;
        for i in 0..10_000u64 {
            if bucket.admit_at(i * 100) {
                admitted += 1;
            }
        }

        assert!(
            (1_000..=1_200).contains(&admitted),
            "admitted {admitted} outside [1000, 1200]"
        );
        assert_eq!(bucket.throttled_count(), 10_000 - admitted);
        assert_eq!(bucket.processed_count(), admitted);
    }

    #[test]
    fn set_rate_refills_to_avoid_stall() {
        let bucket = TokenBucket::new(10);
        // Drain whatever trickles in.
        for i in 0..100u64 {
            bucket.admit_at(i);
        }
        bucket.set_rate(50_000);
        // Refilled balance admits immediately, no accrual wait.
        assert!(bucket.admit_at(101));
    }

    #[test]
    fn refill_caps_at_capacity() {
        let bucket = TokenBucket::new(1_000_000);
        bucket.set_rate(1_000_000);
        // A long idle period cannot bank more than CAPACITY tokens.
        assert!(bucket.admit_at(0));
        let mut admitted = 0u64;
        // Ten idle seconds, then a burst of attempts at one instant.
        for _ in 0..400_000u64 {
            if bucket.admit_at(10_000_000) {
                admitted += 1;
            }
        }
        assert!(admitted <= 200_000 + 1, "banked past capacity: {admitted}");
    }

    #[test]
    fn empty_bucket_throttles() {
        let bucket = TokenBucket::new(1_000);
        assert!(!bucket.admit_at(0), "no balance at construction");
        assert_eq!(bucket.throttled_count(), 1);
    }
}
