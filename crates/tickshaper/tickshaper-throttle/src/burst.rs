use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tickshaper_events::{BurstEvent, Severity};
use tracing::info;

/// The one-second window is split into 100 buckets of 10 ms.
const NUM_BUCKETS: usize = 100;
const BUCKET_SIZE_MS: u64 = 10;
const WINDOW_SIZE_MS: u64 = 1_000;

/// Closed bursts kept in history; older entries evict.
const MAX_EVENTS: usize = 100;

/// Detector thresholds; defaults match the production configuration.
#[derive(Debug, Clone, Copy)]
pub struct BurstSettings {
    /// Rate that opens a burst.
    pub start_threshold: u32,
    /// Rate below which a burst may close.
    pub end_threshold: u32,
    /// A burst shorter than this never emits an event.
    pub min_duration_ms: u64,
}

impl Default for BurstSettings {
    fn default() -> Self {
        Self {
            start_threshold: 50_000,
            end_threshold: 30_000,
            min_duration_ms: 100,
        }
    }
}

/// One 10 ms slice of the sliding window. The stamped epoch says which
/// 10 ms interval the count belongs to; a bucket whose epoch has rotated
/// out of the window contributes nothing.
struct Bucket {
    count: AtomicU32,
    epoch_ms: AtomicU64,
}

/// Sliding-window microburst detector.
///
/// Every admitted tick lands in a per-10 ms atomic bucket; at most once per
/// 10 ms the detector sums the buckets still inside the window and runs the
/// Quiet/Burst state machine. Only the event-history write takes a lock.
pub struct BurstDetector {
    settings: BurstSettings,
    buckets: Vec<Bucket>,
    current_rate: AtomicU32,
    active: AtomicBool,
    last_eval_ms: AtomicU64,
    state: Mutex<DetectorState>,
    epoch: Instant,
}

struct DetectorState {
    start_time_ms: u64,
    peak_rate: u32,
    approx_messages: u64,
    events: VecDeque<BurstEvent>,
}

impl BurstDetector {
    pub fn new(settings: BurstSettings) -> Self {
        let buckets = (0..NUM_BUCKETS)
            .map(|_| Bucket {
                count: AtomicU32::new(0),
                epoch_ms: AtomicU64::new(0),
            })
            .collect();
        Self {
            settings,
            buckets,
            current_rate: AtomicU32::new(0),
            active: AtomicBool::new(false),
            last_eval_ms: AtomicU64::new(0),
            state: Mutex::new(DetectorState {
                start_time_ms: 0,
                peak_rate: 0,
                approx_messages: 0,
                events: VecDeque::new(),
            }),
            epoch: Instant::now(),
        }
    }

    /// Feeds one admitted tick at the live clock.
    pub fn observe(&self) {
        self.observe_at(self.epoch.elapsed().as_millis() as u64);
    }

    /// Feeds one admitted tick at an explicit millisecond clock reading.
    pub fn observe_at(&self, now_ms: u64) {
        let slot = (now_ms / BUCKET_SIZE_MS) as usize % NUM_BUCKETS;
        let canonical = (now_ms / BUCKET_SIZE_MS) * BUCKET_SIZE_MS;
        let bucket = &self.buckets[slot];

        // Rotate the bucket onto the new 10 ms interval. Racy resets can
        // momentarily drop a handful of counts; the window is statistical.
        if bucket.epoch_ms.load(Ordering::Relaxed) != canonical {
            bucket.count.store(0, Ordering::Relaxed);
            bucket.epoch_ms.store(canonical, Ordering::Relaxed);
        }
        bucket.count.fetch_add(1, Ordering::Relaxed);

        // Evaluate at most every 10 ms.
        let last_eval = self.last_eval_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last_eval) >= BUCKET_SIZE_MS {
            self.last_eval_ms.store(now_ms, Ordering::Relaxed);
            let rate = self.window_rate(now_ms);
            self.current_rate.store(rate, Ordering::Relaxed);
            self.run_state_machine(rate, now_ms);
        }
    }

    /// Sums the counts of buckets whose epochs fall inside
    /// `[now - 1000 ms, now]`.
    fn window_rate(&self, now_ms: u64) -> u32 {
        let window_start = now_ms.saturating_sub(WINDOW_SIZE_MS);
        let mut total = 0u32;
        for bucket in &self.buckets {
            let epoch = bucket.epoch_ms.load(Ordering::Relaxed);
            if epoch >= window_start && epoch <= now_ms {
                total = total.saturating_add(bucket.count.load(Ordering::Relaxed));
            }
        }
        total
    }

    fn run_state_machine(&self, rate: u32, now_ms: u64) {
        let mut state = self.state.lock().unwrap();

        if !self.active.load(Ordering::Relaxed) {
            if rate > self.settings.start_threshold {
                state.start_time_ms = now_ms;
                state.peak_rate = rate;
                state.approx_messages = u64::from(rate);
                self.active.store(true, Ordering::Relaxed);
                info!(rate, "microburst detected");
            }
            return;
        }

        state.peak_rate = state.peak_rate.max(rate);
        // Coarse message estimate; good enough for the event record.
        state.approx_messages += u64::from(rate / 100);

        let duration = now_ms.saturating_sub(state.start_time_ms);
        if rate < self.settings.end_threshold && duration >= self.settings.min_duration_ms {
            let event = BurstEvent {
                start_time_ms: state.start_time_ms,
                end_time_ms: now_ms,
                peak_rate_msg_per_s: state.peak_rate,
                approx_total_messages: state.approx_messages,
                severity: Severity::from_peak_rate(state.peak_rate),
            };
            info!(
                duration_ms = duration,
                peak = event.peak_rate_msg_per_s,
                severity = event.severity.as_str(),
                "microburst ended"
            );
            if state.events.len() == MAX_EVENTS {
                state.events.pop_front();
            }
            state.events.push_back(event);
            self.active.store(false, Ordering::Relaxed);
        }
        // Below the end threshold but under min duration: stay in Burst
        // without emitting; a rate recovery simply keeps the burst open.
    }

    /// Most recent rate computed over the sliding window, in msg/s.
    pub fn current_rate(&self) -> u32 {
        self.current_rate.load(Ordering::Relaxed)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Snapshot of the bounded event history, oldest first.
    pub fn recent_events(&self) -> Vec<BurstEvent> {
        self.state.lock().unwrap().events.iter().cloned().collect()
    }
}
