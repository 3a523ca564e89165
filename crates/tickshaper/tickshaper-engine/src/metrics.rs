use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Process-wide pipeline metrics.
///
/// One aggregate of atomics owned by the engine and referenced by whoever
/// needs it; readers take a [`snapshot`](Metrics::snapshot) without locking.
/// Counters are monotonic (until an operator reset); the rest are gauges the
/// metrics thread refreshes once per interval.
#[derive(Debug, Default)]
pub struct Metrics {
    pub messages_processed: AtomicU64,
    pub messages_throttled: AtomicU64,
    pub total_latency_ns: AtomicU64,
    pub current_throughput: AtomicU32,
    pub queue_depth: AtomicU32,
    pub microburst_active: AtomicBool,
    /// f64 percentage stored as bits; see [`Metrics::set_cpu_usage`].
    cpu_usage_bits: AtomicU64,
    pub memory_usage_bytes: AtomicU64,
    pub uptime_seconds: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cpu_usage(&self, percent: f64) {
        self.cpu_usage_bits
            .store(percent.to_bits(), Ordering::Relaxed);
    }

    pub fn cpu_usage_percent(&self) -> f64 {
        f64::from_bits(self.cpu_usage_bits.load(Ordering::Relaxed))
    }

    /// Copies every field with relaxed loads; cheap and lock-free.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            messages_throttled: self.messages_throttled.load(Ordering::Relaxed),
            total_latency_ns: self.total_latency_ns.load(Ordering::Relaxed),
            current_throughput: self.current_throughput.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            microburst_active: self.microburst_active.load(Ordering::Relaxed),
            cpu_usage_percent: self.cpu_usage_percent(),
            memory_usage_bytes: self.memory_usage_bytes.load(Ordering::Relaxed),
            uptime_seconds: self.uptime_seconds.load(Ordering::Relaxed),
        }
    }

    /// Operator `reset`: clears counters and gauges alike.
    pub fn reset(&self) {
        self.messages_processed.store(0, Ordering::Relaxed);
        self.messages_throttled.store(0, Ordering::Relaxed);
        self.total_latency_ns.store(0, Ordering::Relaxed);
        self.current_throughput.store(0, Ordering::Relaxed);
        self.queue_depth.store(0, Ordering::Relaxed);
        self.microburst_active.store(false, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub messages_processed: u64,
    pub messages_throttled: u64,
    pub total_latency_ns: u64,
    pub current_throughput: u32,
    pub queue_depth: u32,
    pub microburst_active: bool,
    pub cpu_usage_percent: f64,
    pub memory_usage_bytes: u64,
    pub uptime_seconds: u64,
}

impl MetricsSnapshot {
    /// Mean per-message pipeline latency, in microseconds.
    pub fn avg_latency_us(&self) -> f64 {
        if self.messages_processed == 0 {
            return 0.0;
        }
        self.total_latency_ns as f64 / self.messages_processed as f64 / 1_000.0
    }
}
