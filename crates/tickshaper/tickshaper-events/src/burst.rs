/// Severity tiers for a closed microburst, derived from its peak rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Tier boundaries: > 200k msg/s is high, > 100k is medium.
    pub fn from_peak_rate(peak: u32) -> Self {
        if peak > 200_000 {
            Severity::High
        } else if peak > 100_000 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// Record of one detected microburst, written when the burst closes.
#[derive(Debug, Clone)]
pub struct BurstEvent {
    pub start_time_ms: u64,
    pub end_time_ms: u64,
    pub peak_rate_msg_per_s: u32,
    /// Coarse running estimate accumulated while the burst was live; only
    /// good enough for the event record, not an exact count.
    pub approx_total_messages: u64,
    pub severity: Severity,
}
