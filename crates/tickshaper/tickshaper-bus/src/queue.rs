use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use tickshaper_events::Tick;

/// Most ticks the queue will hold before evicting.
pub const QUEUE_CAPACITY: usize = 100_000;

/// Bounded FIFO between the workers and the publisher thread.
///
/// `push` never blocks: at capacity the **oldest** tick is dropped first, so
/// the most recent tick always gets in. The publisher waits on the condvar
/// and drains in batches.
pub struct PublishQueue {
    inner: Mutex<Inner>,
    available: Condvar,
    published: AtomicU64,
    dropped: AtomicU64,
}

struct Inner {
    ticks: VecDeque<Tick>,
    closed: bool,
}

impl PublishQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                ticks: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueues one tick, evicting the oldest entry when full.
    pub fn push(&self, tick: Tick) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.ticks.len() >= QUEUE_CAPACITY {
                inner.ticks.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            inner.ticks.push_back(tick);
        }
        self.available.notify_one();
    }

    /// Blocks until ticks are available or the queue closes, then moves up
    /// to `max` ticks into `out`. Returns `false` once the queue is closed
    /// and fully drained.
    pub fn drain_into(&self, out: &mut Vec<Tick>, max: usize) -> bool {
        let mut inner = self.inner.lock().unwrap();
        while inner.ticks.is_empty() {
            if inner.closed {
                return false;
            }
            inner = self.available.wait(inner).unwrap();
        }
        let take = inner.ticks.len().min(max);
        out.extend(inner.ticks.drain(..take));
        true
    }

    /// Wakes the publisher for a final drain; `drain_into` reports `false`
    /// once the backlog is gone.
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
        self.available.notify_all();
    }

    /// Current depth, for the `queue_depth` gauge.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ticks the publisher has put on the wire.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_published(&self, count: u64) {
        self.published.fetch_add(count, Ordering::Relaxed);
    }

    /// Ticks evicted by the drop-oldest policy.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for PublishQueue {
    fn default() -> Self {
        Self::new()
    }
}
