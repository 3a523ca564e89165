use crate::metrics::Metrics;
use crate::sys::{pin_to_cpu, ResourceSampler};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tickshaper_book::{MessageProcessor, OrderBook, SymbolTable};
use tickshaper_bus::{BusError, BusPublisher, PublishQueue};
use tickshaper_config::Config;
use tickshaper_events::BurstEvent;
use tickshaper_feed::{Decoder, FeedError};
use tickshaper_icc::{RingError, TickRing};
use tickshaper_throttle::{BurstDetector, BurstSettings, TokenBucket};
use tracing::{debug, info, warn};

/// Base inter-record spacing at 1.0x replay, in microseconds.
const BASE_SPACING_US: f64 = 1_000.0;

/// Worker backoff when the decoder has nothing to give.
const IDLE_SLEEP: Duration = Duration::from_micros(100);

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Ring(#[from] RingError),

    /// Rejected control-plane change; the prior value stays in effect.
    #[error("invalid {what}: {value}")]
    ConfigInvalid { what: &'static str, value: String },
}

fn validate_replay_speed(speed: f64) -> Result<(), EngineError> {
    if speed > 0.0 && speed <= 100.0 {
        Ok(())
    } else {
        Err(EngineError::ConfigInvalid {
            what: "replay speed",
            value: speed.to_string(),
        })
    }
}

fn validate_throttle_rate(rate: u32) -> Result<(), EngineError> {
    if (1..=1_000_000).contains(&rate) {
        Ok(())
    } else {
        Err(EngineError::ConfigInvalid {
            what: "throttle rate",
            value: rate.to_string(),
        })
    }
}

/// Everything a worker thread touches per iteration.
#[derive(Clone)]
struct WorkerCtx {
    decoder: Arc<Decoder>,
    processor: Arc<MessageProcessor>,
    throttle: Arc<TokenBucket>,
    detector: Arc<BurstDetector>,
    queue: Arc<PublishQueue>,
    metrics: Arc<Metrics>,
    running: Arc<AtomicBool>,
    replay_speed_bits: Arc<AtomicU64>,
}

/// The pipeline runtime: owns every component, wires the workers through
/// them, and carries the control plane.
///
/// Ownership is strictly one-way: the engine owns components, components
/// receive non-owning handles (`Arc` clones) to the metrics aggregate and
/// the shared stages. Nothing holds a back-reference to the engine.
pub struct Engine {
    config: Config,
    decoder: Arc<Decoder>,
    book: Arc<OrderBook>,
    symbols: Arc<SymbolTable>,
    processor: Arc<MessageProcessor>,
    throttle: Arc<TokenBucket>,
    detector: Arc<BurstDetector>,
    queue: Arc<PublishQueue>,
    publisher: BusPublisher,
    /// Alternate hand-off surface for external consumers mapping the same
    /// shared-memory segment; the bus remains the primary transport.
    ring: Arc<TickRing>,
    metrics: Arc<Metrics>,
    running: Arc<AtomicBool>,
    replay_speed_bits: Arc<AtomicU64>,
    start_time: Arc<Mutex<Instant>>,
    workers: Vec<JoinHandle<()>>,
    metrics_thread: Option<JoinHandle<()>>,
}

impl Engine {
    /// Builds the full pipeline. Shared-memory or bus-bind failures are
    /// fatal; a missing capture file is not (the synthetic generator steps
    /// in).
    pub fn init(config: Config) -> Result<Self, EngineError> {
        validate_replay_speed(config.default_replay_speed)?;
        validate_throttle_rate(config.default_throttle_rate)?;

        let ring = Arc::new(TickRing::create(config.shared_memory_size)?);
        let queue = Arc::new(PublishQueue::new());
        let publisher = BusPublisher::bind(&config.zmq_endpoint, queue.clone())?;
        let decoder = Arc::new(Decoder::open_or_synthetic(
            &config.input_file,
            &config.symbols_file,
        )?);

        let book = Arc::new(OrderBook::new());
        let symbols = Arc::new(SymbolTable::new());
        let processor = Arc::new(MessageProcessor::new(book.clone(), symbols.clone()));
        let throttle = Arc::new(TokenBucket::new(config.default_throttle_rate));
        let detector = Arc::new(BurstDetector::new(BurstSettings {
            start_threshold: config.microburst_threshold,
            ..BurstSettings::default()
        }));

        info!(
            input_file = %config.input_file,
            endpoint = %config.zmq_endpoint,
            shared_memory_mb = config.shared_memory_size / (1024 * 1024),
            segment = ring.segment_name(),
            worker_threads = config.worker_threads,
            cpu_affinity = config.cpu_affinity,
            throttle_rate = config.default_throttle_rate,
            replay_speed = config.default_replay_speed,
            microburst_threshold = config.microburst_threshold,
            "engine initialized"
        );

        let replay_speed_bits = Arc::new(AtomicU64::new(config.default_replay_speed.to_bits()));

        Ok(Self {
            config,
            decoder,
            book,
            symbols,
            processor,
            throttle,
            detector,
            queue,
            publisher,
            ring,
            metrics: Arc::new(Metrics::new()),
            running: Arc::new(AtomicBool::new(false)),
            replay_speed_bits,
            start_time: Arc::new(Mutex::new(Instant::now())),
            workers: Vec::new(),
            metrics_thread: None,
        })
    }

    /// Spawns the worker pool and (when monitoring is enabled) the metrics
    /// thread. Idempotent while running.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.start_time.lock().unwrap() = Instant::now();

        let ctx = WorkerCtx {
            decoder: self.decoder.clone(),
            processor: self.processor.clone(),
            throttle: self.throttle.clone(),
            detector: self.detector.clone(),
            queue: self.queue.clone(),
            metrics: self.metrics.clone(),
            running: self.running.clone(),
            replay_speed_bits: self.replay_speed_bits.clone(),
        };

        for worker in 0..self.config.worker_threads.max(1) {
            let ctx = ctx.clone();
            let affinity = self.config.cpu_affinity;
            self.workers.push(std::thread::spawn(move || {
                if affinity {
                    if let Some(cpu) = pin_to_cpu(worker) {
                        debug!(worker, cpu, "worker pinned");
                    }
                }
                worker_loop(ctx);
            }));
        }

        if self.config.enable_monitoring {
            let metrics = self.metrics.clone();
            let queue = self.queue.clone();
            let running = self.running.clone();
            let start_time = self.start_time.clone();
            let interval = Duration::from_secs(self.config.monitoring_interval.max(1));
            self.metrics_thread = Some(std::thread::spawn(move || {
                metrics_loop(metrics, queue, running, start_time, interval);
            }));
        }

        info!(workers = self.workers.len(), "engine started");
    }

    /// Flips the running flag, joins every thread, and lets the publisher
    /// flush its backlog before tearing the pipeline down.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("stopping engine");

        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        if let Some(handle) = self.metrics_thread.take() {
            let _ = handle.join();
        }
        self.publisher.stop();

        let snap = self.metrics.snapshot();
        info!(
            messages_processed = snap.messages_processed,
            messages_throttled = snap.messages_throttled,
            uptime_seconds = self.start_time.lock().unwrap().elapsed().as_secs(),
            avg_latency_us = snap.avg_latency_us(),
            "final statistics"
        );
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Sets the replay multiplier, effective on each worker's next
    /// iteration. Valid range `(0, 100]`.
    pub fn set_replay_speed(&self, speed: f64) -> Result<(), EngineError> {
        validate_replay_speed(speed)?;
        self.replay_speed_bits
            .store(speed.to_bits(), Ordering::SeqCst);
        info!(speed, "replay speed set");
        Ok(())
    }

    pub fn replay_speed(&self) -> f64 {
        f64::from_bits(self.replay_speed_bits.load(Ordering::Relaxed))
    }

    /// Sets the outbound token rate. Valid range `[1, 1_000_000]`.
    pub fn set_throttle_rate(&self, rate: u32) -> Result<(), EngineError> {
        validate_throttle_rate(rate)?;
        self.throttle.set_rate(rate);
        info!(rate, "throttle rate set");
        Ok(())
    }

    pub fn throttle_rate(&self) -> u32 {
        self.throttle.rate()
    }

    /// Operator `reset`: clears the metrics aggregate and restarts the
    /// uptime clock.
    pub fn reset_counters(&self) {
        self.metrics.reset();
        *self.start_time.lock().unwrap() = Instant::now();
        info!("metrics counters reset");
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn recent_bursts(&self) -> Vec<BurstEvent> {
        self.detector.recent_events()
    }

    pub fn book(&self) -> &Arc<OrderBook> {
        &self.book
    }

    pub fn symbols(&self) -> &Arc<SymbolTable> {
        &self.symbols
    }

    pub fn processor(&self) -> &Arc<MessageProcessor> {
        &self.processor
    }

    /// Name of the shared-memory segment external consumers can map.
    pub fn ring_segment(&self) -> &str {
        self.ring.segment_name()
    }

    pub fn ring(&self) -> &Arc<TickRing> {
        &self.ring
    }

    /// Address the bus actually bound.
    pub fn bus_addr(&self) -> std::net::SocketAddr {
        self.publisher.local_addr()
    }

    pub fn subscriber_count(&self) -> usize {
        self.publisher.subscriber_count()
    }

    /// Decoder progress as `(position, rough_total)`.
    pub fn feed_progress(&self) -> (u64, u64) {
        (self.decoder.position(), self.decoder.total_estimate())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(ctx: WorkerCtx) {
    let mut last_iter = Instant::now();
    let mut processed: u64 = 0;

    while ctx.running.load(Ordering::Relaxed) {
        let record = match ctx.decoder.next() {
            Ok(record) => record,
            Err(FeedError::Corrupt { position }) => {
                warn!(position, "skipping corrupt record");
                continue;
            }
            Err(error) => {
                warn!(%error, "decode failed");
                std::thread::sleep(IDLE_SLEEP);
                continue;
            }
        };

        let started = Instant::now();

        // Replay pacing: hold each worker to the configured inter-record
        // spacing.
        let speed = f64::from_bits(ctx.replay_speed_bits.load(Ordering::Relaxed));
        let target_us = BASE_SPACING_US / speed;
        let elapsed_us = last_iter.elapsed().as_micros() as f64;
        if elapsed_us < target_us {
            std::thread::sleep(Duration::from_micros((target_us - elapsed_us) as u64));
        }
        last_iter = Instant::now();

        if !ctx.throttle.admit() {
            ctx.metrics.messages_throttled.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        match ctx.processor.process(&record) {
            Ok(tick) => {
                ctx.queue.push(tick);
                ctx.detector.observe();
                ctx.metrics
                    .microburst_active
                    .store(ctx.detector.is_active(), Ordering::Relaxed);

                let latency_ns = started.elapsed().as_nanos() as u64;
                ctx.metrics.messages_processed.fetch_add(1, Ordering::Relaxed);
                ctx.metrics
                    .total_latency_ns
                    .fetch_add(latency_ns, Ordering::Relaxed);
                processed += 1;
            }
            Err(error) => {
                // Malformed record: dropped, pipeline keeps going.
                debug!(%error, "record dropped");
            }
        }
    }

    debug!(processed, "worker exiting");
}

fn metrics_loop(
    metrics: Arc<Metrics>,
    queue: Arc<PublishQueue>,
    running: Arc<AtomicBool>,
    start_time: Arc<Mutex<Instant>>,
    interval: Duration,
) {
    let mut sampler = ResourceSampler::new();
    let mut last_count = metrics.messages_processed.load(Ordering::Relaxed);
    let mut last_sample = Instant::now();

    while running.load(Ordering::Relaxed) {
        // Sleep the interval in slices so shutdown is prompt.
        let deadline = Instant::now() + interval;
        while running.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(100)));
        }
        if !running.load(Ordering::Relaxed) {
            break;
        }

        let elapsed = last_sample.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            continue;
        }
        let processed = metrics.messages_processed.load(Ordering::Relaxed);
        let throughput = ((processed.saturating_sub(last_count)) as f64 / elapsed) as u32;
        metrics.current_throughput.store(throughput, Ordering::Relaxed);
        metrics
            .queue_depth
            .store(queue.len() as u32, Ordering::Relaxed);
        metrics.uptime_seconds.store(
            start_time.lock().unwrap().elapsed().as_secs(),
            Ordering::Relaxed,
        );
        if let Some((cpu, rss)) = sampler.sample() {
            metrics.set_cpu_usage(cpu);
            metrics.memory_usage_bytes.store(rss, Ordering::Relaxed);
        }

        last_count = processed;
        last_sample = Instant::now();
    }
}
