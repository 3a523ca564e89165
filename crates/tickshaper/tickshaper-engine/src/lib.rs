//! `tickshaper-engine`: the pipeline runtime.
//!
//! Wires decode → process → throttle → publish across a pool of worker
//! threads, paces replay against the configured clock multiplier, runs the
//! once-per-second metrics loop, and exposes the control operations the
//! operator console drives (`speed`, `throttle`, `reset`).

mod engine;
mod metrics;
mod sys;

pub use engine::{Engine, EngineError};
pub use metrics::{Metrics, MetricsSnapshot};
pub use sys::{pin_to_cpu, ResourceSampler};
