//! `tickshaper-throttle`: outbound admission control.
//!
//! [`TokenBucket`] decides, per message, whether the configured outbound rate
//! allows it through; [`BurstDetector`] watches the admitted stream through a
//! one-second sliding window and records microbursts. Both take explicit
//! clock readings on their hot-path methods so the runtime passes real time
//! and tests drive time deterministically.

mod burst;
mod token_bucket;

pub use burst::{BurstDetector, BurstSettings};
pub use token_bucket::TokenBucket;
