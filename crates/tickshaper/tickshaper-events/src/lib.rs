//! `tickshaper-events`: value types shared across the pipeline.
//!
//! Every stage of the engine speaks in terms of these types: the decoder
//! emits [`RawRecord`]s, the processor turns them into [`Tick`]s, and the
//! burst detector records closed bursts as [`BurstEvent`]s. Keeping them in
//! one leaf crate lets the feed, book, throttle, bus and engine crates depend
//! on the data model without depending on each other.

pub mod burst;
pub mod tick;
pub mod wire;

pub use burst::{BurstEvent, Severity};
pub use tick::{RawRecord, Side, Tick};
