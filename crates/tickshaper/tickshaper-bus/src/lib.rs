//! `tickshaper-bus`: best-effort tick publication.
//!
//! Workers hand admitted ticks to the bounded [`PublishQueue`]; a dedicated
//! publisher thread drains it in batches, serializes each tick as one JSON
//! frame, and fans the frame out to every connected subscriber. Delivery is
//! best-effort end to end: the queue drops its oldest entry when full, and a
//! subscriber that cannot keep up loses frames rather than slowing the
//! pipeline.

mod publisher;
mod queue;

pub use publisher::{BusError, BusPublisher};
pub use queue::{PublishQueue, QUEUE_CAPACITY};
