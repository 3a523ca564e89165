//! `tickshaper-icc`: shared-memory hand-off surface for raw tick bytes.
//!
//! A bounded byte ring placed in a POSIX shared-memory segment, usable as an
//! alternate transport between the engine and an external consumer that maps
//! the same segment:
//!
//! ```text
//! ┌──────────┐        /tickshaper_shm_NNNN        ┌───────────────────┐
//! │ producer │ ───────────────────────────────────│ external consumer │
//! └──────────┘          (mapped segment)          └───────────────────┘
//! ```
//!
//! See `shm_layout` for the on-segment binary format.

mod ring;
mod shm_layout;

pub use ring::{RingError, TickRing};
pub use shm_layout::{DATA_OFFSET, MAX_MESSAGE_SIZE, RING_MAGIC};
