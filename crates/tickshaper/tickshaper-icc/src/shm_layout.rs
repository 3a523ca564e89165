//! Shared-memory layout of the tick ring.
//!
//! The segment starts with a one-cache-line header followed by the data
//! region at the next cache-line boundary, so the header never shares a line
//! with record bytes:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ magic │ buffer_size │ max_msg │ write_idx │ read_idx │ ready │  (64 B)
//! ├──────────────────────────────────────────────────────────────┤
//! │ [u32 len][payload...] [u32 len][payload...] ...              │
//! │                    (buffer_size bytes)                       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! `write_index` / `read_index` are monotonic byte counters; the byte
//! position of either cursor is the counter modulo `buffer_size`. A record is
//! never split across the linear end of the data region.

use std::mem::size_of;
use std::sync::atomic::AtomicU64;

/// ASCII "TICKRING"; identifies a segment that actually holds a tick ring.
pub const RING_MAGIC: u64 = 0x5449_434B_5249_4E47;

/// Largest payload a single record may carry.
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// Bytes of length prefix in front of every record.
pub const LEN_PREFIX: usize = size_of::<u32>();

pub const CACHE_LINE: usize = 64;

/// Offset of the data region: the next cache-line boundary past the header.
pub const DATA_OFFSET: usize = size_of::<RingHeader>().next_multiple_of(CACHE_LINE);

/// Header at offset 0 of the segment.
///
/// `#[repr(C)]` keeps field order stable for external consumers mapping the
/// same segment. Padded so the whole header occupies exactly one cache line.
#[repr(C)]
pub struct RingHeader {
    pub magic: u64,
    /// Length of the data region in bytes.
    pub buffer_size: u64,
    pub max_message_size: u64,
    /// Monotonic count of bytes ever written (prefix included).
    pub write_index: AtomicU64,
    /// Monotonic count of bytes ever consumed.
    pub read_index: AtomicU64,
    /// Nonzero once the creating side finished initialization.
    pub ready: AtomicU64,
    _pad: [u8; 16],
}

impl RingHeader {
    pub fn new(buffer_size: u64) -> Self {
        Self {
            magic: RING_MAGIC,
            buffer_size,
            max_message_size: MAX_MESSAGE_SIZE as u64,
            write_index: AtomicU64::new(0),
            read_index: AtomicU64::new(0),
            ready: AtomicU64::new(0),
            _pad: [0; 16],
        }
    }

    /// Checks an attached segment before first use.
    pub fn validate(&self, mapped_len: usize) -> Result<(), &'static str> {
        if self.magic != RING_MAGIC {
            return Err("bad magic");
        }
        if self.ready.load(std::sync::atomic::Ordering::Acquire) == 0 {
            return Err("ring not initialized");
        }
        if self.buffer_size as usize + DATA_OFFSET > mapped_len {
            return Err("buffer size exceeds mapping");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fits_one_cache_line() {
        assert_eq!(size_of::<RingHeader>(), CACHE_LINE, "header layout changed");
        assert_eq!(DATA_OFFSET, CACHE_LINE);
    }
}
