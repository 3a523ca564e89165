//! Bounded byte ring over a shared-memory segment.
//!
//! One producer-side mutex and one consumer-side mutex serialize writes and
//! reads independently; the monotonic indices are atomic so fill level can be
//! observed without taking either lock. Records are `[u32 len][payload]`,
//! length little-endian, and never wrap across the linear end of the data
//! region: a write that would cross it fails and the producer retries or
//! drops (no defragmentation, no skip markers).

use crate::shm_layout::{RingHeader, DATA_OFFSET, LEN_PREFIX, MAX_MESSAGE_SIZE, RING_MAGIC};
use std::ptr;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use tickshaper_mmap::{ShmError, ShmSegment};

#[derive(Debug, thiserror::Error)]
pub enum RingError {
    #[error("record of {size} bytes exceeds the {max}-byte record limit")]
    TooLarge { size: usize, max: usize },

    /// Not enough free space, or the record would cross the linear end of
    /// the buffer.
    #[error("ring full")]
    Full,

    #[error("ring empty")]
    Empty,

    /// Caller's buffer is smaller than the next record; nothing is consumed.
    #[error("read buffer too small, need {need} bytes")]
    Undersized { need: usize },

    #[error("segment too small: {size} bytes cannot hold header and one record")]
    SegmentTooSmall { size: usize },

    #[error("invalid ring segment: {0}")]
    Invalid(&'static str),

    #[error(transparent)]
    Shm(#[from] ShmError),
}

/// Producer/consumer handle over a shared tick ring.
pub struct TickRing {
    /// Keeps the mapping (and, for the creator, the segment name) alive.
    seg: ShmSegment,
    base: *mut u8,
    data_len: u64,
    write_lock: Mutex<()>,
    read_lock: Mutex<()>,
}

// SAFETY: all access to the mapped region goes through the producer/consumer
// mutexes; the indices in the header are atomics.
unsafe impl Send for TickRing {}
unsafe impl Sync for TickRing {}

impl TickRing {
    /// Creates a ring in a fresh `/tickshaper_shm_<nonce>` segment of
    /// `segment_size` total bytes (header included).
    pub fn create(segment_size: usize) -> Result<Self, RingError> {
        Self::init(ShmSegment::create(segment_size)?)
    }

    /// Creates a ring in a segment with an explicit name.
    pub fn create_named(name: &str, segment_size: usize) -> Result<Self, RingError> {
        Self::init(ShmSegment::create_named(name, segment_size)?)
    }

    fn init(mut seg: ShmSegment) -> Result<Self, RingError> {
        let total = seg.len();
        if total < DATA_OFFSET + LEN_PREFIX + MAX_MESSAGE_SIZE {
            return Err(RingError::SegmentTooSmall { size: total });
        }
        let data_len = (total - DATA_OFFSET) as u64;
        let base = seg.as_mut_ptr();

        // SAFETY: the segment was just created and sized; nothing else maps
        // it until `ready` flips.
        unsafe {
            let header = base as *mut RingHeader;
            ptr::write(header, RingHeader::new(data_len));
            (*header).ready.store(1, Ordering::Release);
        }

        Ok(Self {
            seg,
            base,
            data_len,
            write_lock: Mutex::new(()),
            read_lock: Mutex::new(()),
        })
    }

    /// Attaches to a ring another process created, validating the header.
    pub fn attach(name: &str) -> Result<Self, RingError> {
        let mut seg = ShmSegment::open(name)?;
        let total = seg.len();
        let base = seg.as_mut_ptr();

        // SAFETY: validate() checks magic and ready before the ring is used.
        let header = unsafe { &*(base as *const RingHeader) };
        header.validate(total).map_err(RingError::Invalid)?;
        debug_assert_eq!(header.magic, RING_MAGIC);

        let data_len = header.buffer_size;
        Ok(Self {
            seg,
            base,
            data_len,
            write_lock: Mutex::new(()),
            read_lock: Mutex::new(()),
        })
    }

    /// Name of the backing segment, for handing to external consumers.
    pub fn segment_name(&self) -> &str {
        self.seg.name()
    }

    pub fn capacity(&self) -> usize {
        self.data_len as usize
    }

    #[inline]
    fn header(&self) -> &RingHeader {
        // SAFETY: base points at the header initialized in init()/attach().
        unsafe { &*(self.base as *const RingHeader) }
    }

    #[inline]
    fn data(&self, pos: u64) -> *mut u8 {
        // SAFETY: callers mask pos into [0, data_len).
        unsafe { self.base.add(DATA_OFFSET + pos as usize) }
    }

    /// Bytes currently in the ring. Lock-free; may be momentarily stale.
    pub fn used(&self) -> usize {
        let header = self.header();
        let w = header.write_index.load(Ordering::Acquire);
        let r = header.read_index.load(Ordering::Acquire);
        w.saturating_sub(r) as usize
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.used()
    }

    pub fn is_empty(&self) -> bool {
        self.used() == 0
    }

    /// Appends one record. Fails with [`RingError::Full`] when free space is
    /// insufficient or the record would cross the linear end of the region;
    /// the indices are untouched on failure.
    pub fn write(&self, payload: &[u8]) -> Result<(), RingError> {
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(RingError::TooLarge {
                size: payload.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let _guard = self.write_lock.lock().unwrap();
        let header = self.header();
        let total = (LEN_PREFIX + payload.len()) as u64;

        let w = header.write_index.load(Ordering::Acquire);
        let r = header.read_index.load(Ordering::Acquire);
        if self.data_len - (w - r) < total {
            return Err(RingError::Full);
        }

        let pos = w % self.data_len;
        if pos + total > self.data_len {
            // Would wrap within the record.
            return Err(RingError::Full);
        }

        let len_bytes = (payload.len() as u32).to_le_bytes();
        // SAFETY: [pos, pos + total) is within the data region (checked
        // above) and the producer lock excludes concurrent writers.
        unsafe {
            ptr::copy_nonoverlapping(len_bytes.as_ptr(), self.data(pos), LEN_PREFIX);
            ptr::copy_nonoverlapping(
                payload.as_ptr(),
                self.data(pos + LEN_PREFIX as u64),
                payload.len(),
            );
        }
        // Publish only after the payload is fully copied.
        header.write_index.store(w + total, Ordering::Release);
        Ok(())
    }

    /// Pops the next record into `buf`, returning its length. When `buf` is
    /// smaller than the record, fails with the required size and consumes
    /// nothing.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, RingError> {
        let _guard = self.read_lock.lock().unwrap();
        let header = self.header();

        let r = header.read_index.load(Ordering::Acquire);
        let w = header.write_index.load(Ordering::Acquire);
        if r == w {
            return Err(RingError::Empty);
        }

        let pos = r % self.data_len;
        let mut len_bytes = [0u8; LEN_PREFIX];
        // SAFETY: a published record starts at pos; the consumer lock
        // excludes concurrent readers.
        unsafe {
            ptr::copy_nonoverlapping(self.data(pos), len_bytes.as_mut_ptr(), LEN_PREFIX);
        }
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len > buf.len() {
            return Err(RingError::Undersized { need: len });
        }

        // SAFETY: the writer never splits a record across the end, so the
        // payload is linear at pos + LEN_PREFIX.
        unsafe {
            ptr::copy_nonoverlapping(self.data(pos + LEN_PREFIX as u64), buf.as_mut_ptr(), len);
        }
        header
            .read_index
            .store(r + (LEN_PREFIX + len) as u64, Ordering::Release);
        Ok(len)
    }
}
