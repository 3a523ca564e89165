//! Behavioral tests for the shared-memory tick ring.

use proptest::prelude::*;
use tickshaper_icc::{RingError, TickRing, MAX_MESSAGE_SIZE};

fn unique_name(tag: &str) -> String {
    format!("/tickshaper_icc_{tag}_{}", std::process::id())
}

/// Smallest segment the ring accepts: header line + one max-size record.
const MIN_SEGMENT: usize = 64 + 4 + MAX_MESSAGE_SIZE;

#[test]
fn write_then_read_round_trips() {
    let ring = TickRing::create_named(&unique_name("rt"), MIN_SEGMENT).unwrap();
    ring.write(b"hello").unwrap();
    ring.write(b"").unwrap();
    ring.write(&[7u8; 64]).unwrap();

    let mut buf = [0u8; MAX_MESSAGE_SIZE];
    assert_eq!(ring.read(&mut buf).unwrap(), 5);
    assert_eq!(&buf[..5], b"hello");
    assert_eq!(ring.read(&mut buf).unwrap(), 0);
    assert_eq!(ring.read(&mut buf).unwrap(), 64);
    assert!(buf[..64].iter().all(|&b| b == 7));
    assert!(matches!(ring.read(&mut buf), Err(RingError::Empty)));
}

#[test]
fn oversized_record_rejected() {
    let ring = TickRing::create_named(&unique_name("big"), MIN_SEGMENT).unwrap();
    let payload = vec![0u8; MAX_MESSAGE_SIZE + 1];
    assert!(matches!(
        ring.write(&payload),
        Err(RingError::TooLarge { size, .. }) if size == MAX_MESSAGE_SIZE + 1
    ));
}

#[test]
fn undersized_read_reports_need_without_consuming() {
    let ring = TickRing::create_named(&unique_name("peek"), MIN_SEGMENT).unwrap();
    ring.write(&[1u8; 100]).unwrap();

    let mut small = [0u8; 10];
    assert!(matches!(
        ring.read(&mut small),
        Err(RingError::Undersized { need: 100 })
    ));
    // Record still there for a properly sized buffer.
    let mut big = [0u8; 100];
    assert_eq!(ring.read(&mut big).unwrap(), 100);
}

#[test]
fn full_when_free_space_insufficient() {
    let ring = TickRing::create_named(&unique_name("full"), MIN_SEGMENT).unwrap();
    let capacity = ring.capacity();

    // Fill with max-size records until the ring refuses.
    let payload = [0u8; MAX_MESSAGE_SIZE];
    let mut written = 0usize;
    while ring.write(&payload).is_ok() {
        written += 1;
        assert!(written <= capacity / MAX_MESSAGE_SIZE + 1, "never refused");
    }
    assert!(written >= 1);
    assert!(ring.used() <= capacity);
}

#[test]
fn record_never_crosses_linear_end() {
    // Data region = 1028 bytes exactly (minimum segment).
    let ring = TickRing::create_named(&unique_name("wrap"), MIN_SEGMENT).unwrap();
    assert_eq!(ring.capacity(), 1028);

    // First record occupies [0, 1004); cursor parks at 1004.
    ring.write(&[1u8; 1000]).unwrap();
    let mut buf = [0u8; MAX_MESSAGE_SIZE];
    ring.read(&mut buf).unwrap();
    assert!(ring.is_empty());

    // Plenty of total free space, but 1004 + 1004 would cross the end.
    assert!(matches!(ring.write(&[2u8; 1000]), Err(RingError::Full)));

    // A record that fits the remaining linear stretch still goes through.
    ring.write(&[3u8; 20]).unwrap();
    assert_eq!(ring.read(&mut buf).unwrap(), 20);
    assert_eq!(&buf[..20], &[3u8; 20]);
}

#[test]
fn used_tracks_outstanding_bytes() {
    let ring = TickRing::create_named(&unique_name("fill"), MIN_SEGMENT).unwrap();
    assert_eq!(ring.used(), 0);
    ring.write(&[0u8; 16]).unwrap();
    assert_eq!(ring.used(), 20); // 4-byte prefix + payload
    let mut buf = [0u8; 16];
    ring.read(&mut buf).unwrap();
    assert_eq!(ring.used(), 0);
    assert_eq!(ring.free(), ring.capacity());
}

#[test]
fn attach_sees_producer_records() {
    let name = unique_name("attach");
    let producer = TickRing::create_named(&name, MIN_SEGMENT * 4).unwrap();
    producer.write(b"cross-handle").unwrap();

    let consumer = TickRing::attach(&name).unwrap();
    let mut buf = [0u8; 64];
    let n = consumer.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"cross-handle");
}

#[test]
fn attach_rejects_uninitialized_segment() {
    let name = unique_name("garbage");
    let _seg = tickshaper_mmap::ShmSegment::create_named(&name, MIN_SEGMENT).unwrap();
    assert!(matches!(
        TickRing::attach(&name),
        Err(RingError::Invalid(_))
    ));
}

proptest! {
    /// FIFO integrity: reads return exactly the accepted writes, in order,
    /// under an interleaving that obeys the return values. Writes the ring
    /// refuses (full / wrap) are retried once after draining one record and
    /// then dropped, matching the producer-decides contract.
    #[test]
    fn fifo_content_integrity(payloads in proptest::collection::vec(
        proptest::collection::vec(any::<u8>(), 0..128), 1..64
    )) {
        static SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let nonce = SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let name = format!("/tickshaper_icc_prop_{}_{nonce}", std::process::id());
        let ring = TickRing::create_named(&name, MIN_SEGMENT * 2).unwrap();

        let mut accepted: Vec<Vec<u8>> = Vec::new();
        let mut drained: Vec<Vec<u8>> = Vec::new();
        let mut buf = [0u8; MAX_MESSAGE_SIZE];

        for payload in &payloads {
            if ring.write(payload).is_ok() {
                accepted.push(payload.clone());
                continue;
            }
            // Free a slot, then retry once; a wrap refusal stays refused.
            if let Ok(n) = ring.read(&mut buf) {
                drained.push(buf[..n].to_vec());
            }
            if ring.write(payload).is_ok() {
                accepted.push(payload.clone());
            }
        }

        while let Ok(n) = ring.read(&mut buf) {
            drained.push(buf[..n].to_vec());
        }

        prop_assert_eq!(drained, accepted);
        prop_assert!(ring.is_empty());
    }
}
