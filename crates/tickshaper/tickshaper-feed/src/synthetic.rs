use crate::symbols::SymbolSpec;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tickshaper_events::wire;
use tickshaper_events::RawRecord;

/// Base simulated inter-arrival interval; each record adds uniform jitter of
/// up to ten intervals on top.
const MESSAGE_INTERVAL_NS: u64 = 1_000_000;

const FIRST_ORDER_REF: u64 = 1_000_000;

/// Message types the generator cycles through. Every payload keeps the Add
/// Order shape regardless of the type byte, so offsets, endianness and sizes
/// match a genuine capture.
const MESSAGE_TYPES: [u8; 3] = [b'A', b'E', b'P'];

/// Fabricates Add-Order-shaped records when no capture file is present.
#[derive(Debug)]
pub struct Generator {
    rng: StdRng,
    symbols: Vec<SymbolSpec>,
    /// Simulated nanoseconds since session midnight.
    clock_ns: u64,
    next_order_ref: u64,
    position: u64,
}

impl Generator {
    pub fn new(symbols: Vec<SymbolSpec>) -> Self {
        debug_assert!(!symbols.is_empty());
        Self {
            rng: StdRng::from_entropy(),
            symbols,
            clock_ns: nanos_since_midnight(),
            next_order_ref: FIRST_ORDER_REF,
            position: 0,
        }
    }

    /// Fabricates the next record.
    pub fn next_record(&mut self) -> RawRecord {
        self.clock_ns +=
            MESSAGE_INTERVAL_NS + self.rng.gen_range(0..MESSAGE_INTERVAL_NS * 10);

        let spec = &self.symbols[self.rng.gen_range(0..self.symbols.len())];
        let shares = self.rng.gen_range(spec.min_size..=spec.max_size);
        let price = self.rng.gen_range(spec.min_price..=spec.max_price);
        let side = if self.rng.gen_bool(0.5) { b'B' } else { b'S' };

        let mut payload = vec![0u8; 36];
        wire::put_u16(&mut payload, 0, 1); // stock locate
        wire::put_u16(&mut payload, 2, (self.position & 0xFFFF) as u16);
        wire::put_u48(&mut payload, 4, self.clock_ns);
        wire::put_u64(&mut payload, 10, self.next_order_ref);
        payload[18] = side;
        wire::put_u32(&mut payload, 19, shares);
        payload[23..31].fill(b' ');
        let ticker = spec.ticker.as_bytes();
        payload[23..23 + ticker.len().min(8)].copy_from_slice(&ticker[..ticker.len().min(8)]);
        wire::put_u32(&mut payload, 31, price);

        self.next_order_ref += 1;
        self.position += 1;

        RawRecord {
            message_type: MESSAGE_TYPES[self.rng.gen_range(0..MESSAGE_TYPES.len())],
            timestamp_ns: self.clock_ns,
            payload,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn reset(&mut self) {
        self.clock_ns = 0;
        self.next_order_ref = FIRST_ORDER_REF;
        self.position = 0;
    }
}

fn nanos_since_midnight() -> u64 {
    let since_epoch = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    (since_epoch.as_nanos() % (86_400 * 1_000_000_000)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::default_symbols;
    use tickshaper_events::wire::{be_u32, be_u48, be_u64};

    #[test]
    fn payload_matches_add_order_layout() {
        let mut generator = Generator::new(default_symbols());
        let record = generator.next_record();

        assert_eq!(record.payload.len(), 36);
        assert!(MESSAGE_TYPES.contains(&record.message_type));
        // Timestamp on the wire equals the record's decoded timestamp.
        assert_eq!(be_u48(&record.payload, 4), Some(record.timestamp_ns));
        assert_eq!(be_u64(&record.payload, 10), Some(FIRST_ORDER_REF));
        assert!(record.payload[18] == b'B' || record.payload[18] == b'S');
        let shares = be_u32(&record.payload, 19).unwrap();
        assert!((100..=10_000).contains(&shares));
        let price = be_u32(&record.payload, 31).unwrap();
        assert!((1_000..=100_000).contains(&price));
        // Ticker is space-padded ASCII.
        assert!(record.payload[23..31]
            .iter()
            .all(|b| b.is_ascii_uppercase() || *b == b' '));
    }

    #[test]
    fn order_refs_and_clock_advance() {
        let mut generator = Generator::new(default_symbols());
        let first = generator.next_record();
        let second = generator.next_record();
        assert_eq!(
            be_u64(&second.payload, 10).unwrap(),
            be_u64(&first.payload, 10).unwrap() + 1
        );
        assert!(second.timestamp_ns > first.timestamp_ns);
        // Jitter is bounded: 1 ms base + at most 10 ms extra.
        let gap = second.timestamp_ns - first.timestamp_ns;
        assert!((1_000_000..=11_000_000).contains(&gap));
    }

    #[test]
    fn reset_rewinds_the_session() {
        let mut generator = Generator::new(default_symbols());
        generator.next_record();
        generator.next_record();
        generator.reset();
        assert_eq!(generator.position(), 0);
        let record = generator.next_record();
        assert_eq!(be_u64(&record.payload, 10), Some(FIRST_ORDER_REF));
    }
}
