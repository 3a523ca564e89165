use crate::book::{OrderBook, OrderEntry};
use crate::symbols::SymbolTable;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tickshaper_events::wire::{be_u32, be_u64};
use tickshaper_events::{RawRecord, Side, Tick};

#[derive(Debug, thiserror::Error)]
pub enum BookError {
    /// Payload shorter than the per-type minimum. The record is dropped;
    /// the pipeline continues.
    #[error("malformed record type 0x{message_type:02x}: {len} bytes, need {need}")]
    MalformedRecord {
        message_type: u8,
        len: usize,
        need: usize,
    },
}

/// Per-type accepted counts, for observability.
#[derive(Debug, Default)]
pub struct ProcessorCounters {
    pub add: AtomicU64,
    pub exec: AtomicU64,
    pub trade: AtomicU64,
    pub cancel: AtomicU64,
}

impl ProcessorCounters {
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.add.load(Ordering::Relaxed),
            self.exec.load(Ordering::Relaxed),
            self.trade.load(Ordering::Relaxed),
            self.cancel.load(Ordering::Relaxed),
        )
    }
}

// Payload offsets (relative to the byte after the message type).
const OFF_ORDER_REF: usize = 10;
const OFF_SIDE: usize = 18;
const OFF_SHARES: usize = 19;
const OFF_TICKER: usize = 23;
const OFF_PRICE: usize = 31;
const OFF_EXEC_SHARES: usize = 18;
const OFF_CANCEL_SHARES: usize = 18;

const MIN_ADD: usize = 36;
const MIN_EXEC: usize = 30;
const MIN_TRADE: usize = 43;
const MIN_CANCEL: usize = 22;
const MIN_DELETE: usize = 18;

/// Interprets decoded records against the order book and symbol table.
///
/// Message kinds outside the interpreted set pass through as typed-only
/// ticks; executions and cancels of references the book has never seen
/// degrade to `symbol_id = 0` ticks rather than failing.
pub struct MessageProcessor {
    book: Arc<OrderBook>,
    symbols: Arc<SymbolTable>,
    counters: ProcessorCounters,
}

impl MessageProcessor {
    pub fn new(book: Arc<OrderBook>, symbols: Arc<SymbolTable>) -> Self {
        Self {
            book,
            symbols,
            counters: ProcessorCounters::default(),
        }
    }

    pub fn counters(&self) -> &ProcessorCounters {
        &self.counters
    }

    /// Produces the normalized tick for one record.
    pub fn process(&self, record: &RawRecord) -> Result<Tick, BookError> {
        match record.message_type {
            b'A' | b'F' => self.on_add(record),
            b'E' => self.on_execute(record),
            b'P' | b'Q' => self.on_trade(record),
            b'X' => self.on_cancel(record),
            b'D' => self.on_delete(record),
            _ => Ok(Tick::passthrough(record.timestamp_ns, record.message_type)),
        }
    }

    fn on_add(&self, record: &RawRecord) -> Result<Tick, BookError> {
        let payload = require(record, MIN_ADD)?;
        let order_ref = read_u64(record, payload, OFF_ORDER_REF)?;
        let side = Side::from_indicator(payload[OFF_SIDE]);
        let shares = read_u32(record, payload, OFF_SHARES)?;
        let ticker = trimmed_ticker(&payload[OFF_TICKER..OFF_TICKER + 8]);
        let price = to_cents(read_u32(record, payload, OFF_PRICE)?);

        let symbol_id = self.symbols.intern(ticker);
        self.book.insert(
            order_ref,
            OrderEntry {
                price,
                size: shares,
                side,
                timestamp_ns: record.timestamp_ns,
                symbol_id,
            },
        );
        self.counters.add.fetch_add(1, Ordering::Relaxed);

        Ok(Tick {
            timestamp_ns: record.timestamp_ns,
            symbol_id,
            price,
            size: shares,
            side,
            message_type: record.message_type,
        })
    }

    fn on_execute(&self, record: &RawRecord) -> Result<Tick, BookError> {
        let payload = require(record, MIN_EXEC)?;
        let order_ref = read_u64(record, payload, OFF_ORDER_REF)?;
        let executed = read_u32(record, payload, OFF_EXEC_SHARES)?;
        let _match_number = read_u64(record, payload, 22)?;

        self.counters.exec.fetch_add(1, Ordering::Relaxed);
        Ok(match self.book.decrement(order_ref, executed) {
            Some(entry) => Tick {
                timestamp_ns: record.timestamp_ns,
                symbol_id: entry.symbol_id,
                price: entry.price,
                size: executed,
                side: entry.side,
                message_type: record.message_type,
            },
            None => degraded(record, executed),
        })
    }

    fn on_trade(&self, record: &RawRecord) -> Result<Tick, BookError> {
        let payload = require(record, MIN_TRADE)?;
        let _order_ref = read_u64(record, payload, OFF_ORDER_REF)?;
        let side = Side::from_indicator(payload[OFF_SIDE]);
        let shares = read_u32(record, payload, OFF_SHARES)?;
        let ticker = trimmed_ticker(&payload[OFF_TICKER..OFF_TICKER + 8]);
        let price = to_cents(read_u32(record, payload, OFF_PRICE)?);
        let _match_number = read_u64(record, payload, 35)?;

        // Trades report an execution that already happened off this book;
        // no book action.
        let symbol_id = self.symbols.intern(ticker);
        self.counters.trade.fetch_add(1, Ordering::Relaxed);

        Ok(Tick {
            timestamp_ns: record.timestamp_ns,
            symbol_id,
            price,
            size: shares,
            side,
            message_type: record.message_type,
        })
    }

    fn on_cancel(&self, record: &RawRecord) -> Result<Tick, BookError> {
        let payload = require(record, MIN_CANCEL)?;
        let order_ref = read_u64(record, payload, OFF_ORDER_REF)?;
        let cancelled = read_u32(record, payload, OFF_CANCEL_SHARES)?;

        self.counters.cancel.fetch_add(1, Ordering::Relaxed);
        Ok(match self.book.decrement(order_ref, cancelled) {
            Some(entry) => Tick {
                timestamp_ns: record.timestamp_ns,
                symbol_id: entry.symbol_id,
                price: entry.price,
                size: cancelled,
                side: entry.side,
                message_type: record.message_type,
            },
            None => degraded(record, cancelled),
        })
    }

    fn on_delete(&self, record: &RawRecord) -> Result<Tick, BookError> {
        let payload = require(record, MIN_DELETE)?;
        let order_ref = read_u64(record, payload, OFF_ORDER_REF)?;

        self.counters.cancel.fetch_add(1, Ordering::Relaxed);
        Ok(match self.book.erase(order_ref) {
            // The delete tick reports what was still resting.
            Some(entry) => Tick {
                timestamp_ns: record.timestamp_ns,
                symbol_id: entry.symbol_id,
                price: entry.price,
                size: entry.size,
                side: entry.side,
                message_type: record.message_type,
            },
            None => degraded(record, 0),
        })
    }
}

/// Tick for an execute/cancel whose reference the book never saw: unknown
/// symbol and side, zero price, count from the record where it carries one.
/// This is a success, not an error.
fn degraded(record: &RawRecord, size: u32) -> Tick {
    Tick {
        timestamp_ns: record.timestamp_ns,
        symbol_id: 0,
        price: 0,
        size,
        side: Side::Unknown,
        message_type: record.message_type,
    }
}

fn require(record: &RawRecord, need: usize) -> Result<&[u8], BookError> {
    if record.payload.len() < need {
        return Err(BookError::MalformedRecord {
            message_type: record.message_type,
            len: record.payload.len(),
            need,
        });
    }
    Ok(&record.payload)
}

fn read_u32(record: &RawRecord, payload: &[u8], offset: usize) -> Result<u32, BookError> {
    be_u32(payload, offset).ok_or(BookError::MalformedRecord {
        message_type: record.message_type,
        len: payload.len(),
        need: offset + 4,
    })
}

fn read_u64(record: &RawRecord, payload: &[u8], offset: usize) -> Result<u64, BookError> {
    be_u64(payload, offset).ok_or(BookError::MalformedRecord {
        message_type: record.message_type,
        len: payload.len(),
        need: offset + 8,
    })
}

/// ITCH prices are 1/10000 of a dollar; ticks carry cents.
fn to_cents(itch_price: u32) -> u64 {
    u64::from(itch_price) / 100
}

/// Right-trims the ASCII space padding off the 8-byte ticker field.
fn trimmed_ticker(raw: &[u8]) -> &str {
    std::str::from_utf8(raw)
        .unwrap_or("")
        .trim_end_matches(' ')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickshaper_events::wire::{put_u32, put_u64};

    fn processor() -> MessageProcessor {
        MessageProcessor::new(Arc::new(OrderBook::new()), Arc::new(SymbolTable::new()))
    }

    fn add_record(order_ref: u64, ticker: &str, side: u8, shares: u32, price: u32) -> RawRecord {
        let mut payload = vec![0u8; 36];
        put_u64(&mut payload, 10, order_ref);
        payload[18] = side;
        put_u32(&mut payload, 19, shares);
        payload[23..31].fill(b' ');
        payload[23..23 + ticker.len()].copy_from_slice(ticker.as_bytes());
        put_u32(&mut payload, 31, price);
        RawRecord {
            message_type: b'A',
            timestamp_ns: 1_000,
            payload,
        }
    }

    fn exec_record(order_ref: u64, shares: u32) -> RawRecord {
        let mut payload = vec![0u8; 30];
        put_u64(&mut payload, 10, order_ref);
        put_u32(&mut payload, 18, shares);
        put_u64(&mut payload, 22, 777);
        RawRecord {
            message_type: b'E',
            timestamp_ns: 2_000,
            payload,
        }
    }

    fn cancel_record(order_ref: u64, shares: u32) -> RawRecord {
        let mut payload = vec![0u8; 22];
        put_u64(&mut payload, 10, order_ref);
        put_u32(&mut payload, 18, shares);
        RawRecord {
            message_type: b'X',
            timestamp_ns: 3_000,
            payload,
        }
    }

    fn delete_record(order_ref: u64) -> RawRecord {
        let mut payload = vec![0u8; 18];
        put_u64(&mut payload, 10, order_ref);
        RawRecord {
            message_type: b'D',
            timestamp_ns: 4_000,
            payload,
        }
    }

    #[test]
    fn add_execute_delete_lifecycle() {
        let p = processor();

        let add = p
            .process(&add_record(1_000_000, "AAPL", b'B', 500, 1_500_000))
            .unwrap();
        assert_eq!(add.price, 15_000);
        assert_eq!(add.size, 500);
        assert_eq!(add.side, Side::Buy);
        assert_eq!(add.message_type, b'A');
        let symbol_id = add.symbol_id;
        assert_ne!(symbol_id, 0);

        let exec = p.process(&exec_record(1_000_000, 200)).unwrap();
        assert_eq!(exec.price, 15_000);
        assert_eq!(exec.size, 200);
        assert_eq!(exec.side, Side::Buy);
        assert_eq!(exec.symbol_id, symbol_id);
        assert_eq!(exec.message_type, b'E');

        let del = p.process(&delete_record(1_000_000)).unwrap();
        assert_eq!(del.price, 15_000);
        assert_eq!(del.size, 300, "delete reports the remaining shares");
        assert_eq!(del.side, Side::Buy);
        assert_eq!(del.message_type, b'D');

        assert_eq!(p.book.len(), 0);
    }

    #[test]
    fn unknown_ref_execute_degrades() {
        let p = processor();
        let tick = p.process(&exec_record(9_999, 120)).unwrap();
        assert_eq!(tick.symbol_id, 0);
        assert_eq!(tick.price, 0);
        assert_eq!(tick.size, 120);
        assert_eq!(tick.side, Side::Unknown);
        assert_eq!(tick.message_type, b'E');
    }

    #[test]
    fn full_execution_erases_entry() {
        let p = processor();
        p.process(&add_record(5, "MSFT", b'S', 100, 40_000)).unwrap();
        assert_eq!(p.book.len(), 1);
        p.process(&exec_record(5, 100)).unwrap();
        assert_eq!(p.book.len(), 0);
    }

    #[test]
    fn partial_cancel_keeps_entry_over_cancel_erases() {
        let p = processor();
        p.process(&add_record(7, "TSLA", b'B', 300, 2_000_00)).unwrap();

        let partial = p.process(&cancel_record(7, 100)).unwrap();
        assert_eq!(partial.size, 100);
        assert_eq!(p.book.lookup(7).unwrap().size, 200);

        // Cancelling more than remains clamps and erases.
        p.process(&cancel_record(7, 10_000)).unwrap();
        assert!(p.book.lookup(7).is_none());
    }

    #[test]
    fn trade_touches_no_book_state() {
        let p = processor();
        let mut payload = vec![0u8; 43];
        put_u64(&mut payload, 10, 42);
        payload[18] = b'S';
        put_u32(&mut payload, 19, 50);
        payload[23..31].fill(b' ');
        payload[23..27].copy_from_slice(b"NVDA");
        put_u32(&mut payload, 31, 90_000);
        put_u64(&mut payload, 35, 1);
        let record = RawRecord {
            message_type: b'P',
            timestamp_ns: 5,
            payload,
        };

        let tick = p.process(&record).unwrap();
        assert_eq!(tick.price, 900);
        assert_eq!(tick.size, 50);
        assert_eq!(tick.side, Side::Sell);
        assert_ne!(tick.symbol_id, 0);
        assert_eq!(p.book.len(), 0);
    }

    #[test]
    fn short_payload_is_malformed() {
        let p = processor();
        let record = RawRecord {
            message_type: b'A',
            timestamp_ns: 1,
            payload: vec![0u8; 35],
        };
        assert!(matches!(
            p.process(&record),
            Err(BookError::MalformedRecord { need: 36, .. })
        ));
    }

    #[test]
    fn unlisted_type_passes_through() {
        let p = processor();
        let record = RawRecord {
            message_type: b'C',
            timestamp_ns: 99,
            payload: vec![0u8; 4],
        };
        let tick = p.process(&record).unwrap();
        assert_eq!(tick.timestamp_ns, 99);
        assert_eq!(tick.message_type, b'C');
        assert_eq!(tick.symbol_id, 0);
        assert_eq!(tick.price, 0);
        assert_eq!(tick.size, 0);
        assert_eq!(tick.side, Side::Unknown);
    }

    #[test]
    fn counters_track_accepted_records() {
        let p = processor();
        p.process(&add_record(1, "AAPL", b'B', 10, 100)).unwrap();
        p.process(&exec_record(1, 5)).unwrap();
        p.process(&cancel_record(1, 1)).unwrap();
        p.process(&delete_record(1)).unwrap();
        let (add, exec, trade, cancel) = p.counters().snapshot();
        assert_eq!((add, exec, trade, cancel), (1, 1, 0, 2));
    }

    #[test]
    fn ticker_padding_is_trimmed_before_interning() {
        let p = processor();
        p.process(&add_record(1, "AAPL", b'B', 10, 100)).unwrap();
        p.process(&add_record(2, "AAPL", b'S', 20, 200)).unwrap();
        assert_eq!(p.symbols.len(), 1);
        assert_eq!(p.symbols.resolve(1).as_deref(), Some("AAPL"));
    }
}
