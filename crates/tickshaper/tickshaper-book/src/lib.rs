//! `tickshaper-book`: stateful interpretation of decoded records.
//!
//! The [`MessageProcessor`] turns each [`RawRecord`](tickshaper_events::RawRecord)
//! into a normalized [`Tick`](tickshaper_events::Tick), resolving executions
//! and cancels against the orders remembered by the [`OrderBook`] and
//! interning tickers through the [`SymbolTable`]. All three are shared across
//! the worker pool.

mod book;
mod processor;
mod symbols;

pub use book::{OrderBook, OrderEntry};
pub use processor::{BookError, MessageProcessor, ProcessorCounters};
pub use symbols::SymbolTable;
