use std::collections::HashMap;
use std::sync::Mutex;

/// Interns 8-byte stock tickers into dense numeric ids.
///
/// Ids are assigned monotonically from 1; id 0 is reserved for
/// "unknown/not interned" and never maps back to a ticker. Insertion-only:
/// once assigned, an id never rebinds.
pub struct SymbolTable {
    inner: Mutex<Maps>,
}

struct Maps {
    by_ticker: HashMap<String, u32>,
    by_id: HashMap<u32, String>,
    next_id: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Maps {
                by_ticker: HashMap::new(),
                by_id: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Returns the id for `ticker`, assigning the next one on first sight.
    pub fn intern(&self, ticker: &str) -> u32 {
        let mut maps = self.inner.lock().unwrap();
        if let Some(&id) = maps.by_ticker.get(ticker) {
            return id;
        }
        let id = maps.next_id;
        maps.next_id += 1;
        maps.by_ticker.insert(ticker.to_string(), id);
        maps.by_id.insert(id, ticker.to_string());
        id
    }

    /// Reverse lookup; `None` for id 0 and for ids never assigned.
    pub fn resolve(&self, id: u32) -> Option<String> {
        self.inner.lock().unwrap().by_id.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().by_ticker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_from_one_and_stable() {
        let table = SymbolTable::new();
        assert_eq!(table.intern("AAPL"), 1);
        assert_eq!(table.intern("MSFT"), 2);
        assert_eq!(table.intern("AAPL"), 1);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn reverse_mapping_tracks_forward() {
        let table = SymbolTable::new();
        let id = table.intern("TSLA");
        assert_eq!(table.resolve(id).as_deref(), Some("TSLA"));
    }

    #[test]
    fn zero_never_resolves() {
        let table = SymbolTable::new();
        table.intern("NVDA");
        assert_eq!(table.resolve(0), None);
    }
}
