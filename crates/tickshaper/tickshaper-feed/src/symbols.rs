use std::path::Path;

/// One tradeable symbol for the synthetic generator, with the uniform
/// price/size ranges its fabricated orders draw from.
#[derive(Debug, Clone)]
pub struct SymbolSpec {
    /// Ticker, at most 8 ASCII characters (space-padded on the wire).
    pub ticker: String,
    /// Price range in ITCH 1/10000-dollar units.
    pub min_price: u32,
    pub max_price: u32,
    pub min_size: u32,
    pub max_size: u32,
}

const DEFAULT_MIN_PRICE: u32 = 1_000;
const DEFAULT_MAX_PRICE: u32 = 100_000;
const DEFAULT_MIN_SIZE: u32 = 100;
const DEFAULT_MAX_SIZE: u32 = 10_000;

impl SymbolSpec {
    fn with_defaults(ticker: &str) -> Self {
        Self {
            ticker: ticker.chars().take(8).collect(),
            min_price: DEFAULT_MIN_PRICE,
            max_price: DEFAULT_MAX_PRICE,
            min_size: DEFAULT_MIN_SIZE,
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

/// The fallback universe when no symbols file is configured.
pub fn default_symbols() -> Vec<SymbolSpec> {
    ["AAPL", "MSFT", "GOOGL", "AMZN", "TSLA", "META", "NVDA", "NFLX"]
        .iter()
        .map(|t| SymbolSpec::with_defaults(t))
        .collect()
}

/// Loads `TICKER,min_price,max_price,min_size,max_size` lines; `#` starts a
/// comment. Missing range columns fall back to the defaults; an unreadable
/// or empty file yields `None` so the caller can use [`default_symbols`].
pub fn load_symbols(path: impl AsRef<Path>) -> Option<Vec<SymbolSpec>> {
    let contents = std::fs::read_to_string(path).ok()?;
    let mut specs = Vec::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split(',').map(str::trim);
        let Some(ticker) = fields.next().filter(|t| !t.is_empty()) else {
            continue;
        };
        let mut spec = SymbolSpec::with_defaults(ticker);
        if let Some(v) = fields.next().and_then(|f| f.parse().ok()) {
            spec.min_price = v;
        }
        if let Some(v) = fields.next().and_then(|f| f.parse().ok()) {
            spec.max_price = v;
        }
        if let Some(v) = fields.next().and_then(|f| f.parse().ok()) {
            spec.min_size = v;
        }
        if let Some(v) = fields.next().and_then(|f| f.parse().ok()) {
            spec.max_size = v;
        }
        if spec.max_price < spec.min_price {
            spec.max_price = spec.min_price;
        }
        if spec.max_size < spec.min_size {
            spec.max_size = spec.min_size;
        }
        specs.push(spec);
    }

    if specs.is_empty() {
        None
    } else {
        Some(specs)
    }
}
