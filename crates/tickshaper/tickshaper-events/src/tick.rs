use serde::{Deserialize, Serialize};

/// One record pulled off the capture wire, before interpretation.
///
/// The decoder strips the 2-byte length prefix and the type byte; `payload`
/// is everything after the type byte. Constructed once per record and
/// consumed by the processor, never retained.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub message_type: u8,
    /// Nanoseconds since session midnight, widened from the 48-bit wire
    /// value (or the host wall clock for types that carry no timestamp).
    pub timestamp_ns: u64,
    pub payload: Vec<u8>,
}

/// Resting side of an order, or `Unknown` when the originating add was
/// never seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "B")]
    Buy,
    #[serde(rename = "S")]
    Sell,
    #[serde(rename = "U")]
    Unknown,
}

impl Side {
    /// Maps the ITCH buy/sell indicator byte. Anything other than `B`/`S`
    /// is `Unknown`.
    pub fn from_indicator(byte: u8) -> Self {
        match byte {
            b'B' => Side::Buy,
            b'S' => Side::Sell,
            _ => Side::Unknown,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Side::Buy => 'B',
            Side::Sell => 'S',
            Side::Unknown => 'U',
        }
    }
}

/// One normalized post-processing record, regardless of originating message
/// type. This is exactly the shape published on the bus: serde field order
/// matches the wire key order (`timestamp`, `symbol_id`, `price`, `size`,
/// `side`, `message_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    #[serde(rename = "timestamp")]
    pub timestamp_ns: u64,
    /// Interned symbol id; 0 means unknown/not interned.
    pub symbol_id: u32,
    /// Price in cents (ITCH 1/10000-dollar units divided by 100).
    pub price: u64,
    pub size: u32,
    pub side: Side,
    #[serde(with = "message_type_char")]
    pub message_type: u8,
}

impl Tick {
    /// Pass-through tick for a record whose type the processor does not
    /// interpret: timestamp and type preserved, everything else zeroed.
    pub fn passthrough(timestamp_ns: u64, message_type: u8) -> Self {
        Self {
            timestamp_ns,
            symbol_id: 0,
            price: 0,
            size: 0,
            side: Side::Unknown,
            message_type,
        }
    }
}

/// Renders the raw message-type byte as a single-character JSON string, the
/// way subscribers expect it ("A", "E", ...), and parses it back.
mod message_type_char {
    use serde::de::{self, Deserializer, Visitor};
    use serde::Serializer;
    use std::fmt;

    pub fn serialize<S: Serializer>(byte: &u8, serializer: S) -> Result<S::Ok, S::Error> {
        let mut buf = [0u8; 4];
        serializer.serialize_str((*byte as char).encode_utf8(&mut buf))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
        struct CharVisitor;

        impl Visitor<'_> for CharVisitor {
            type Value = u8;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a single-character message type string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<u8, E> {
                let mut chars = v.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii() => Ok(c as u8),
                    _ => Err(E::custom("expected one ASCII character")),
                }
            }
        }

        deserializer.deserialize_str(CharVisitor)
    }
}
