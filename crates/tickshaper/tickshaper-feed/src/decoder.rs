use crate::symbols::{default_symbols, load_symbols};
use crate::synthetic::Generator;
use crate::TIMESTAMPED_TYPES;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;
use tickshaper_events::wire::be_u48;
use tickshaper_events::RawRecord;
use tracing::{info, warn};

/// Assumed average record size when estimating capture message counts.
const ESTIMATED_RECORD_BYTES: u64 = 50;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The capture file is absent; the caller may substitute a synthetic
    /// source.
    #[error("capture file not found: '{path}'")]
    NotFound { path: String },

    #[error("capture read failed")]
    Io {
        #[from]
        source: io::Error,
    },

    /// Malformed length or truncated payload. The cursor has moved past the
    /// damage; the record is skippable.
    #[error("corrupt record at position {position}")]
    Corrupt { position: u64 },
}

#[derive(Debug)]
enum Source {
    Capture(Capture),
    Synthetic(Generator),
}

#[derive(Debug)]
struct Capture {
    reader: BufReader<File>,
    /// Records decoded since open/reset.
    position: u64,
}

/// Sequential record source shared by the worker pool. Progress through the
/// capture is serialized by an internal lock; callers on any thread simply
/// invoke [`next`](Decoder::next).
#[derive(Debug)]
pub struct Decoder {
    source: Mutex<Source>,
    total_estimate: u64,
}

impl Decoder {
    /// Opens a capture for sequential decoding. Fails with
    /// [`FeedError::NotFound`] when the file is absent so the caller can
    /// fall back to [`Decoder::synthetic`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                FeedError::NotFound {
                    path: path.display().to_string(),
                }
            } else {
                FeedError::Io { source }
            }
        })?;
        let file_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        info!(
            path = %path.display(),
            file_size,
            estimated_records = file_size / ESTIMATED_RECORD_BYTES,
            "capture opened"
        );

        Ok(Self {
            source: Mutex::new(Source::Capture(Capture {
                reader: BufReader::new(file),
                position: 0,
            })),
            total_estimate: file_size / ESTIMATED_RECORD_BYTES,
        })
    }

    /// Builds a generator-mode decoder from the symbols CSV (or the default
    /// universe when the CSV is absent or empty).
    pub fn synthetic(symbols_file: &str) -> Self {
        let symbols = if symbols_file.is_empty() {
            default_symbols()
        } else {
            match load_symbols(symbols_file) {
                Some(symbols) => {
                    info!(symbols_file, count = symbols.len(), "symbols loaded");
                    symbols
                }
                None => {
                    warn!(symbols_file, "symbols file unusable, using defaults");
                    default_symbols()
                }
            }
        };
        info!(symbols = symbols.len(), "synthetic generator initialized");

        Self {
            source: Mutex::new(Source::Synthetic(Generator::new(symbols))),
            // Nominal session length for progress reporting.
            total_estimate: 1_000_000,
        }
    }

    /// Opens the capture, substituting the synthetic generator when the file
    /// does not exist.
    pub fn open_or_synthetic(path: impl AsRef<Path>, symbols_file: &str) -> Result<Self, FeedError> {
        match Self::open(&path) {
            Ok(decoder) => Ok(decoder),
            Err(FeedError::NotFound { path }) => {
                warn!(%path, "capture missing, generating synthetic feed");
                Ok(Self::synthetic(symbols_file))
            }
            Err(other) => Err(other),
        }
    }

    /// Decodes the next record. At end-of-file the capture rewinds and
    /// decoding continues from the start (continuous replay).
    pub fn next(&self) -> Result<RawRecord, FeedError> {
        let mut source = self.source.lock().unwrap();
        match &mut *source {
            Source::Synthetic(generator) => Ok(generator.next_record()),
            Source::Capture(capture) => capture.next_record(),
        }
    }

    /// Seeks back to the start and clears per-session counters.
    pub fn reset(&self) -> Result<(), FeedError> {
        let mut source = self.source.lock().unwrap();
        match &mut *source {
            Source::Synthetic(generator) => generator.reset(),
            Source::Capture(capture) => capture.rewind()?,
        }
        Ok(())
    }

    /// Records decoded since open/reset.
    pub fn position(&self) -> u64 {
        match &*self.source.lock().unwrap() {
            Source::Synthetic(generator) => generator.position(),
            Source::Capture(capture) => capture.position,
        }
    }

    /// Rough total record count (`filesize / 50`) for progress reporting.
    pub fn total_estimate(&self) -> u64 {
        self.total_estimate
    }
}

impl Capture {
    fn next_record(&mut self) -> Result<RawRecord, FeedError> {
        let mut rewound = false;
        let length = loop {
            let mut header = [0u8; 2];
            match self.reader.read_exact(&mut header) {
                Ok(()) => break u16::from_be_bytes(header) as usize,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    // End of capture: rewind once and keep replaying. A
                    // second EOF means the file holds no complete record.
                    if rewound {
                        return Err(FeedError::Corrupt {
                            position: self.position,
                        });
                    }
                    self.rewind()?;
                    rewound = true;
                }
                Err(source) => return Err(FeedError::Io { source }),
            }
        };

        // The length covers the type byte, so zero cannot frame a record.
        if length == 0 {
            return Err(FeedError::Corrupt {
                position: self.position,
            });
        }

        let mut body = vec![0u8; length];
        self.reader.read_exact(&mut body).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                FeedError::Corrupt {
                    position: self.position,
                }
            } else {
                FeedError::Io { source: e }
            }
        })?;

        let message_type = body[0];
        let payload = body.split_off(1);
        let timestamp_ns = extract_timestamp(message_type, &payload);
        self.position += 1;

        Ok(RawRecord {
            message_type,
            timestamp_ns,
            payload,
        })
    }

    fn rewind(&mut self) -> Result<(), FeedError> {
        self.reader.seek(SeekFrom::Start(0))?;
        self.position = 0;
        Ok(())
    }
}

/// Pulls the 48-bit nanoseconds-since-midnight stamp out of the payload for
/// the message kinds that carry one; anything else gets the host clock.
fn extract_timestamp(message_type: u8, payload: &[u8]) -> u64 {
    if TIMESTAMPED_TYPES.contains(&message_type) {
        if let Some(ts) = be_u48(payload, 4) {
            return ts;
        }
    }
    wall_clock_ns()
}

fn wall_clock_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
