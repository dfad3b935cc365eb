use thiserror::Error;

/// Everything that can go wrong while inflating a zlib/DEFLATE stream.
///
/// None of these are recoverable: a DEFLATE stream that desynchronizes once
/// cannot be resumed, so every error aborts the current decode.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("tried to read past the end of the compressed stream")]
    StreamExhausted,
    #[error("output buffer is full ({capacity} bytes)")]
    BufferFull { capacity: usize },
    #[error("invalid block type 3 (reserved)")]
    InvalidBlockType,
    #[error("stored block length {len:#06x} does not match its complement {nlen:#06x}")]
    LengthMismatch { len: u16, nlen: u16 },
    #[error("invalid {alphabet} symbol: {symbol}")]
    InvalidSymbol { alphabet: Alphabet, symbol: u16 },
    #[error("invalid back-reference distance {distance} ({available} bytes available)")]
    InvalidDistance { distance: usize, available: usize },
    #[error("malformed huffman code: {0}")]
    MalformedTree(&'static str),
    #[error("unsupported compression method: {0}")]
    UnsupportedCompressionMethod(u8),
    #[error("invalid window size exponent (CINFO): {0}")]
    InvalidWindowSize(u8),
    #[error("corrupt stream: invalid CMF, FLG, or both")]
    HeaderChecksumInvalid,
    #[error("preset dictionaries are not supported (DICTID {0:#010x})")]
    PresetDictionaryUnsupported(u32),
    #[error("ADLER-32 mismatch: stream says {expected:#010x}, data hashes to {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },
}

/// The alphabet a decoded symbol belongs to, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alphabet {
    CodeLength,
    LiteralLength,
    Distance,
}

impl std::fmt::Display for Alphabet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Alphabet::CodeLength => write!(f, "code length"),
            Alphabet::LiteralLength => write!(f, "literal/length"),
            Alphabet::Distance => write!(f, "distance"),
        }
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;
