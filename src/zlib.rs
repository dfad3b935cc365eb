use std::fmt::Display;

use crate::{
    adler32::adler32,
    bitstream::{BitReader, ByteWriter},
    error::{DecodeError, Result},
    inflate::inflate,
    trace::{NoTrace, Trace, TraceEvent},
    window::SlidingWindow,
};

const COMPRESSION_LEVEL_MASK: u8 = 0x3;
const DEFLATE_IDENTIFIER: u8 = 0x8;
const PRESET_DICTIONARY_FLAG: u8 = 1 << 5;
const MAX_WINDOW_EXPONENT: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    Fastest,
    Fast,
    Default,
    Maximum,
}

impl From<u8> for CompressionLevel {
    fn from(byte: u8) -> Self {
        match byte & COMPRESSION_LEVEL_MASK {
            0 => Self::Fastest,
            1 => Self::Fast,
            2 => Self::Default,
            3 => Self::Maximum,
            _ => unreachable!(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    #[allow(clippy::upper_case_acronyms)]
    DEFLATE(usize), // window size
}

impl CompressionMethod {
    pub fn window_size(&self) -> usize {
        let Self::DEFLATE(window_size) = self;
        *window_size
    }
}

impl Display for CompressionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self::DEFLATE(window_size) = self;
        write!(f, "DEFLATE with a window size of {window_size} bytes")
    }
}

impl TryFrom<u8> for CompressionMethod {
    type Error = DecodeError;

    fn try_from(byte: u8) -> Result<Self> {
        match byte & 0xf {
            DEFLATE_IDENTIFIER => {
                let cinfo = byte >> 4;
                if cinfo > MAX_WINDOW_EXPONENT {
                    return Err(DecodeError::InvalidWindowSize(cinfo));
                }
                Ok(Self::DEFLATE(1 << (8 + cinfo)))
            }
            cm => Err(DecodeError::UnsupportedCompressionMethod(cm)),
        }
    }
}

// RFC 1950
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    cmf: u8,
    flg: u8,
    compression_method: CompressionMethod,
    preset_dictionary: Option<u32>,
    compression_level: CompressionLevel,
}

impl Header {
    /// Reads CMF, FLG and, when FDICT is set, DICTID.
    pub fn read(reader: &mut BitReader) -> Result<Self> {
        let cmf = reader.read_bytes(1)? as u8;
        let flg = reader.read_bytes(1)? as u8;
        let compression_method = cmf.try_into()?;
        if u16::from_be_bytes([cmf, flg]) % 31 != 0 {
            return Err(DecodeError::HeaderChecksumInvalid);
        }
        let preset_dictionary = if flg & PRESET_DICTIONARY_FLAG != 0 {
            Some(reader.read_bytes(4)?.swap_bytes())
        } else {
            None
        };
        Ok(Self {
            cmf,
            flg,
            compression_method,
            preset_dictionary,
            compression_level: (flg >> 6).into(),
        })
    }

    pub fn compression_method(&self) -> CompressionMethod {
        self.compression_method
    }

    pub fn compression_level(&self) -> CompressionLevel {
        self.compression_level
    }

    pub fn preset_dictionary(&self) -> Option<u32> {
        self.preset_dictionary
    }

    pub fn window_size(&self) -> usize {
        self.compression_method.window_size()
    }

    pub fn flags_check_bits(&self) -> u8 {
        self.flg & 0x1f
    }
}

/// A zlib stream: header, DEFLATE body and ADLER-32 trailer.
#[derive(Debug)]
pub struct Stream<'a> {
    header: Header,
    bytes: &'a [u8],
    body_offset: usize,
}

impl Display for Stream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Compression method: {}",
            self.header.compression_method
        )?;
        writeln!(
            f,
            "Preset dictionary (FDICT): {}",
            self.header
                .preset_dictionary
                .map(|dict| format!("{dict:#x}"))
                .unwrap_or("not present".to_string())
        )?;
        writeln!(
            f,
            "Compression level: {:?}",
            self.header.compression_level
        )?;
        writeln!(f, "Check bits: 0b{:05b}", self.header.flags_check_bits())?;
        writeln!(
            f,
            "Compressed data length: {}",
            self.bytes.len().saturating_sub(self.body_offset + 4)
        )?;
        match self.bytes.len().checked_sub(4) {
            Some(start) if start >= self.body_offset => writeln!(
                f,
                "Checksum (ADLER-32): {:#x}",
                u32::from_be_bytes([
                    self.bytes[start],
                    self.bytes[start + 1],
                    self.bytes[start + 2],
                    self.bytes[start + 3],
                ])
            ),
            _ => writeln!(f, "Checksum (ADLER-32): missing"),
        }
    }
}

impl<'a> TryFrom<&'a [u8]> for Stream<'a> {
    type Error = DecodeError;

    fn try_from(bytes: &'a [u8]) -> Result<Self> {
        let mut reader = BitReader::new(bytes);
        let header = Header::read(&mut reader)?;
        Ok(Self {
            header,
            bytes,
            body_offset: reader.byte_position(),
        })
    }
}

/// The result of inflating a zlib stream, before its checksum is judged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inflated {
    pub data: Vec<u8>,
    pub expected_checksum: u32,
    pub computed_checksum: u32,
    pub blocks: usize,
    /// Bytes of input that followed the trailer.
    pub trailing_bytes: usize,
}

impl Inflated {
    pub fn checksum_matches(&self) -> bool {
        self.expected_checksum == self.computed_checksum
    }

    pub fn verify(self) -> Result<Vec<u8>> {
        if !self.checksum_matches() {
            return Err(DecodeError::ChecksumMismatch {
                expected: self.expected_checksum,
                computed: self.computed_checksum,
            });
        }
        Ok(self.data)
    }
}

impl Stream<'_> {
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Inflates the body into `output` and reads the trailer.
    ///
    /// A checksum mismatch is not an error here: the data has already been
    /// produced, and whether it is still usable is up to the caller (see
    /// [`Inflated::verify`]).
    pub fn inflate(&self, output: ByteWriter, trace: &mut dyn Trace) -> Result<Inflated> {
        if let Some(dictionary) = self.header.preset_dictionary {
            return Err(DecodeError::PresetDictionaryUnsupported(dictionary));
        }
        trace.event(&TraceEvent::ZlibHeader {
            cmf: self.header.cmf,
            flg: self.header.flg,
            window_size: self.header.window_size(),
        });

        let mut reader = BitReader::new(&self.bytes[self.body_offset..]);
        let mut window = SlidingWindow::new(self.header.window_size(), output);
        let blocks = inflate(&mut reader, &mut window, trace)?;

        reader.skip_to_next_byte();
        let expected_checksum = reader.read_bytes(4)?.swap_bytes();
        let data = window.into_output().into_bytes();
        let computed_checksum = adler32(&data);
        let trailing_bytes = reader.len() - reader.byte_position();
        trace.event(&TraceEvent::ZlibTrailer {
            expected: expected_checksum,
            computed: computed_checksum,
            trailing_bytes,
        });
        tracing::debug!(
            blocks,
            inflated = data.len(),
            trailing_bytes,
            "inflated zlib stream"
        );

        Ok(Inflated {
            data,
            expected_checksum,
            computed_checksum,
            blocks,
            trailing_bytes,
        })
    }
}

/// Inflates a complete zlib stream, checksum included.
pub fn inflate_zlib(input: &[u8]) -> Result<Vec<u8>> {
    Stream::try_from(input)?
        .inflate(ByteWriter::new(), &mut NoTrace)?
        .verify()
}

/// Like [`inflate_zlib`], but fails with [`DecodeError::BufferFull`] rather
/// than produce more than `capacity` bytes.
pub fn inflate_zlib_with_capacity(input: &[u8], capacity: usize) -> Result<Vec<u8>> {
    Stream::try_from(input)?
        .inflate(ByteWriter::with_capacity(capacity), &mut NoTrace)?
        .verify()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: [u8; 13] = [
        0x78, 0x9c, 0xcb, 0x48, 0xcd, 0xc9, 0xc9, 0x07, 0x00, 0x06, 0x2c, 0x02, 0x15,
    ];

    const HELLO_WORLD_STORED: [u8; 22] = [
        0x78, 0x01, 0x01, 0x0b, 0x00, 0xf4, 0xff, 0x68, 0x65, 0x6c, 0x6c, 0x6f, 0x20, 0x77, 0x6f,
        0x72, 0x6c, 0x64, 0x1a, 0x0b, 0x04, 0x5d,
    ];

    /// A fixed block, an empty stored block from a sync flush, then a second
    /// fixed block that refers back into the first one.
    const TWO_BLOCKS: [u8; 57] = [
        0x78, 0x9c, 0x4a, 0xcb, 0x2c, 0x2a, 0x2e, 0x51, 0x48, 0xca, 0xc9, 0x4f, 0xce, 0xd6, 0x51,
        0x48, 0x43, 0x70, 0xf4, 0x14, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0x2b, 0x4e, 0x4d, 0xce,
        0xcf, 0x4b, 0x81, 0xf0, 0x14, 0x8a, 0x52, 0xd3, 0x52, 0x8b, 0x8a, 0x15, 0x92, 0x12, 0x93,
        0xb3, 0xad, 0x90, 0x95, 0xa1, 0xea, 0x01, 0x00, 0x42, 0x14, 0x1b, 0xba,
    ];

    #[test]
    fn inflate_fixed_stream() {
        assert_eq!(inflate_zlib(&HELLO).unwrap(), b"hello");
    }

    #[test]
    fn inflate_stored_stream() {
        assert_eq!(inflate_zlib(&HELLO_WORLD_STORED).unwrap(), b"hello world");
    }

    #[test]
    fn inflate_empty_stream() {
        let empty = [0x78, 0x9c, 0x03, 0x00, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(inflate_zlib(&empty).unwrap(), b"");
    }

    #[test]
    fn back_references_cross_block_boundaries() {
        let stream = Stream::try_from(&TWO_BLOCKS[..]).unwrap();
        let inflated = stream.inflate(ByteWriter::new(), &mut NoTrace).unwrap();
        assert_eq!(inflated.blocks, 3);
        assert_eq!(inflated.trailing_bytes, 0);
        assert_eq!(
            inflated.verify().unwrap(),
            b"first block, first block. second block refers back: first block, first block."
        );
    }

    #[test]
    fn header_fields() {
        let stream = Stream::try_from(&HELLO[..]).unwrap();
        let header = stream.header();
        assert_eq!(header.compression_method(), CompressionMethod::DEFLATE(32768));
        assert_eq!(header.compression_level(), CompressionLevel::Default);
        assert_eq!(header.preset_dictionary(), None);
        assert_eq!(header.flags_check_bits(), 0x1c);

        let stream = Stream::try_from(&HELLO_WORLD_STORED[..]).unwrap();
        assert_eq!(stream.header().compression_level(), CompressionLevel::Fastest);
    }

    #[test]
    fn display_metadata() {
        let stream = Stream::try_from(&HELLO[..]).unwrap();
        assert_eq!(
            stream.to_string(),
            "Compression method: DEFLATE with a window size of 32768 bytes\n\
             Preset dictionary (FDICT): not present\n\
             Compression level: Default\n\
             Check bits: 0b11100\n\
             Compressed data length: 7\n\
             Checksum (ADLER-32): 0x62c0215\n"
        );
    }

    #[test]
    fn unsupported_compression_method() {
        // CM = 7, FCHECK still valid
        let bytes = [0x77, 0x09, 0x03, 0x00];
        assert_eq!(
            inflate_zlib(&bytes),
            Err(DecodeError::UnsupportedCompressionMethod(7))
        );
    }

    #[test]
    fn window_too_large() {
        // CINFO = 8
        let bytes = [0x88, 0x1c, 0x03, 0x00];
        assert_eq!(inflate_zlib(&bytes), Err(DecodeError::InvalidWindowSize(8)));
    }

    #[test]
    fn bad_header_check_bits() {
        let mut bytes = HELLO;
        bytes[1] = 0x9d;
        assert_eq!(inflate_zlib(&bytes), Err(DecodeError::HeaderChecksumInvalid));
    }

    #[test]
    fn preset_dictionary() {
        // FLG = 0xbb: FDICT set, FLEVEL 2, (0x78bb % 31 == 0)
        let bytes = [0x78, 0xbb, 0x12, 0x34, 0x56, 0x78, 0x03, 0x00];
        let stream = Stream::try_from(&bytes[..]).unwrap();
        assert_eq!(stream.header().preset_dictionary(), Some(0x12345678));
        assert_eq!(
            inflate_zlib(&bytes),
            Err(DecodeError::PresetDictionaryUnsupported(0x12345678))
        );
    }

    #[test]
    fn corrupted_checksum() {
        let mut bytes = HELLO;
        bytes[12] ^= 0xff;
        assert_eq!(
            inflate_zlib(&bytes),
            Err(DecodeError::ChecksumMismatch {
                expected: 0x062c02ea,
                computed: 0x062c0215
            })
        );

        // the data is still there for callers that want it
        let inflated = Stream::try_from(&bytes[..])
            .unwrap()
            .inflate(ByteWriter::new(), &mut NoTrace)
            .unwrap();
        assert!(!inflated.checksum_matches());
        assert_eq!(inflated.data, b"hello");
    }

    #[test]
    fn missing_trailer() {
        assert_eq!(
            inflate_zlib(&HELLO[..HELLO.len() - 2]),
            Err(DecodeError::StreamExhausted)
        );
        assert_eq!(inflate_zlib(&HELLO[..1]), Err(DecodeError::StreamExhausted));
    }

    #[test]
    fn bounded_output() {
        assert_eq!(
            inflate_zlib_with_capacity(&HELLO_WORLD_STORED, 5),
            Err(DecodeError::BufferFull { capacity: 5 })
        );
        assert_eq!(
            inflate_zlib_with_capacity(&HELLO_WORLD_STORED, 11).unwrap(),
            b"hello world"
        );
    }

    #[test]
    fn trace_sees_every_step() {
        let mut events = vec![];
        let mut record = |event: &TraceEvent| events.push(event.clone());
        Stream::try_from(&HELLO_WORLD_STORED[..])
            .unwrap()
            .inflate(ByteWriter::new(), &mut record)
            .unwrap();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], TraceEvent::ZlibHeader { cmf: 0x78, .. }));
        assert!(matches!(events[2], TraceEvent::StoredBlock { len: 11 }));
        assert!(matches!(
            events[3],
            TraceEvent::ZlibTrailer {
                expected: 0x1a0b045d,
                computed: 0x1a0b045d,
                trailing_bytes: 0
            }
        ));
    }
}
