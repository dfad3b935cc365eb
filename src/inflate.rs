//! DEFLATE decompression (RFC 1951).

use std::{fmt::Display, sync::LazyLock};

use crate::{
    bitstream::{BitReader, ByteWriter},
    error::{Alphabet, DecodeError, Result},
    huffman::HuffmanTree,
    trace::{NoTrace, Trace, TraceEvent},
    window::{SlidingWindow, DEFAULT_WINDOW_SIZE},
};

const END_OF_BLOCK: u16 = 256;

/// Base lengths for symbols 257..=285.
const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];

const LENGTH_EXTRA_BITS: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

const DISTANCE_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

const DISTANCE_EXTRA_BITS: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// The order code length code lengths are transmitted in.
const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

const MAX_LITERAL_LENGTH_CODES: usize = 286;
const MAX_DISTANCE_CODES: usize = 30;

/// Bits in a fixed distance code.
const FIXED_DISTANCE_BITS: u32 = 5;

const FIXED_LITERAL_LENGTHS: [u8; 288] = {
    let mut lengths = [8; 288];
    let mut symbol = 144;
    while symbol < 256 {
        lengths[symbol] = 9;
        symbol += 1;
    }
    while symbol < 280 {
        lengths[symbol] = 7;
        symbol += 1;
    }
    lengths
};

static FIXED_LITERAL_TREE: LazyLock<HuffmanTree> = LazyLock::new(|| {
    HuffmanTree::from_lengths(&FIXED_LITERAL_LENGTHS)
        .expect("the fixed literal/length code is a complete prefix code")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Stored,
    FixedHuffman,
    DynamicHuffman,
}

impl Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockType::Stored => write!(f, "stored"),
            BlockType::FixedHuffman => write!(f, "fixed Huffman codes"),
            BlockType::DynamicHuffman => write!(f, "dynamic Huffman codes"),
        }
    }
}

impl TryFrom<u32> for BlockType {
    type Error = DecodeError;

    fn try_from(btype: u32) -> Result<Self> {
        match btype {
            0 => Ok(Self::Stored),
            1 => Ok(Self::FixedHuffman),
            2 => Ok(Self::DynamicHuffman),
            _ => Err(DecodeError::InvalidBlockType),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub is_final: bool,
    pub block_type: BlockType,
}

impl BlockHeader {
    pub fn read(reader: &mut BitReader) -> Result<Self> {
        let is_final = reader.read_bits_lsb(1)? == 1;
        let block_type = reader.read_bits_lsb(2)?.try_into()?;
        Ok(Self {
            is_final,
            block_type,
        })
    }
}

#[derive(Clone, Copy)]
enum DistanceCodes<'t> {
    Fixed,
    Dynamic(&'t HuffmanTree),
}

/// Decodes the blocks of one DEFLATE stream into a window.
pub struct BlockDecoder<'d, 'a> {
    reader: &'d mut BitReader<'a>,
    window: &'d mut SlidingWindow,
    trace: &'d mut dyn Trace,
    blocks: usize,
}

impl<'d, 'a> BlockDecoder<'d, 'a> {
    pub fn new(
        reader: &'d mut BitReader<'a>,
        window: &'d mut SlidingWindow,
        trace: &'d mut dyn Trace,
    ) -> Self {
        Self {
            reader,
            window,
            trace,
            blocks: 0,
        }
    }

    /// Number of blocks decoded so far.
    pub fn blocks(&self) -> usize {
        self.blocks
    }

    /// Decodes the next block and returns its header.
    pub fn decode_block(&mut self) -> Result<BlockHeader> {
        let header = BlockHeader::read(self.reader)?;
        self.trace.event(&TraceEvent::BlockHeader {
            index: self.blocks,
            is_final: header.is_final,
            block_type: header.block_type,
        });
        match header.block_type {
            BlockType::Stored => self.copy_stored()?,
            BlockType::FixedHuffman => {
                self.decode_compressed(&FIXED_LITERAL_TREE, DistanceCodes::Fixed)?
            }
            BlockType::DynamicHuffman => {
                let (literals, distances) = self.read_dynamic_trees()?;
                self.decode_compressed(&literals, DistanceCodes::Dynamic(&distances))?
            }
        }
        self.blocks += 1;
        Ok(header)
    }

    fn copy_stored(&mut self) -> Result<()> {
        self.reader.skip_to_next_byte();
        let len = self.reader.read_bytes(2)? as u16;
        let nlen = self.reader.read_bytes(2)? as u16;
        if len ^ nlen != 0xffff {
            return Err(DecodeError::LengthMismatch { len, nlen });
        }
        self.trace.event(&TraceEvent::StoredBlock { len });
        for &byte in self.reader.read_aligned_slice(usize::from(len))? {
            self.window.append(byte)?;
        }
        Ok(())
    }

    fn read_dynamic_trees(&mut self) -> Result<(HuffmanTree, HuffmanTree)> {
        let hlit = self.reader.read_bits_lsb(5)? as usize + 257;
        let hdist = self.reader.read_bits_lsb(5)? as usize + 1;
        let hclen = self.reader.read_bits_lsb(4)? as usize + 4;
        self.trace
            .event(&TraceEvent::DynamicTables { hlit, hdist, hclen });
        if hlit > MAX_LITERAL_LENGTH_CODES || hdist > MAX_DISTANCE_CODES {
            return Err(DecodeError::MalformedTree(
                "too many literal/length or distance codes",
            ));
        }

        let mut code_length_lengths = [0_u8; 19];
        for &symbol in &CODE_LENGTH_ORDER[..hclen] {
            code_length_lengths[symbol] = self.reader.read_bits_lsb(3)? as u8;
        }
        let code_lengths = HuffmanTree::from_lengths(&code_length_lengths)?;

        // Literal/length and distance code lengths form one sequence, repeats
        // may run from one into the other.
        let mut lengths = vec![0_u8; hlit + hdist];
        let mut filled = 0_usize;
        while filled < lengths.len() {
            let (length, repeat) = match code_lengths.decode_symbol(self.reader)? {
                length @ 0..=15 => (length as u8, 1),
                16 => {
                    let Some(&previous) = filled.checked_sub(1).and_then(|i| lengths.get(i))
                    else {
                        return Err(DecodeError::MalformedTree(
                            "repeat of a previous length with no previous length",
                        ));
                    };
                    (previous, 3 + self.reader.read_bits_lsb(2)? as usize)
                }
                17 => (0, 3 + self.reader.read_bits_lsb(3)? as usize),
                18 => (0, 11 + self.reader.read_bits_lsb(7)? as usize),
                symbol => {
                    return Err(DecodeError::InvalidSymbol {
                        alphabet: Alphabet::CodeLength,
                        symbol,
                    })
                }
            };
            let Some(run) = lengths.get_mut(filled..filled + repeat) else {
                return Err(DecodeError::MalformedTree(
                    "code length repeat runs past the end of the table",
                ));
            };
            run.fill(length);
            filled += repeat;
        }

        let (literal_lengths, distance_lengths) = lengths.split_at(hlit);
        if literal_lengths[usize::from(END_OF_BLOCK)] == 0 {
            return Err(DecodeError::MalformedTree("no code for end of block"));
        }
        Ok((
            HuffmanTree::from_lengths(literal_lengths)?,
            HuffmanTree::from_lengths(distance_lengths)?,
        ))
    }

    fn decode_compressed(
        &mut self,
        literals: &HuffmanTree,
        distances: DistanceCodes,
    ) -> Result<()> {
        loop {
            match literals.decode_symbol(self.reader)? {
                literal @ 0..=255 => {
                    let literal = literal as u8;
                    self.trace.event(&TraceEvent::Literal(literal));
                    self.window.append(literal)?;
                }
                END_OF_BLOCK => {
                    self.trace.event(&TraceEvent::EndOfBlock {
                        emitted: self.window.emitted(),
                    });
                    return Ok(());
                }
                symbol @ 257..=285 => {
                    let length = self.read_length(symbol)?;
                    let distance_symbol = match distances {
                        DistanceCodes::Fixed => {
                            self.reader.read_bits_msb(FIXED_DISTANCE_BITS)? as u16
                        }
                        DistanceCodes::Dynamic(tree) => tree.decode_symbol(self.reader)?,
                    };
                    let distance = self.read_distance(distance_symbol)?;
                    self.trace
                        .event(&TraceEvent::BackReference { length, distance });
                    self.window.copy_back(length, distance)?;
                }
                symbol => {
                    return Err(DecodeError::InvalidSymbol {
                        alphabet: Alphabet::LiteralLength,
                        symbol,
                    })
                }
            }
        }
    }

    fn read_length(&mut self, symbol: u16) -> Result<usize> {
        let index = usize::from(symbol - 257);
        let extra = self
            .reader
            .read_bits_lsb(u32::from(LENGTH_EXTRA_BITS[index]))?;
        Ok(usize::from(LENGTH_BASE[index]) + extra as usize)
    }

    fn read_distance(&mut self, symbol: u16) -> Result<usize> {
        let index = usize::from(symbol);
        let (Some(&base), Some(&extra_bits)) =
            (DISTANCE_BASE.get(index), DISTANCE_EXTRA_BITS.get(index))
        else {
            return Err(DecodeError::InvalidSymbol {
                alphabet: Alphabet::Distance,
                symbol,
            });
        };
        let extra = self.reader.read_bits_lsb(u32::from(extra_bits))?;
        Ok(usize::from(base) + extra as usize)
    }
}

/// Decodes blocks until the one flagged as final and returns how many
/// blocks there were.
///
/// The window outlives the call so that a caller can keep decoding into the
/// same history, and so that the output can be taken from it afterwards.
pub fn inflate(
    reader: &mut BitReader,
    window: &mut SlidingWindow,
    trace: &mut dyn Trace,
) -> Result<usize> {
    let mut decoder = BlockDecoder::new(reader, window, trace);
    while !decoder.decode_block()?.is_final {}
    Ok(decoder.blocks())
}

/// Inflates a raw DEFLATE stream (no zlib framing) with a 32K window.
pub fn inflate_raw(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut reader = BitReader::new(bytes);
    let mut window = SlidingWindow::new(DEFAULT_WINDOW_SIZE, ByteWriter::new());
    inflate(&mut reader, &mut window, &mut NoTrace)?;
    Ok(window.into_output().into_bytes())
}
