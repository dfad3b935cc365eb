use crate::error::{DecodeError, Result};

/// Bit-level cursor over a compressed byte buffer.
///
/// DEFLATE packs everything starting from the least significant bit of each
/// byte. Plain integer fields (block headers, extra bits, counts) come out of
/// that order as ordinary little-endian values, while Huffman codes are
/// transmitted starting from their most significant bit. The multi-bit reads
/// are therefore split in two: `read_bits_lsb` puts the first stream bit at
/// the bottom of the value, `read_bits_msb` at the top.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    byte_position: usize,
    bit_position: u8,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            byte_position: 0,
            bit_position: 0,
        }
    }

    pub fn byte_position(&self) -> usize {
        self.byte_position
    }

    pub fn bit_position(&self) -> u8 {
        self.bit_position
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bits not consumed yet.
    pub fn remaining_bits(&self) -> usize {
        (self.bytes.len() - self.byte_position) * 8 - usize::from(self.bit_position)
    }

    fn current_byte(&self) -> Result<u8> {
        self.bytes
            .get(self.byte_position)
            .copied()
            .ok_or(DecodeError::StreamExhausted)
    }

    fn advance(&mut self) {
        self.bit_position += 1;
        if self.bit_position == 8 {
            self.bit_position = 0;
            self.byte_position += 1;
        }
    }

    /// Reads the next bit, walking each byte from bit 0 up to bit 7.
    pub fn read_bit_lsb(&mut self) -> Result<u8> {
        let bit = (self.current_byte()? >> self.bit_position) & 1;
        self.advance();
        Ok(bit)
    }

    /// Reads the next bit, walking each byte from bit 7 down to bit 0.
    pub fn read_bit_msb(&mut self) -> Result<u8> {
        let bit = (self.current_byte()? >> (7 - self.bit_position)) & 1;
        self.advance();
        Ok(bit)
    }

    /// Reads `count` bits as a little-endian integer: the first bit read ends
    /// up as bit 0 of the result.
    pub fn read_bits_lsb(&mut self, count: u32) -> Result<u32> {
        debug_assert!(count <= 32);
        let mut value = 0;
        for i in 0..count {
            value |= u32::from(self.read_bit_lsb()?) << i;
        }
        Ok(value)
    }

    /// Reads `count` bits with the first bit read ending up as the most
    /// significant bit of the result. This is the order Huffman codes are
    /// transmitted in.
    pub fn read_bits_msb(&mut self, count: u32) -> Result<u32> {
        debug_assert!(count <= 32);
        let mut value = 0;
        for _ in 0..count {
            value = (value << 1) | u32::from(self.read_bit_lsb()?);
        }
        Ok(value)
    }

    /// Reads a `code_length` bit Huffman code and returns it bit-reversed,
    /// i.e. in the order it was packed into the stream.
    ///
    /// Decoding never needs this (it walks [`crate::huffman::HuffmanTree`]
    /// bit by bit); it is kept for inspecting streams.
    pub fn read_huffman_code(&mut self, code_length: u32) -> Result<u32> {
        let code = self.read_bits_msb(code_length)?;
        Ok(reverse_bits(code, code_length))
    }

    /// Reads `count` (at most 4) whole bytes as a little-endian integer.
    ///
    /// The reader must be byte aligned, see [`Self::skip_to_next_byte`].
    pub fn read_bytes(&mut self, count: usize) -> Result<u32> {
        debug_assert!(count <= 4);
        debug_assert_eq!(self.bit_position, 0, "read_bytes on an unaligned reader");
        let bytes = self.read_aligned_slice(count)?;
        Ok(bytes
            .iter()
            .enumerate()
            .fold(0, |value, (i, &byte)| value | u32::from(byte) << (i * 8)))
    }

    /// Borrows the next `count` whole bytes and moves past them.
    pub fn read_aligned_slice(&mut self, count: usize) -> Result<&'a [u8]> {
        debug_assert_eq!(self.bit_position, 0, "byte read on an unaligned reader");
        let end = self
            .byte_position
            .checked_add(count)
            .ok_or(DecodeError::StreamExhausted)?;
        let slice = self
            .bytes
            .get(self.byte_position..end)
            .ok_or(DecodeError::StreamExhausted)?;
        self.byte_position = end;
        Ok(slice)
    }

    /// Drops whatever is left of a partially consumed byte.
    pub fn skip_to_next_byte(&mut self) {
        if self.bit_position > 0 {
            self.bit_position = 0;
            self.byte_position += 1;
        }
    }
}

pub fn reverse_bits(value: u32, length: u32) -> u32 {
    if length == 0 {
        return 0;
    }
    value.reverse_bits() >> (32 - length)
}

/// Most a bounded writer reserves before any output arrives. The bound
/// usually comes from a file header and cannot be trusted with an allocation.
const MAX_PREALLOCATION: usize = 1 << 20;

/// Destination for decompressed bytes.
///
/// Unbounded by default; a bounded writer refuses to grow past its capacity,
/// which lets callers that know the expected output size (e.g. from a PNG
/// header) stop a runaway stream early.
#[derive(Debug, Clone, Default)]
pub struct ByteWriter {
    bytes: Vec<u8>,
    capacity: Option<usize>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A writer that holds at most `capacity` bytes. Only a bounded part of
    /// that is reserved up front, the rest is allocated as output arrives.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity.min(MAX_PREALLOCATION)),
            capacity: Some(capacity),
        }
    }

    pub fn put_byte(&mut self, byte: u8) -> Result<()> {
        if let Some(capacity) = self.capacity {
            if self.bytes.len() >= capacity {
                return Err(DecodeError::BufferFull { capacity });
            }
        }
        self.bytes.push(byte);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsb_reads_compose_little_endian() {
        let mut reader = BitReader::new(&[0x34, 0x12]);
        assert_eq!(reader.read_bits_lsb(8), Ok(0x34));
        assert_eq!(reader.read_bits_lsb(8), Ok(0x12));
        assert_eq!(reader.read_bits_lsb(1), Err(DecodeError::StreamExhausted));

        let mut reader = BitReader::new(&[0x34, 0x12]);
        reader.skip_to_next_byte();
        assert_eq!(reader.read_bytes(2), Ok(0x1234));
    }

    #[test]
    fn single_bits_in_both_orders() {
        let mut reader = BitReader::new(&[0b1000_0001, 0b0100_0000]);
        assert_eq!(reader.read_bit_lsb(), Ok(1));
        assert_eq!(reader.read_bit_lsb(), Ok(0));
        assert_eq!(reader.bit_position(), 2);

        let mut reader = BitReader::new(&[0b0100_0000]);
        assert_eq!(reader.read_bit_msb(), Ok(0));
        assert_eq!(reader.read_bit_msb(), Ok(1));
        assert_eq!(reader.read_bit_msb(), Ok(0));
    }

    #[test]
    fn msb_reads_put_first_bit_on_top() {
        // stream bits, in read order: 1, 1, 0
        let mut reader = BitReader::new(&[0b0000_0011]);
        assert_eq!(reader.read_bits_msb(3), Ok(0b110));

        let mut reader = BitReader::new(&[0b0000_0011]);
        assert_eq!(reader.read_huffman_code(3), Ok(0b011));
    }

    #[test]
    fn reading_across_byte_boundary() {
        let mut reader = BitReader::new(&[0xff, 0x01]);
        assert_eq!(reader.read_bits_lsb(4), Ok(0xf));
        assert_eq!(reader.read_bits_lsb(8), Ok(0x1f));
        assert_eq!(reader.byte_position(), 1);
        assert_eq!(reader.bit_position(), 4);
        assert_eq!(reader.remaining_bits(), 4);
    }

    #[test]
    fn skip_only_moves_when_unaligned() {
        let mut reader = BitReader::new(&[0xaa, 0xbb, 0xcc]);
        reader.skip_to_next_byte();
        assert_eq!(reader.byte_position(), 0);
        reader.read_bit_lsb().unwrap();
        reader.skip_to_next_byte();
        assert_eq!(reader.byte_position(), 1);
        assert_eq!(reader.read_bytes(1), Ok(0xbb));
    }

    #[test]
    fn byte_reads_past_end_fail() {
        let mut reader = BitReader::new(&[0x01, 0x02]);
        assert_eq!(reader.read_bytes(4), Err(DecodeError::StreamExhausted));
        // a failed read does not move the cursor
        assert_eq!(reader.read_aligned_slice(2), Ok(&[0x01, 0x02][..]));
        assert_eq!(reader.read_aligned_slice(1), Err(DecodeError::StreamExhausted));
    }

    #[test]
    fn bounded_writer_refuses_overflow() {
        let mut writer = ByteWriter::with_capacity(2);
        writer.put_byte(1).unwrap();
        writer.put_byte(2).unwrap();
        assert_eq!(
            writer.put_byte(3),
            Err(DecodeError::BufferFull { capacity: 2 })
        );
        assert_eq!(writer.into_bytes(), vec![1, 2]);
    }

    #[test]
    fn huge_bound_is_not_reserved_up_front() {
        let mut writer = ByteWriter::with_capacity(usize::MAX);
        assert!(writer.bytes.capacity() <= MAX_PREALLOCATION);
        writer.put_byte(7).unwrap();
        assert_eq!(writer.as_slice(), [7]);
    }

    #[test]
    fn reverse() {
        assert_eq!(reverse_bits(0b110, 3), 0b011);
        assert_eq!(reverse_bits(0b1, 1), 0b1);
        assert_eq!(reverse_bits(0, 0), 0);
        assert_eq!(reverse_bits(0b0011_0000, 8), 0b0000_1100);
    }
}
