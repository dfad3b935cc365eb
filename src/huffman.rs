use crate::{
    bitstream::BitReader,
    error::{DecodeError, Result},
};

/// Longest code DEFLATE allows.
pub const MAX_BITS: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Code {
    pub bits: u16,
    pub length: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Internal {
        left: Option<u16>,
        right: Option<u16>,
    },
    Leaf {
        symbol: u16,
    },
}

/// A canonical Huffman code stored as a binary tree in a flat arena.
///
/// Node 0 is the root. Internal nodes point at their children by index, a
/// missing child is a code nobody was assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanTree {
    nodes: Vec<Node>,
    codes: Vec<Option<Code>>,
}

impl HuffmanTree {
    /// Builds the canonical code for `lengths[symbol]` (RFC 1951 3.2.2).
    /// A length of 0 means the symbol is not used.
    ///
    /// Incomplete codes are accepted, since DEFLATE allows a distance code
    /// with a single symbol, or none at all. Over-subscribed ones are not.
    pub fn from_lengths(lengths: &[u8]) -> Result<Self> {
        // 1) Count the number of codes for each code length.
        let mut bl_count = [0_u32; MAX_BITS + 1];
        for &length in lengths {
            let length = usize::from(length);
            if length > MAX_BITS {
                return Err(DecodeError::MalformedTree("code length longer than 15 bits"));
            }
            bl_count[length] += 1;
        }
        bl_count[0] = 0;

        // 2) Find the numerical value of the smallest code for each code length.
        let mut next_code = [0_u32; MAX_BITS + 1];
        let mut code = 0_u32;
        for bits in 1..=MAX_BITS {
            code = (code + bl_count[bits - 1]) << 1;
            next_code[bits] = code;
        }

        // 3) Assign consecutive values to all codes of the same length, in
        //    symbol order.
        let mut tree = Self {
            nodes: vec![Node::Internal {
                left: None,
                right: None,
            }],
            codes: vec![None; lengths.len()],
        };
        for (symbol, &length) in lengths.iter().enumerate() {
            if length == 0 {
                continue;
            }
            let bits = next_code[usize::from(length)];
            if bits >> length != 0 {
                return Err(DecodeError::MalformedTree("code lengths over-subscribed"));
            }
            next_code[usize::from(length)] += 1;
            let code = Code {
                bits: bits as u16,
                length,
            };
            tree.insert(symbol as u16, code)?;
            tree.codes[symbol] = Some(code);
        }
        Ok(tree)
    }

    fn push(&mut self, node: Node) -> u16 {
        self.nodes.push(node);
        (self.nodes.len() - 1) as u16
    }

    fn insert(&mut self, symbol: u16, code: Code) -> Result<()> {
        let mut current = 0_u16;
        for i in (0..code.length).rev() {
            let bit = (code.bits >> i) & 1;
            let last = i == 0;
            let Node::Internal { left, right } = self.nodes[usize::from(current)] else {
                return Err(DecodeError::MalformedTree("code extends past a leaf"));
            };
            let child = if bit == 0 { left } else { right };
            let next = match child {
                Some(_) if last => {
                    return Err(DecodeError::MalformedTree("two symbols share a code"));
                }
                Some(next) => next,
                None => {
                    let node = if last {
                        Node::Leaf { symbol }
                    } else {
                        Node::Internal {
                            left: None,
                            right: None,
                        }
                    };
                    let next = self.push(node);
                    if let Node::Internal { left, right } = &mut self.nodes[usize::from(current)] {
                        if bit == 0 {
                            *left = Some(next);
                        } else {
                            *right = Some(next);
                        }
                    }
                    next
                }
            };
            current = next;
        }
        Ok(())
    }

    /// Decodes one symbol, one bit at a time.
    pub fn decode_symbol(&self, reader: &mut BitReader) -> Result<u16> {
        let mut current = 0_u16;
        loop {
            match self.nodes[usize::from(current)] {
                Node::Leaf { symbol } => return Ok(symbol),
                Node::Internal { left, right } => {
                    let child = if reader.read_bit_lsb()? == 0 { left } else { right };
                    current = child.ok_or(DecodeError::MalformedTree("no symbol has this code"))?;
                }
            }
        }
    }

    /// The code assigned to `symbol`, if it has one.
    pub fn code(&self, symbol: usize) -> Option<Code> {
        self.codes.get(symbol).copied().flatten()
    }

    /// Number of symbols with a code.
    pub fn symbol_count(&self) -> usize {
        self.codes.iter().flatten().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(bits: u16, length: u8) -> Option<Code> {
        Some(Code { bits, length })
    }

    /// Packs codes the way a DEFLATE encoder would: most significant bit of
    /// each code first, filling bytes from bit 0.
    fn pack(codes: &[Code]) -> Vec<u8> {
        let mut bytes = vec![];
        let mut bit_count = 0;
        for c in codes {
            for i in (0..c.length).rev() {
                if bit_count % 8 == 0 {
                    bytes.push(0);
                }
                let bit = ((c.bits >> i) & 1) as u8;
                *bytes.last_mut().unwrap() |= bit << (bit_count % 8);
                bit_count += 1;
            }
        }
        bytes
    }

    #[test]
    fn small_example_from_rfc() {
        let tree = HuffmanTree::from_lengths(&[2, 1, 3, 3]).unwrap();
        assert_eq!(tree.code(0), code(0b10, 2));
        assert_eq!(tree.code(1), code(0b0, 1));
        assert_eq!(tree.code(2), code(0b110, 3));
        assert_eq!(tree.code(3), code(0b111, 3));
        assert_eq!(tree.symbol_count(), 4);
    }

    #[test]
    fn bigger_example_from_rfc() {
        // ABCDEFGH with lengths (3, 3, 3, 3, 3, 2, 4, 4)
        let tree = HuffmanTree::from_lengths(&[3, 3, 3, 3, 3, 2, 4, 4]).unwrap();
        let expected = [
            (0b010, 3),
            (0b011, 3),
            (0b100, 3),
            (0b101, 3),
            (0b110, 3),
            (0b00, 2),
            (0b1110, 4),
            (0b1111, 4),
        ];
        for (symbol, (bits, length)) in expected.into_iter().enumerate() {
            assert_eq!(tree.code(symbol), code(bits, length), "symbol {symbol}");
        }
    }

    #[test]
    fn fixed_literal_codes() {
        let mut lengths = [8_u8; 288];
        lengths[144..256].fill(9);
        lengths[256..280].fill(7);
        let tree = HuffmanTree::from_lengths(&lengths).unwrap();
        assert_eq!(tree.code(0), code(0b00110000, 8));
        assert_eq!(tree.code(143), code(0b10111111, 8));
        assert_eq!(tree.code(144), code(0b110010000, 9));
        assert_eq!(tree.code(255), code(0b111111111, 9));
        assert_eq!(tree.code(256), code(0b0000000, 7));
        assert_eq!(tree.code(279), code(0b0010111, 7));
        assert_eq!(tree.code(280), code(0b11000000, 8));
        assert_eq!(tree.code(287), code(0b11000111, 8));
    }

    #[test]
    fn every_symbol_round_trips() {
        let mut fixed = vec![8_u8; 288];
        fixed[144..256].fill(9);
        fixed[256..280].fill(7);
        let tables: [Vec<u8>; 5] = [
            vec![2, 1, 3, 3],
            vec![3, 3, 3, 3, 3, 2, 4, 4],
            vec![3, 3, 3, 3, 3, 2, 4, 4, 0, 0],
            vec![0, 5, 0, 5, 4, 3, 2, 1],
            fixed,
        ];
        for lengths in &tables {
            let tree = HuffmanTree::from_lengths(lengths).unwrap();
            // every used symbol, forwards then backwards
            let used: Vec<usize> = (0..lengths.len()).filter(|&s| lengths[s] > 0).collect();
            let message: Vec<usize> = used.iter().chain(used.iter().rev()).copied().collect();
            let codes: Vec<Code> = message.iter().map(|&s| tree.code(s).unwrap()).collect();
            let bytes = pack(&codes);
            let mut reader = BitReader::new(&bytes);
            for &symbol in &message {
                assert_eq!(
                    tree.decode_symbol(&mut reader),
                    Ok(symbol as u16),
                    "lengths {lengths:?}"
                );
            }
        }
    }

    #[test]
    fn unused_symbols_have_no_code() {
        let tree = HuffmanTree::from_lengths(&[0, 1, 0, 1]).unwrap();
        assert_eq!(tree.code(0), None);
        assert_eq!(tree.code(2), None);
        assert_eq!(tree.code(9), None);
        assert_eq!(tree.symbol_count(), 2);
    }

    #[test]
    fn single_code_is_incomplete_but_valid() {
        let tree = HuffmanTree::from_lengths(&[0, 1]).unwrap();
        // "0" decodes to symbol 1
        assert_eq!(tree.decode_symbol(&mut BitReader::new(&[0b0])), Ok(1));
        // "1" was never assigned
        assert!(matches!(
            tree.decode_symbol(&mut BitReader::new(&[0b1])),
            Err(DecodeError::MalformedTree(_))
        ));
    }

    #[test]
    fn empty_code_cannot_decode() {
        let tree = HuffmanTree::from_lengths(&[0; 30]).unwrap();
        assert_eq!(tree.symbol_count(), 0);
        assert!(matches!(
            tree.decode_symbol(&mut BitReader::new(&[0xff])),
            Err(DecodeError::MalformedTree(_))
        ));
    }

    #[test]
    fn over_subscribed_lengths_are_rejected() {
        assert!(matches!(
            HuffmanTree::from_lengths(&[1, 1, 1]),
            Err(DecodeError::MalformedTree(_))
        ));
        assert!(matches!(
            HuffmanTree::from_lengths(&[16]),
            Err(DecodeError::MalformedTree(_))
        ));
    }

    #[test]
    fn truncated_input_is_reported() {
        let tree = HuffmanTree::from_lengths(&[3, 3, 3, 3, 3, 2, 4, 4]).unwrap();
        let mut reader = BitReader::new(&[]);
        assert_eq!(
            tree.decode_symbol(&mut reader),
            Err(DecodeError::StreamExhausted)
        );
    }
}
