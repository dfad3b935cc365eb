//! A PNG decoder built around its own DEFLATE (RFC 1951) and zlib (RFC 1950)
//! implementation.

pub mod adler32;
pub mod bitstream;
pub mod crc32;
pub mod error;
pub mod huffman;
pub mod inflate;
pub mod png;
pub mod trace;
pub mod window;
pub mod zlib;

pub use adler32::adler32;
pub use crc32::crc32;
pub use error::DecodeError;
pub use inflate::inflate_raw;
pub use zlib::{inflate_zlib, inflate_zlib_with_capacity};
