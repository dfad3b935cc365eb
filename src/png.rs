//! The PNG chunk container: just enough of it to find the zlib stream the
//! image data lives in, check it, and describe what else the file carries.

use std::fmt::Display;

use anyhow::{bail, ensure, Context};

use crate::{
    bitstream::ByteWriter,
    crc32::Crc32,
    trace::Trace,
    zlib::{self, Inflated},
};

pub const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Largest chunk length the format allows (2^31 - 1).
const MAX_CHUNK_LENGTH: u32 = i32::MAX as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkType(pub [u8; 4]);

impl ChunkType {
    pub const IHDR: Self = Self(*b"IHDR");
    pub const PLTE: Self = Self(*b"PLTE");
    pub const IDAT: Self = Self(*b"IDAT");
    pub const IEND: Self = Self(*b"IEND");
    pub const GAMA: Self = Self(*b"gAMA");
    pub const SRGB: Self = Self(*b"sRGB");
    pub const PHYS: Self = Self(*b"pHYs");
    pub const TIME: Self = Self(*b"tIME");

    // bLOb  <-- 32 bit chunk type code represented in text form
    // ||||
    // |||+- Safe-to-copy bit is 1 (lowercase letter; bit 5 is 1)
    // ||+-- Reserved bit is 0     (uppercase letter; bit 5 is 0)
    // |+--- Private bit is 0      (uppercase letter; bit 5 is 0)
    // +---- Ancillary bit is 1    (lowercase letter; bit 5 is 1)
    pub fn is_critical(&self) -> bool {
        self.0[0] & 0x20 == 0
    }

    pub fn is_public(&self) -> bool {
        self.0[1] & 0x20 == 0
    }

    pub fn is_reserved_bit_valid(&self) -> bool {
        self.0[2] & 0x20 == 0
    }

    pub fn is_safe_to_copy(&self) -> bool {
        self.0[3] & 0x20 != 0
    }
}

impl Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &byte in &self.0 {
            write!(f, "{}", byte as char)?;
        }
        Ok(())
    }
}

impl TryFrom<&[u8]> for ChunkType {
    type Error = anyhow::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; 4] = bytes.try_into().context("chunk types are 4 bytes long")?;
        ensure!(
            bytes.iter().all(u8::is_ascii_alphabetic),
            "invalid chunk type {:02x?}: only ASCII letters allowed",
            bytes
        );
        Ok(Self(bytes))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<'a> {
    chunk_type: ChunkType,
    data: &'a [u8],
    crc: u32,
}

impl<'a> Chunk<'a> {
    pub fn chunk_type(&self) -> ChunkType {
        self.chunk_type
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn crc(&self) -> u32 {
        self.crc
    }

    /// CRC-32 over the chunk type and data, as the writer should have
    /// computed it.
    pub fn computed_crc(&self) -> u32 {
        let mut crc = Crc32::new();
        crc.update(&self.chunk_type.0);
        crc.update(self.data);
        crc.finish()
    }

    pub fn crc_matches(&self) -> bool {
        self.crc == self.computed_crc()
    }

    pub fn parse_data(&self) -> anyhow::Result<ChunkData> {
        let data = self.data;
        Ok(match self.chunk_type {
            ChunkType::IHDR => ChunkData::Header(data.try_into()?),
            ChunkType::PLTE => ChunkData::Palette(data.try_into()?),
            ChunkType::IDAT => ChunkData::ImageData(data.len()),
            ChunkType::IEND => ChunkData::End,
            ChunkType::GAMA => ChunkData::Gamma(data.try_into()?),
            ChunkType::SRGB => {
                ensure!(data.len() == 1, "sRGB chunks are 1 byte long");
                ChunkData::Srgb(data[0].try_into()?)
            }
            ChunkType::PHYS => ChunkData::Physical(data.try_into()?),
            ChunkType::TIME => ChunkData::Time(data.try_into()?),
            chunk_type if chunk_type.is_critical() => {
                bail!("unknown critical chunk {chunk_type}")
            }
            _ => ChunkData::Other,
        })
    }
}

/// Iterator over the chunks following the PNG signature.
pub struct Chunks<'a> {
    bytes: &'a [u8],
    byte_cursor: usize,
}

impl<'a> Chunks<'a> {
    pub fn new(bytes: &'a [u8]) -> anyhow::Result<Self> {
        ensure!(
            bytes.starts_with(&SIGNATURE),
            "not a PNG file: invalid signature"
        );
        Ok(Self {
            bytes,
            byte_cursor: SIGNATURE.len(),
        })
    }

    fn next_chunk(&mut self) -> anyhow::Result<Chunk<'a>> {
        let rest = &self.bytes[self.byte_cursor..];
        ensure!(
            rest.len() >= 12,
            "truncated chunk at offset {}",
            self.byte_cursor
        );
        let length = u32::from_be_bytes(rest[0..4].try_into()?);
        ensure!(
            length <= MAX_CHUNK_LENGTH,
            "chunk length {length} is too large"
        );
        let chunk_type: ChunkType = rest[4..8]
            .try_into()
            .context(format!("reading chunk type at offset {}", self.byte_cursor))?;
        let length = length as usize;
        let Some(data) = rest.get(8..8 + length) else {
            bail!(
                "{chunk_type} chunk claims {length} bytes but only {} are left",
                rest.len() - 8
            );
        };
        let Some(crc) = rest.get(8 + length..12 + length) else {
            bail!("{chunk_type} chunk is missing its CRC");
        };
        self.byte_cursor += 12 + length;
        Ok(Chunk {
            chunk_type,
            data,
            crc: u32::from_be_bytes(crc.try_into()?),
        })
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = anyhow::Result<Chunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.byte_cursor >= self.bytes.len() {
            return None;
        }
        let chunk = self.next_chunk();
        if chunk.is_err() {
            // there is no way to find the next chunk after a broken one
            self.byte_cursor = self.bytes.len();
        }
        Some(chunk)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorType {
    Grayscale,
    Truecolor,
    Indexed,
    GrayscaleAlpha,
    TruecolorAlpha,
}

impl ColorType {
    pub fn channels(&self) -> u32 {
        match self {
            ColorType::Grayscale | ColorType::Indexed => 1,
            ColorType::GrayscaleAlpha => 2,
            ColorType::Truecolor => 3,
            ColorType::TruecolorAlpha => 4,
        }
    }

    pub fn allows_bit_depth(&self, bit_depth: u8) -> bool {
        match self {
            ColorType::Grayscale => matches!(bit_depth, 1 | 2 | 4 | 8 | 16),
            ColorType::Indexed => matches!(bit_depth, 1 | 2 | 4 | 8),
            _ => matches!(bit_depth, 8 | 16),
        }
    }
}

impl TryFrom<u8> for ColorType {
    type Error = anyhow::Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(Self::Grayscale),
            2 => Ok(Self::Truecolor),
            3 => Ok(Self::Indexed),
            4 => Ok(Self::GrayscaleAlpha),
            6 => Ok(Self::TruecolorAlpha),
            b => bail!("invalid color type: {b}"),
        }
    }
}

impl Display for ColorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColorType::Grayscale => write!(f, "Grayscale (0)"),
            ColorType::Truecolor => write!(f, "Truecolor (RGB) (2)"),
            ColorType::Indexed => write!(f, "Indexed-color (Palette) (3)"),
            ColorType::GrayscaleAlpha => write!(f, "Grayscale with alpha (4)"),
            ColorType::TruecolorAlpha => write!(f, "Truecolor with alpha (RGBA) (6)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterlaceMethod {
    None,
    Adam7,
}

impl TryFrom<u8> for InterlaceMethod {
    type Error = anyhow::Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(Self::None),
            1 => Ok(Self::Adam7),
            b => bail!("invalid interlace method: {b}"),
        }
    }
}

/// (x start, y start, x step, y step) of each Adam7 pass.
const ADAM7_PASSES: [(u32, u32, u32, u32); 7] = [
    (0, 0, 8, 8),
    (4, 0, 8, 8),
    (0, 4, 4, 8),
    (2, 0, 4, 4),
    (0, 2, 2, 4),
    (1, 0, 2, 2),
    (0, 1, 1, 2),
];

// IHDR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: ColorType,
    pub interlace_method: InterlaceMethod,
}

impl ImageHeader {
    pub fn bits_per_pixel(&self) -> u32 {
        u32::from(self.bit_depth) * self.color_type.channels()
    }

    /// Bytes of one filtered scanline `width` pixels wide, filter type byte
    /// included.
    fn scanline_bytes(&self, width: u32) -> Option<usize> {
        let bits = u64::from(width) * u64::from(self.bits_per_pixel());
        usize::try_from(bits.div_ceil(8) + 1).ok()
    }

    fn pass_bytes(&self, width: u32, height: u32) -> Option<usize> {
        if width == 0 || height == 0 {
            return Some(0);
        }
        self.scanline_bytes(width)?
            .checked_mul(usize::try_from(height).ok()?)
    }

    /// Size of the inflated image data: every scanline of every pass with
    /// its filter type byte. `None` if it does not fit in memory.
    pub fn inflated_size(&self) -> Option<usize> {
        match self.interlace_method {
            InterlaceMethod::None => self.pass_bytes(self.width, self.height),
            InterlaceMethod::Adam7 => {
                ADAM7_PASSES
                    .iter()
                    .try_fold(0_usize, |total, &(x0, y0, dx, dy)| {
                        let width = self.width.saturating_sub(x0).div_ceil(dx);
                        let height = self.height.saturating_sub(y0).div_ceil(dy);
                        total.checked_add(self.pass_bytes(width, height)?)
                    })
            }
        }
    }
}

impl TryFrom<&[u8]> for ImageHeader {
    type Error = anyhow::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        ensure!(bytes.len() == 13, "IHDR chunks are 13 bytes long");
        let width = u32::from_be_bytes(bytes[0..4].try_into()?);
        let height = u32::from_be_bytes(bytes[4..8].try_into()?);
        ensure!(
            width > 0 && height > 0,
            "image dimensions must be non-zero (got {width}x{height})"
        );
        ensure!(
            width <= MAX_CHUNK_LENGTH && height <= MAX_CHUNK_LENGTH,
            "image dimensions must fit in 31 bits (got {width}x{height})"
        );
        let bit_depth = bytes[8];
        let color_type: ColorType = bytes[9].try_into()?;
        ensure!(
            color_type.allows_bit_depth(bit_depth),
            "bit depth {bit_depth} is not allowed for color type {color_type}"
        );
        ensure!(bytes[10] == 0, "unknown compression method {}", bytes[10]);
        ensure!(bytes[11] == 0, "unknown filter method {}", bytes[11]);
        Ok(Self {
            width,
            height,
            bit_depth,
            color_type,
            interlace_method: bytes[12].try_into()?,
        })
    }
}

impl Display for ImageHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Width: {} pixels", self.width)?;
        writeln!(f, "Height: {} pixels", self.height)?;
        writeln!(f, "Bit depth: {} bits per channel", self.bit_depth)?;
        writeln!(f, "Color type: {}", self.color_type)?;
        writeln!(f, "Compression method: Deflate (0)")?;
        writeln!(f, "Filter method: Adaptive filtering (0)")?;
        match self.interlace_method {
            InterlaceMethod::None => writeln!(f, "Interlace method: No interlace (0)")?,
            InterlaceMethod::Adam7 => writeln!(f, "Interlace method: Adam7 interlace (1)")?,
        }
        match self.inflated_size() {
            Some(size) => writeln!(f, "Inflated IDAT size: {size} bytes"),
            None => writeln!(f, "Inflated IDAT size: too large"),
        }
    }
}

// PLTE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette(pub Vec<[u8; 3]>);

impl TryFrom<&[u8]> for Palette {
    type Error = anyhow::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        ensure!(
            bytes.len() % 3 == 0,
            "PLTE palette length not divisible by 3"
        );
        ensure!(
            (1..=256).contains(&(bytes.len() / 3)),
            "PLTE palettes have between 1 and 256 entries (got {})",
            bytes.len() / 3
        );
        Ok(Self(
            bytes
                .chunks_exact(3)
                .map(|rgb| [rgb[0], rgb[1], rgb[2]])
                .collect(),
        ))
    }
}

impl Display for Palette {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Palette entries: {}", self.0.len())?;
        for (i, [r, g, b]) in self.0.iter().enumerate() {
            writeln!(f, "  {i:3}: #{r:02x}{g:02x}{b:02x}")?;
        }
        Ok(())
    }
}

// gAMA, the gamma exponent times 100000
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gamma(pub u32);

impl TryFrom<&[u8]> for Gamma {
    type Error = anyhow::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; 4] = bytes.try_into().context("gAMA chunks are 4 bytes long")?;
        Ok(Self(u32::from_be_bytes(bytes)))
    }
}

impl Display for Gamma {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Gamma: {:.5}", f64::from(self.0) / 100_000.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderingIntent {
    Perceptual,
    RelativeColorimetric,
    Saturation,
    AbsoluteColorimetric,
}

impl TryFrom<u8> for RenderingIntent {
    type Error = anyhow::Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(Self::Perceptual),
            1 => Ok(Self::RelativeColorimetric),
            2 => Ok(Self::Saturation),
            3 => Ok(Self::AbsoluteColorimetric),
            b => bail!("invalid sRGB rendering intent: {b}"),
        }
    }
}

impl Display for RenderingIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (name, value) = match self {
            RenderingIntent::Perceptual => ("Perceptual", 0),
            RenderingIntent::RelativeColorimetric => ("Relative colorimetric", 1),
            RenderingIntent::Saturation => ("Saturation", 2),
            RenderingIntent::AbsoluteColorimetric => ("Absolute colorimetric", 3),
        };
        writeln!(f, "Rendering intent: {name} ({value})")
    }
}

// pHYs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalDimensions {
    pub pixels_per_unit_x: u32,
    pub pixels_per_unit_y: u32,
    /// Units are metres; otherwise only the aspect ratio is known.
    pub in_metres: bool,
}

impl TryFrom<&[u8]> for PhysicalDimensions {
    type Error = anyhow::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        ensure!(bytes.len() == 9, "pHYs chunks are 9 bytes long");
        ensure!(bytes[8] <= 1, "invalid pHYs unit specifier {}", bytes[8]);
        Ok(Self {
            pixels_per_unit_x: u32::from_be_bytes(bytes[0..4].try_into()?),
            pixels_per_unit_y: u32::from_be_bytes(bytes[4..8].try_into()?),
            in_metres: bytes[8] == 1,
        })
    }
}

impl Display for PhysicalDimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const METRES_PER_INCH: f64 = 0.0254;
        const MM_PER_METRE: f64 = 1000.0;
        let x = f64::from(self.pixels_per_unit_x);
        let y = f64::from(self.pixels_per_unit_y);
        writeln!(f, "Pixel aspect ratio: {:.6}", x / y)?;
        if self.in_metres {
            writeln!(
                f,
                "Pixel dimensions: {:.6} x {:.6} mm",
                MM_PER_METRE / x,
                MM_PER_METRE / y
            )?;
            writeln!(
                f,
                "DPI: {:.2} x {:.2}",
                METRES_PER_INCH * x,
                METRES_PER_INCH * y
            )?;
        }
        Ok(())
    }
}

// tIME
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastModified {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl TryFrom<&[u8]> for LastModified {
    type Error = anyhow::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        ensure!(bytes.len() == 7, "tIME chunks are 7 bytes long");
        let time = Self {
            year: u16::from_be_bytes([bytes[0], bytes[1]]),
            month: bytes[2],
            day: bytes[3],
            hour: bytes[4],
            minute: bytes[5],
            second: bytes[6],
        };
        ensure!(
            (1..=12).contains(&time.month)
                && (1..=31).contains(&time.day)
                && time.hour <= 23
                && time.minute <= 59
                // leap seconds
                && time.second <= 60,
            "invalid tIME timestamp {time:?}"
        );
        Ok(time)
    }
}

impl Display for LastModified {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Last modified: {:04}-{:02}-{:02} {:02}:{:02}:{:02} UTC",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChunkData {
    Header(ImageHeader),
    Palette(Palette),
    ImageData(usize),
    End,
    Gamma(Gamma),
    Srgb(RenderingIntent),
    Physical(PhysicalDimensions),
    Time(LastModified),
    Other,
}

impl Display for ChunkData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkData::Header(header) => write!(f, "{header}"),
            ChunkData::Palette(palette) => write!(f, "{palette}"),
            ChunkData::ImageData(len) => writeln!(f, "Compressed image data: {len} bytes"),
            ChunkData::End | ChunkData::Other => Ok(()),
            ChunkData::Gamma(gamma) => write!(f, "{gamma}"),
            ChunkData::Srgb(intent) => write!(f, "{intent}"),
            ChunkData::Physical(dimensions) => write!(f, "{dimensions}"),
            ChunkData::Time(time) => write!(f, "{time}"),
        }
    }
}

/// A parsed PNG file: its chunks, header, and the concatenated IDAT payload.
#[derive(Debug)]
pub struct Png<'a> {
    chunks: Vec<Chunk<'a>>,
    header: ImageHeader,
    palette: Option<Palette>,
    image_data: Vec<u8>,
}

impl<'a> Png<'a> {
    /// Walks every chunk up to IEND. With `lenient`, CRC mismatches are
    /// logged instead of failing the parse.
    pub fn parse(bytes: &'a [u8], lenient: bool) -> anyhow::Result<Self> {
        let mut chunks = vec![];
        let mut header = None;
        let mut palette = None;
        let mut image_data = vec![];
        let mut image_data_ended = false;
        let mut seen_end = false;

        for chunk in Chunks::new(bytes)? {
            let chunk = chunk.context("reading chunk")?;
            let chunk_type = chunk.chunk_type();
            if !chunk.crc_matches() {
                let message = format!(
                    "{chunk_type} chunk CRC mismatch: {:#010x} != {:#010x}",
                    chunk.crc(),
                    chunk.computed_crc()
                );
                if !lenient {
                    bail!(message);
                }
                tracing::warn!("{message}");
            }
            ensure!(
                header.is_some() || chunk_type == ChunkType::IHDR,
                "the first chunk must be IHDR, found {chunk_type}"
            );
            if chunk_type != ChunkType::IDAT && !image_data.is_empty() {
                image_data_ended = true;
            }

            match chunk
                .parse_data()
                .context(format!("decoding {chunk_type} chunk"))?
            {
                ChunkData::Header(ihdr) => {
                    ensure!(header.is_none(), "more than one IHDR chunk");
                    header = Some(ihdr);
                }
                ChunkData::Palette(plte) => {
                    ensure!(image_data.is_empty(), "PLTE chunk after IDAT");
                    ensure!(palette.is_none(), "more than one PLTE chunk");
                    palette = Some(plte);
                }
                ChunkData::ImageData(_) => {
                    ensure!(!image_data_ended, "IDAT chunks must be consecutive");
                    image_data.extend_from_slice(chunk.data());
                }
                ChunkData::End => seen_end = true,
                _ => {}
            }
            tracing::debug!(%chunk_type, len = chunk.data().len(), "chunk");
            chunks.push(chunk);
            if seen_end {
                break;
            }
        }

        let Some(header) = header else {
            bail!("no IHDR chunk");
        };
        ensure!(seen_end, "no IEND chunk");
        ensure!(!image_data.is_empty(), "no IDAT chunk");
        if header.color_type == ColorType::Indexed {
            ensure!(palette.is_some(), "indexed-color image without a PLTE chunk");
        }
        Ok(Self {
            chunks,
            header,
            palette,
            image_data,
        })
    }

    pub fn chunks(&self) -> &[Chunk<'a>] {
        &self.chunks
    }

    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    pub fn palette(&self) -> Option<&Palette> {
        self.palette.as_ref()
    }

    /// The zlib stream split across the IDAT chunks.
    pub fn image_data(&self) -> &[u8] {
        &self.image_data
    }

    /// Inflates the image data into filtered scanlines. The output is capped
    /// at the size the header implies, and anything shorter is an error.
    pub fn inflate(&self, trace: &mut dyn Trace) -> anyhow::Result<Inflated> {
        let Some(expected) = self.header.inflated_size() else {
            bail!(
                "a {}x{} image is too large to decode",
                self.header.width,
                self.header.height
            );
        };
        let stream: zlib::Stream = self
            .image_data
            .as_slice()
            .try_into()
            .context("reading the zlib header of the image data")?;
        let inflated = stream
            .inflate(ByteWriter::with_capacity(expected), trace)
            .context("inflating the image data")?;
        ensure!(
            inflated.data.len() == expected,
            "image data inflated to {} bytes, expected {expected}",
            inflated.data.len()
        );
        Ok(inflated)
    }
}
