use std::{
    fs,
    io::{stdout, Write},
    path::Path,
};

use anyhow::Context;
use pnginflate::{
    bitstream::ByteWriter,
    png::Png,
    trace::{LogTrace, NoTrace, Trace},
    zlib::{self, Inflated},
};

/// Flags shared by every subcommand.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub trace_events: bool,
    pub lenient: bool,
}

impl Options {
    fn tracer(&self) -> Box<dyn Trace> {
        if self.trace_events {
            Box::new(LogTrace)
        } else {
            Box::new(NoTrace)
        }
    }

    /// Hands back the inflated bytes, failing on a checksum mismatch unless
    /// lenient.
    fn check(&self, inflated: Inflated) -> anyhow::Result<Vec<u8>> {
        if inflated.checksum_matches() {
            return Ok(inflated.data);
        }
        if !self.lenient {
            return inflated.verify().context("verifying the ADLER-32 checksum");
        }
        tracing::warn!(
            "ADLER-32 mismatch: stream says {:#010x}, data has {:#010x}",
            inflated.expected_checksum,
            inflated.computed_checksum
        );
        Ok(inflated.data)
    }
}

fn write_output(bytes: &[u8], output: Option<&Path>) -> anyhow::Result<()> {
    match output {
        Some(path) => fs::write(path, bytes).context(format!("writing to {}", path.display())),
        None => {
            stdout().write_all(bytes)?;
            stdout().flush().context("flushing stdout")
        }
    }
}

pub fn png_info(file: &Path, options: &Options) -> anyhow::Result<()> {
    let bytes = fs::read(file).context(format!("reading from {}", file.display()))?;
    let png = Png::parse(&bytes, options.lenient).context("parsing PNG file")?;
    for chunk in png.chunks() {
        let chunk_type = chunk.chunk_type();
        println!(
            "Chunk {chunk_type}: {} bytes, CRC {:#010x}{}",
            chunk.data().len(),
            chunk.crc(),
            if chunk.crc_matches() { "" } else { " (mismatch)" }
        );
        println!(
            "  critical: {}, public: {}, safe to copy: {}",
            chunk_type.is_critical(),
            chunk_type.is_public(),
            chunk_type.is_safe_to_copy()
        );
        match chunk.parse_data() {
            Ok(data) => {
                for line in data.to_string().lines() {
                    println!("  {line}");
                }
            }
            Err(e) => println!("  invalid: {e:#}"),
        }
    }
    Ok(())
}

pub fn png_inflate(file: &Path, output: Option<&Path>, options: &Options) -> anyhow::Result<()> {
    let bytes = fs::read(file).context(format!("reading from {}", file.display()))?;
    let png = Png::parse(&bytes, options.lenient).context("parsing PNG file")?;
    let inflated = png.inflate(options.tracer().as_mut())?;
    tracing::info!(
        blocks = inflated.blocks,
        bytes = inflated.data.len(),
        "inflated image data"
    );
    write_output(&options.check(inflated)?, output)
}

pub fn zlib_metadata(file: &Path) -> anyhow::Result<()> {
    let bytes = fs::read(file).context(format!("reading from {}", file.display()))?;
    let stream: zlib::Stream = bytes.as_slice().try_into().context("decoding read bytes")?;
    print!("{stream}");
    Ok(())
}

pub fn zlib_inflate(file: &Path, output: Option<&Path>, options: &Options) -> anyhow::Result<()> {
    let bytes = fs::read(file).context(format!("reading from {}", file.display()))?;
    let stream: zlib::Stream = bytes.as_slice().try_into().context("decoding read bytes")?;
    let inflated = stream
        .inflate(ByteWriter::new(), options.tracer().as_mut())
        .context("inflating stream")?;
    if inflated.trailing_bytes > 0 {
        tracing::info!("ignoring {} bytes after the stream", inflated.trailing_bytes);
    }
    write_output(&options.check(inflated)?, output)
}
