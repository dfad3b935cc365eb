//! Optional hook into the decoder's progress.
//!
//! The decoder reports what it does through [`Trace`]; nothing it decides
//! depends on what the hook does with the events.

use std::fmt::Display;

use crate::inflate::BlockType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    ZlibHeader {
        cmf: u8,
        flg: u8,
        window_size: usize,
    },
    BlockHeader {
        index: usize,
        is_final: bool,
        block_type: BlockType,
    },
    StoredBlock {
        len: u16,
    },
    DynamicTables {
        hlit: usize,
        hdist: usize,
        hclen: usize,
    },
    Literal(u8),
    BackReference {
        length: usize,
        distance: usize,
    },
    EndOfBlock {
        emitted: usize,
    },
    ZlibTrailer {
        expected: u32,
        computed: u32,
        trailing_bytes: usize,
    },
}

impl Display for TraceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceEvent::ZlibHeader {
                cmf,
                flg,
                window_size,
            } => write!(
                f,
                "zlib header CMF={cmf:#04x} FLG={flg:#04x} window={window_size}"
            ),
            TraceEvent::BlockHeader {
                index,
                is_final,
                block_type,
            } => write!(
                f,
                "block {index}: {block_type}{}",
                if *is_final { " (final)" } else { "" }
            ),
            TraceEvent::StoredBlock { len } => write!(f, "stored block of {len} bytes"),
            TraceEvent::DynamicTables { hlit, hdist, hclen } => {
                write!(f, "HLIT={hlit} HDIST={hdist} HCLEN={hclen}")
            }
            TraceEvent::Literal(byte) => write!(f, "literal {byte:#04x}"),
            TraceEvent::BackReference { length, distance } => {
                write!(f, "copy {length} bytes from {distance} back")
            }
            TraceEvent::EndOfBlock { emitted } => {
                write!(f, "end of block, {emitted} bytes so far")
            }
            TraceEvent::ZlibTrailer {
                expected,
                computed,
                trailing_bytes,
            } => write!(
                f,
                "ADLER-32 {expected:#010x} (computed {computed:#010x}), {trailing_bytes} trailing bytes"
            ),
        }
    }
}

pub trait Trace {
    fn event(&mut self, event: &TraceEvent);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTrace;

impl Trace for NoTrace {
    fn event(&mut self, _: &TraceEvent) {}
}

/// Forwards events to `tracing` at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTrace;

impl Trace for LogTrace {
    fn event(&mut self, event: &TraceEvent) {
        tracing::trace!(target: "pnginflate::decode", "{event}");
    }
}

impl<F: FnMut(&TraceEvent)> Trace for F {
    fn event(&mut self, event: &TraceEvent) {
        self(event)
    }
}
