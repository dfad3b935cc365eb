use crate::{
    bitstream::ByteWriter,
    error::{DecodeError, Result},
};

/// Default LZ77 window, CINFO = 7.
pub const DEFAULT_WINDOW_SIZE: usize = 32 * 1024;

/// The last `capacity` bytes of output, kept around as the source of
/// back-references. Every byte that goes through the window is also written
/// to the output.
#[derive(Debug)]
pub struct SlidingWindow {
    history: Box<[u8]>,
    cursor: usize,
    emitted: usize,
    output: ByteWriter,
}

impl SlidingWindow {
    pub fn new(capacity: usize, output: ByteWriter) -> Self {
        debug_assert!(capacity > 0);
        Self {
            history: vec![0; capacity].into_boxed_slice(),
            cursor: 0,
            emitted: 0,
            output,
        }
    }

    pub fn capacity(&self) -> usize {
        self.history.len()
    }

    /// Total bytes emitted since the window was created.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn output(&self) -> &[u8] {
        self.output.as_slice()
    }

    pub fn into_output(self) -> ByteWriter {
        self.output
    }

    pub fn append(&mut self, byte: u8) -> Result<()> {
        self.output.put_byte(byte)?;
        self.history[self.cursor] = byte;
        self.cursor = (self.cursor + 1) % self.history.len();
        self.emitted += 1;
        Ok(())
    }

    /// Copies `length` bytes starting `distance` bytes back.
    ///
    /// Copying goes one byte at a time so that a copy longer than its
    /// distance repeats the bytes it has just written.
    pub fn copy_back(&mut self, length: usize, distance: usize) -> Result<()> {
        let available = self.emitted.min(self.history.len());
        if distance == 0 || distance > available {
            return Err(DecodeError::InvalidDistance {
                distance,
                available,
            });
        }
        let capacity = self.history.len();
        let mut src = (self.cursor + capacity - distance) % capacity;
        for _ in 0..length {
            self.append(self.history[src])?;
            src = (src + 1) % capacity;
        }
        Ok(())
    }
}
