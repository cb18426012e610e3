//! Cursor implementation for reading from the persistent ring buffer
//!
//! A cursor walks forward through the stored data, starting at the buffer's
//! read position, without consuming anything. This allows:
//!
//! - Inspecting everything in the buffer without removing it
//! - Batched reading of several objects at once
//! - Committing the cursor position as the new read position in one sync
//!
//! In object mode the cursor yields whole objects. In stream mode it yields
//! chunks of at most `chunk_size` bytes.

use crate::config::Mode;
use crate::disk::persistent::PersistentRingBuffer;
use crate::disk::ObjectHeader;
use crate::error::Result;
use crate::storage::BackingFile;

/// A cursor for reading stored data without consuming it
pub struct Cursor<'a, F: BackingFile> {
    /// Buffer being read
    buffer: &'a mut PersistentRingBuffer<F>,
    /// Distance from the buffer's read position
    offset: u64,
    /// Maximum chunk length in stream mode
    chunk_size: usize,
}

impl<'a, F: BackingFile> Cursor<'a, F> {
    /// Default maximum chunk length in stream mode
    pub const DEFAULT_CHUNK_SIZE: usize = 256;

    /// Create a cursor at the buffer's read position
    pub fn new(buffer: &'a mut PersistentRingBuffer<F>) -> Self {
        Self::with_chunk_size(buffer, Self::DEFAULT_CHUNK_SIZE)
    }

    /// Create a cursor yielding stream chunks of at most `chunk_size` bytes
    pub fn with_chunk_size(buffer: &'a mut PersistentRingBuffer<F>, chunk_size: usize) -> Self {
        Self {
            buffer,
            offset: 0,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Logical position of the cursor
    pub fn position(&self) -> u64 {
        self.buffer.read_position() + self.offset
    }

    /// Check if the cursor has reached the end of stored data
    pub fn at_end(&self) -> bool {
        self.offset >= self.buffer.len() as u64
    }

    /// Read the next object (object mode) or chunk (stream mode)
    pub fn next(&mut self) -> Result<Option<Vec<u8>>> {
        if self.at_end() {
            return Ok(None);
        }

        let len = match self.buffer.mode() {
            Mode::Stream => {
                let remaining = self.buffer.len() as u64 - self.offset;
                remaining.min(self.chunk_size as u64) as usize
            }
            Mode::Object => {
                (self.buffer.object_span(self.offset)? - ObjectHeader::SIZE as u64) as usize
            }
        };

        let mut data = vec![0u8; len];
        let (copied, consumed) = self.buffer.read_unit_at(self.offset, &mut data)?;
        data.truncate(copied);
        self.offset += consumed;
        Ok(Some(data))
    }

    /// Read up to `max_count` objects or chunks
    pub fn read_batch(&mut self, max_count: usize) -> Result<Vec<Vec<u8>>> {
        let mut items = Vec::with_capacity(max_count.min(64));

        for _ in 0..max_count {
            match self.next()? {
                Some(item) => items.push(item),
                None => break,
            }
        }

        Ok(items)
    }

    /// Move the cursor back to the buffer's read position
    pub fn rewind(&mut self) {
        self.offset = 0;
    }

    /// Commit the cursor position as the new read position of the buffer
    ///
    /// Everything the cursor has passed is consumed with a single position
    /// update.
    pub fn commit(self) -> Result<()> {
        if self.offset > 0 {
            self.buffer.advance_read(self.offset)?;
        }
        Ok(())
    }
}
