//! File-backed persistent ring buffer
//!
//! This module provides the on-disk layout and the buffer built on it:
//!
//! - Position record tracking buffer state, stored as a file attribute
//! - Object headers framing records in object mode
//! - Wraparound I/O translating logical offsets into physical file offsets
//! - Persistent buffer implementing append, peek, take and discard
//! - Cursor-based reading for walking stored data without consuming it
//!
//! The file content is a raw circular region of exactly `capacity` bytes. The
//! buffer's state lives entirely in the 12-byte position record, which is
//! committed together with the content on every sync.

pub mod cursor;
pub mod persistent;
pub(crate) mod wrap;

/// Position record persisted in the file attribute
///
/// Layout (little endian):
///
/// | bytes | field |
/// |-------|-------|
/// | 0-3   | low 32 bits of the read position |
/// | 4-7   | high 32 bits of the read position |
/// | 8-11  | write distance (unread bytes) |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionRecord {
    /// Low 32 bits of the read position
    pub read_low: u32,
    /// High 32 bits of the read position
    pub read_high: u32,
    /// Number of bytes stored and not yet consumed
    pub write_dist: u32,
}

impl PositionRecord {
    /// Size of the encoded record in bytes
    pub const SIZE: usize = 12;

    /// Record for a buffer that has consumed `read_pos` bytes and holds `write_dist`
    pub fn new(read_pos: u64, write_dist: u32) -> Self {
        let mut record = Self {
            read_low: 0,
            read_high: 0,
            write_dist,
        };
        record.set_read_pos(read_pos);
        record
    }

    /// Decode a record from its attribute bytes
    pub fn decode(bytes: &[u8; Self::SIZE]) -> Self {
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        Self {
            read_low: word(0),
            read_high: word(4),
            write_dist: word(8),
        }
    }

    /// Encode the record into its attribute bytes
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.read_low.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.read_high.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.write_dist.to_le_bytes());
        bytes
    }

    /// Total number of bytes ever consumed
    pub fn read_pos(&self) -> u64 {
        ((self.read_high as u64) << 32) | self.read_low as u64
    }

    /// Split `read_pos` into the low and high words
    pub fn set_read_pos(&mut self, read_pos: u64) {
        self.read_low = read_pos as u32;
        self.read_high = (read_pos >> 32) as u32;
    }

    /// Logical write cursor
    pub fn write_pos(&self) -> u64 {
        self.read_pos() + self.write_dist as u64
    }
}

/// Length prefix of an object record
///
/// Every object is stored as a 4-byte little-endian length followed by
/// exactly that many content bytes. Zero-length objects are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Length of the object content in bytes
    pub len: u32,
}

impl ObjectHeader {
    /// Size of the header in bytes
    pub const SIZE: u32 = 4;

    /// Create a header for an object of `len` bytes
    pub fn new(len: u32) -> Self {
        Self { len }
    }

    /// Decode a header
    pub fn decode(bytes: [u8; Self::SIZE as usize]) -> Self {
        Self {
            len: u32::from_le_bytes(bytes),
        }
    }

    /// Encode the header
    pub fn encode(&self) -> [u8; Self::SIZE as usize] {
        self.len.to_le_bytes()
    }

    /// Bytes occupied by the framed object
    pub fn framed_len(&self) -> u64 {
        Self::SIZE as u64 + self.len as u64
    }
}
