//! Configuration for opening a persistent ring buffer

use crate::error::{Result, RingError};

/// Default attribute tag under which the position record is stored
pub const DEFAULT_ATTR_TAG: u8 = 0xCB;

/// Default capacity of a ring buffer file in bytes
pub const DEFAULT_CAPACITY: u32 = 4 * 1024;

/// How data stored in the buffer is grouped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// A plain sequence of bytes. Reads may split or join write boundaries.
    #[default]
    Stream,
    /// A queue of length-framed objects, each written and read as a whole.
    /// When data has to be overwritten, whole objects are evicted.
    Object,
}

impl TryFrom<u8> for Mode {
    type Error = RingError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Mode::Stream),
            1 => Ok(Mode::Object),
            other => Err(RingError::invalid(format!("unknown buffer mode {}", other))),
        }
    }
}

/// Whether an append may discard unread data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Fail with `NoSpace` instead of overwriting
    #[default]
    NoOverwrite,
    /// Evict the oldest data as needed
    Overwrite,
}

impl TryFrom<u8> for WriteMode {
    type Error = RingError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WriteMode::NoOverwrite),
            1 => Ok(WriteMode::Overwrite),
            other => Err(RingError::invalid(format!("unknown write mode {}", other))),
        }
    }
}

/// Configuration for a persistent ring buffer
#[derive(Debug, Clone)]
pub struct RingConfig {
    /// Attribute tag holding the position record
    pub attr_tag: u8,
    /// Total size of the backing file in bytes
    pub capacity: u32,
    /// Stream or object mode; must be the same on every open of a file
    pub mode: Mode,
    /// Optional caller-owned scratch buffer handed to the backing store.
    /// It is returned by `close`.
    pub file_buffer: Option<Vec<u8>>,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            attr_tag: DEFAULT_ATTR_TAG,
            capacity: DEFAULT_CAPACITY,
            mode: Mode::Stream,
            file_buffer: None,
        }
    }
}

impl RingConfig {
    /// Default configuration with the given capacity and mode
    pub fn new(capacity: u32, mode: Mode) -> Self {
        Self {
            capacity,
            mode,
            ..Self::default()
        }
    }

    /// Use a different attribute tag
    pub fn with_attr_tag(mut self, attr_tag: u8) -> Self {
        self.attr_tag = attr_tag;
        self
    }

    /// Hand a scratch buffer to the backing store
    pub fn with_file_buffer(mut self, buffer: Vec<u8>) -> Self {
        self.file_buffer = Some(buffer);
        self
    }

    /// Check the configuration before opening a file
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(RingError::invalid("capacity must be greater than zero"));
        }
        Ok(())
    }
}
