//! Sherlog Ringfile - a persistent circular buffer stored in a single
//! fixed-size file.
//!
//! # Overview
//!
//! The buffer gives embedded applications log-like append/consume semantics
//! over a storage backend that only offers random-access reads and writes on
//! named files plus a small out-of-band attribute per file:
//!
//! 1. The file content is a raw circular region of `capacity` bytes
//! 2. The read position and the amount of stored data live in a 12-byte
//!    position record stored as a file attribute
//!
//! Both are committed together on every sync, so the buffer survives power
//! loss and close/reopen cycles, and detects (rather than returns) data that
//! disagrees with its position record.
//!
//! # Key Features
//!
//! - Stream mode (plain bytes) or object mode (length-framed records)
//! - Optional overwrite of the oldest data, evicting whole objects in object mode
//! - Peek, take and discard, plus a non-consuming [`Cursor`]
//! - Pluggable backing stores: [`MemoryStorage`] and [`DirStorage`]
//!
//! # Usage
//!
//! ```
//! use sherlog_ringfile::{MemoryStorage, Mode, PersistentRingBuffer, RingConfig, WriteMode};
//!
//! let storage = MemoryStorage::new();
//! let config = RingConfig::new(4096, Mode::Object);
//! let mut ring = PersistentRingBuffer::open(&storage, "events.cb", config)?;
//!
//! ring.append(b"boot", WriteMode::NoOverwrite)?;
//! ring.append(b"sensor online", WriteMode::Overwrite)?;
//!
//! let mut buf = [0u8; 64];
//! let n = ring.take(&mut buf)?;
//! assert_eq!(&buf[..n], b"boot");
//! ring.close()?;
//! # Ok::<(), sherlog_ringfile::RingError>(())
//! ```

#![deny(missing_docs)]

pub mod config;
mod disk;
pub mod error;
pub mod storage;

pub use config::{Mode, RingConfig, WriteMode, DEFAULT_ATTR_TAG, DEFAULT_CAPACITY};
pub use disk::cursor::Cursor;
pub use disk::persistent::PersistentRingBuffer;
pub use error::{ErrorKind, Result, RingError};
pub use storage::dir::{DirFile, DirStorage};
pub use storage::memory::{MemoryFile, MemoryStorage};
pub use storage::{BackingFile, FileOptions, Storage};

/// Re-exported on-disk layout types
pub mod types {
    pub use crate::disk::{ObjectHeader, PositionRecord};
}
