//! Backing store contract
//!
//! The ring buffer only needs a narrow view of a filesystem: named files with
//! random-access read/write, a durable sync, and one small out-of-band
//! attribute per file. This module defines that view and provides two
//! implementations:
//!
//! - [`memory::MemoryStorage`] keeps files in RAM (tests, volatile buffers)
//! - [`dir::DirStorage`] keeps files in a directory on the host filesystem
//!
//! # Attribute persistence
//!
//! The attribute is staged in the open file handle and only published by
//! [`BackingFile::sync`], and only when the handle is dirty. Content writes
//! mark the handle dirty; a change to the attribute alone does not, so callers
//! must call [`BackingFile::mark_dirty`] before syncing an attribute-only
//! update.

pub mod dir;
pub mod memory;

use std::io;

/// Options for opening a file in a [`Storage`]
#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    /// Tag of the attribute slot associated with the handle
    pub attr_tag: u8,
    /// Size of the attribute slot in bytes
    pub attr_size: usize,
    /// Optional caller-owned scratch buffer, returned by `close`
    pub buffer: Option<Vec<u8>>,
}

/// A store of named files
pub trait Storage {
    /// Handle type returned by [`Storage::open`]
    type File: BackingFile;

    /// Open a file for reading and writing, creating it if absent.
    ///
    /// The attribute slot is zero-initialized if the file has no attribute
    /// under `options.attr_tag`, and loaded verbatim otherwise.
    fn open(&self, path: &str, options: FileOptions) -> io::Result<Self::File>;

    /// Current size of the file content in bytes
    fn stat(&self, path: &str) -> io::Result<u64>;

    /// Remove a file and its attributes
    fn remove(&self, path: &str) -> io::Result<()>;
}

/// An open file in a [`Storage`]
pub trait BackingFile {
    /// Seek to an absolute offset, returning the new position
    fn seek(&mut self, offset: u64) -> io::Result<u64>;

    /// Seek to offset 0
    fn rewind(&mut self) -> io::Result<()> {
        self.seek(0).map(|_| ())
    }

    /// Read up to `buf.len()` bytes at the current position.
    ///
    /// Fewer bytes are returned only at the end of the file.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `data` at the current position, growing the file if needed
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// The staged attribute bytes
    fn attribute(&self) -> &[u8];

    /// Replace the staged attribute bytes. Does not mark the handle dirty.
    fn set_attribute(&mut self, bytes: &[u8]);

    /// Force the next sync to publish the attribute
    fn mark_dirty(&mut self);

    /// Durably commit content and, if dirty, the attribute
    fn sync(&mut self) -> io::Result<()>;

    /// Sync and release the handle, returning the scratch buffer if one was supplied
    fn close(self) -> io::Result<Option<Vec<u8>>>
    where
        Self: Sized;
}
