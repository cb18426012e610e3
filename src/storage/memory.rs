//! In-memory backing store
//!
//! Files live in a table shared by every handle opened from the same
//! [`MemoryStorage`], so a file closed and reopened sees the content and the
//! last published attribute, exactly like a real filesystem would.

use crate::storage::{BackingFile, FileOptions, Storage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MemFile {
    content: Vec<u8>,
    attrs: HashMap<u8, Vec<u8>>,
}

type FileTable = Arc<Mutex<HashMap<String, MemFile>>>;

/// A RAM-backed [`Storage`]
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: FileTable,
}

impl MemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Published attribute bytes of a file, if any
    pub fn attribute(&self, path: &str, tag: u8) -> Option<Vec<u8>> {
        self.files
            .lock()
            .get(path)
            .and_then(|file| file.attrs.get(&tag).cloned())
    }

    /// Snapshot of a file's content
    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().get(path).map(|file| file.content.clone())
    }

    /// Overwrite part of a file's content directly, bypassing any handle
    pub fn patch_content(&self, path: &str, offset: usize, bytes: &[u8]) -> io::Result<()> {
        let mut files = self.files.lock();
        let file = files.get_mut(path).ok_or_else(|| not_found(path))?;
        let end = offset + bytes.len();
        if file.content.len() < end {
            file.content.resize(end, 0);
        }
        file.content[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Shorten a file's content, bypassing any handle
    pub fn truncate(&self, path: &str, len: usize) -> io::Result<()> {
        let mut files = self.files.lock();
        let file = files.get_mut(path).ok_or_else(|| not_found(path))?;
        file.content.truncate(len);
        Ok(())
    }

    /// Replace a file's published attribute, bypassing any handle
    pub fn patch_attribute(&self, path: &str, tag: u8, bytes: &[u8]) -> io::Result<()> {
        let mut files = self.files.lock();
        let file = files.get_mut(path).ok_or_else(|| not_found(path))?;
        file.attrs.insert(tag, bytes.to_vec());
        Ok(())
    }
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such file: {}", path))
}

impl Storage for MemoryStorage {
    type File = MemoryFile;

    fn open(&self, path: &str, options: FileOptions) -> io::Result<MemoryFile> {
        let mut files = self.files.lock();
        let file = files.entry(path.to_string()).or_default();

        let mut attr = vec![0u8; options.attr_size];
        if let Some(stored) = file.attrs.get(&options.attr_tag) {
            let n = stored.len().min(attr.len());
            attr[..n].copy_from_slice(&stored[..n]);
        }

        Ok(MemoryFile {
            files: Arc::clone(&self.files),
            path: path.to_string(),
            attr_tag: options.attr_tag,
            attr,
            pos: 0,
            dirty: false,
            buffer: options.buffer,
        })
    }

    fn stat(&self, path: &str) -> io::Result<u64> {
        self.files
            .lock()
            .get(path)
            .map(|file| file.content.len() as u64)
            .ok_or_else(|| not_found(path))
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        self.files
            .lock()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }
}

/// An open file in a [`MemoryStorage`]
#[derive(Debug)]
pub struct MemoryFile {
    files: FileTable,
    path: String,
    attr_tag: u8,
    attr: Vec<u8>,
    pos: u64,
    dirty: bool,
    buffer: Option<Vec<u8>>,
}

impl MemoryFile {
    fn with_file<T>(&self, f: impl FnOnce(&mut MemFile) -> T) -> io::Result<T> {
        let mut files = self.files.lock();
        let file = files.get_mut(&self.path).ok_or_else(|| not_found(&self.path))?;
        Ok(f(file))
    }
}

impl BackingFile for MemoryFile {
    fn seek(&mut self, offset: u64) -> io::Result<u64> {
        self.pos = offset;
        Ok(offset)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pos = self.pos as usize;
        let n = self.with_file(|file| {
            let end = file.content.len().min(pos.saturating_add(buf.len()));
            let n = end.saturating_sub(pos);
            if n > 0 {
                buf[..n].copy_from_slice(&file.content[pos..end]);
            }
            n
        })?;
        self.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let pos = self.pos as usize;
        self.with_file(|file| {
            let end = pos + data.len();
            if file.content.len() < end {
                file.content.resize(end, 0);
            }
            file.content[pos..end].copy_from_slice(data);
        })?;
        self.pos += data.len() as u64;
        self.dirty = true;
        Ok(())
    }

    fn attribute(&self) -> &[u8] {
        &self.attr
    }

    fn set_attribute(&mut self, bytes: &[u8]) {
        self.attr.clear();
        self.attr.extend_from_slice(bytes);
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn sync(&mut self) -> io::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let tag = self.attr_tag;
        let attr = self.attr.clone();
        self.with_file(|file| {
            file.attrs.insert(tag, attr);
        })?;
        self.dirty = false;
        Ok(())
    }

    fn close(mut self) -> io::Result<Option<Vec<u8>>> {
        self.sync()?;
        Ok(self.buffer.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> FileOptions {
        FileOptions {
            attr_tag: 0xCB,
            attr_size: 12,
            buffer: None,
        }
    }

    #[test]
    fn test_open_creates_zeroed_attribute() {
        let storage = MemoryStorage::new();
        let file = storage.open("a.cb", options()).unwrap();
        assert_eq!(file.attribute(), &[0u8; 12]);
        assert_eq!(storage.stat("a.cb").unwrap(), 0);
        assert!(storage.attribute("a.cb", 0xCB).is_none());
    }

    #[test]
    fn test_write_read_and_short_read_at_end() {
        let storage = MemoryStorage::new();
        let mut file = storage.open("a.cb", options()).unwrap();
        file.write(b"hello").unwrap();
        file.rewind().unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(file.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");

        file.seek(3).unwrap();
        assert_eq!(file.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"lo");

        file.seek(10).unwrap();
        assert_eq!(file.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_write_past_end_zero_fills() {
        let storage = MemoryStorage::new();
        let mut file = storage.open("a.cb", options()).unwrap();
        file.seek(4).unwrap();
        file.write(b"xy").unwrap();
        assert_eq!(storage.content("a.cb").unwrap(), vec![0, 0, 0, 0, b'x', b'y']);
    }

    #[test]
    fn test_attribute_only_published_when_dirty() {
        let storage = MemoryStorage::new();
        let mut file = storage.open("a.cb", options()).unwrap();

        file.set_attribute(&[1; 12]);
        file.sync().unwrap();
        assert!(storage.attribute("a.cb", 0xCB).is_none());

        file.mark_dirty();
        file.sync().unwrap();
        assert_eq!(storage.attribute("a.cb", 0xCB).unwrap(), vec![1; 12]);
    }

    #[test]
    fn test_reopen_loads_attribute() {
        let storage = MemoryStorage::new();
        let mut file = storage.open("a.cb", options()).unwrap();
        file.set_attribute(&[7; 12]);
        file.mark_dirty();
        file.close().unwrap();

        let file = storage.open("a.cb", options()).unwrap();
        assert_eq!(file.attribute(), &[7; 12]);

        let other_tag = FileOptions {
            attr_tag: 0x01,
            ..options()
        };
        let file = storage.open("a.cb", other_tag).unwrap();
        assert_eq!(file.attribute(), &[0; 12]);
    }

    #[test]
    fn test_close_returns_scratch_buffer() {
        let storage = MemoryStorage::new();
        let file = storage
            .open(
                "a.cb",
                FileOptions {
                    buffer: Some(vec![0; 32]),
                    ..options()
                },
            )
            .unwrap();
        assert_eq!(file.close().unwrap().map(|b| b.len()), Some(32));
    }

    #[test]
    fn test_remove_and_missing_files() {
        let storage = MemoryStorage::new();
        storage.open("a.cb", options()).unwrap();
        storage.remove("a.cb").unwrap();
        assert_eq!(
            storage.stat("a.cb").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
        assert_eq!(
            storage.remove("a.cb").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }
}
