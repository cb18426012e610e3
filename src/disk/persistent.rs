//! Persistent ring buffer implementation for file storage
//!
//! This module implements a single-producer single-consumer ring buffer on
//! top of a fixed-size file from a [`Storage`]. Key features include:
//!
//! - Position record kept in a file attribute, committed with every sync
//! - Stream mode (plain bytes) and object mode (length-framed records)
//! - Optional overwrite of the oldest data, evicting whole objects only
//! - Wrap-around handling for spans crossing the physical end of the file
//! - Corruption detection whenever the file disagrees with the position record
//!
//! Every mutating operation durably commits the file before returning. If a
//! late step fails (for example the final position sync), content may already
//! have been written beyond the committed write position. Those bytes are
//! never observed by reads and get overwritten by later appends.

use crate::config::{Mode, RingConfig, WriteMode};
use crate::disk::wrap::{read_wrapped, write_wrapped};
use crate::disk::{ObjectHeader, PositionRecord};
use crate::error::{Result, RingError};
use crate::storage::{BackingFile, FileOptions, Storage};
use tracing::{debug, trace};

const HEADER: u64 = ObjectHeader::SIZE as u64;

/// Persistent ring buffer backed by a file
///
/// All operations take `&mut self`: the buffer performs blocking I/O against
/// its backing file and is not meant to be shared between threads without
/// external locking.
#[derive(Debug)]
pub struct PersistentRingBuffer<F: BackingFile> {
    /// Name of the backing file
    path: String,
    /// Open backing file
    file: F,
    /// In-memory copy of the persisted position record
    position: PositionRecord,
    /// Size of the circular region in bytes
    capacity: u32,
    mode: Mode,
}

impl<F: BackingFile> PersistentRingBuffer<F> {
    /// Open or create a ring buffer file
    ///
    /// A new file starts out empty. An existing file resumes from its
    /// persisted position record; `config.mode` and `config.capacity` must be
    /// the ones the file was created with.
    ///
    /// # Arguments
    ///
    /// * `storage` - Backing store holding the file
    /// * `path` - Name of the file within the store
    /// * `config` - Buffer configuration
    pub fn open<S>(storage: &S, path: &str, config: RingConfig) -> Result<Self>
    where
        S: Storage<File = F>,
    {
        trace!(path, capacity = config.capacity, mode = ?config.mode, "open");
        config.validate()?;

        let options = FileOptions {
            attr_tag: config.attr_tag,
            attr_size: PositionRecord::SIZE,
            buffer: config.file_buffer,
        };
        let file = storage.open(path, options)?;

        let mut bytes = [0u8; PositionRecord::SIZE];
        let attr = file.attribute();
        let n = attr.len().min(bytes.len());
        bytes[..n].copy_from_slice(&attr[..n]);
        let position = PositionRecord::decode(&bytes);

        if position.write_dist > config.capacity {
            return Err(RingError::corrupt(format!(
                "{}: position record claims {} stored bytes, capacity is {}",
                path, position.write_dist, config.capacity
            )));
        }

        debug!(
            path,
            read_pos = position.read_pos(),
            write_dist = position.write_dist,
            "opened ring buffer"
        );

        Ok(Self {
            path: path.to_string(),
            file,
            position,
            capacity: config.capacity,
            mode: config.mode,
        })
    }

    /// Get the file name
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the buffer capacity in bytes
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Get the buffer mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Get a copy of the position record
    pub fn position(&self) -> PositionRecord {
        self.position
    }

    /// Total number of bytes ever consumed
    pub fn read_position(&self) -> u64 {
        self.position.read_pos()
    }

    /// Logical position of the next write
    pub fn write_position(&self) -> u64 {
        self.position.write_pos()
    }

    /// Number of stored, unread bytes (including object headers)
    pub fn len(&self) -> u32 {
        self.position.write_dist
    }

    /// Number of bytes that can be written without overwriting
    pub fn available(&self) -> u32 {
        self.capacity - self.position.write_dist
    }

    /// True if no data is stored
    pub fn is_empty(&self) -> bool {
        self.position.write_dist == 0
    }

    /// Append data to the buffer
    ///
    /// With [`WriteMode::NoOverwrite`], fails with `NoSpace` and leaves the
    /// buffer untouched if the data does not fit. With
    /// [`WriteMode::Overwrite`], the oldest data is discarded to make room;
    /// in object mode only whole objects are discarded.
    ///
    /// In stream mode with `Overwrite`, data longer than the capacity is
    /// accepted and only its last `capacity` bytes are stored. In object mode,
    /// each call stores one object, which can never exceed `capacity - 4` bytes.
    pub fn append(&mut self, data: &[u8], write_mode: WriteMode) -> Result<()> {
        trace!(path = %self.path, len = data.len(), ?write_mode, "append");

        let capacity = self.capacity as u64;
        let available = self.available() as u64;
        let overwrite = write_mode == WriteMode::Overwrite;

        let mut data = data;
        match self.mode {
            Mode::Object => {
                let effective = if overwrite { capacity } else { available };
                if effective < HEADER || data.len() as u64 > effective - HEADER {
                    return Err(RingError::NoSpace {
                        needed: data.len() as u64 + HEADER,
                        available: effective,
                    });
                }
            }
            Mode::Stream if overwrite => {
                if data.len() as u64 > capacity {
                    // Only the most recent bytes can be kept
                    data = &data[data.len() - self.capacity as usize..];
                }
            }
            Mode::Stream => {
                if data.len() as u64 > available {
                    return Err(RingError::NoSpace {
                        needed: data.len() as u64,
                        available,
                    });
                }
            }
        }

        let prefix = match self.mode {
            Mode::Object => HEADER,
            Mode::Stream => 0,
        };
        let write_size = data.len() as u64 + prefix;

        if overwrite && write_size > available {
            let overlap = write_size - available;
            let evicted = match self.mode {
                Mode::Stream => overlap,
                Mode::Object => self.walk_objects_until(overlap)?,
            };
            debug!(path = %self.path, overlap, evicted, "evicting old data");
            self.advance_read(evicted)?;
        }

        let write_pos = self.position.write_pos();
        if self.mode == Mode::Object {
            let header = ObjectHeader::new(data.len() as u32);
            write_wrapped(&mut self.file, self.capacity, write_pos, &header.encode())?;
        }
        write_wrapped(&mut self.file, self.capacity, write_pos + prefix, data)?;

        self.advance_write(write_size)
    }

    /// Read data without removing it
    ///
    /// In stream mode, copies `min(len(), buf.len())` bytes and returns the
    /// count; an empty buffer yields 0.
    ///
    /// In object mode, copies exactly one object and returns its size. Fails
    /// with `NotFound` if nothing is stored and with `NoMemory` if `buf` is
    /// smaller than the next object.
    pub fn peek(&mut self, buf: &mut [u8]) -> Result<usize> {
        trace!(path = %self.path, max_len = buf.len(), "peek");
        let (copied, _) = self.read_unit_at(0, buf)?;
        Ok(copied)
    }

    /// Read data and remove it
    ///
    /// Same as [`peek`](Self::peek), then advances the read position past
    /// what was returned. On error nothing is consumed.
    pub fn take(&mut self, buf: &mut [u8]) -> Result<usize> {
        trace!(path = %self.path, max_len = buf.len(), "take");
        let (copied, consumed) = self.read_unit_at(0, buf)?;
        self.advance_read(consumed)?;
        Ok(copied)
    }

    /// Discard data without reading it
    ///
    /// In stream mode `n` is a number of bytes, in object mode a number of
    /// objects. Fails with `InvalidArgument` if fewer are stored, leaving the
    /// buffer untouched. Discarding 0 always succeeds.
    pub fn discard(&mut self, n: u32) -> Result<()> {
        trace!(path = %self.path, n, "discard");
        let stored = self.position.write_dist as u64;

        let distance = match self.mode {
            Mode::Stream => {
                if n as u64 > stored {
                    return Err(RingError::invalid(format!(
                        "cannot discard {} bytes, {} stored",
                        n, stored
                    )));
                }
                n as u64
            }
            Mode::Object => {
                let mut dropped = 0;
                for i in 0..n {
                    if dropped == stored {
                        return Err(RingError::invalid(format!(
                            "cannot discard {} objects, {} stored",
                            n, i
                        )));
                    }
                    dropped += self.object_span(dropped)?;
                }
                dropped
            }
        };

        self.advance_read(distance)
    }

    /// Number of whole objects stored (object mode only)
    pub fn object_count(&mut self) -> Result<u32> {
        if self.mode != Mode::Object {
            return Err(RingError::invalid("object_count requires object mode"));
        }
        let stored = self.position.write_dist as u64;
        let mut offset = 0;
        let mut count = 0;
        while offset < stored {
            offset += self.object_span(offset)?;
            count += 1;
        }
        Ok(count)
    }

    /// Close the buffer, returning the scratch buffer if one was configured
    ///
    /// The persisted state survives; reopening the file resumes where this
    /// handle left off.
    pub fn close(self) -> Result<Option<Vec<u8>>> {
        trace!(path = %self.path, "close");
        Ok(self.file.close()?)
    }

    /// Read the unit (bytes or object) starting `offset` bytes past the read
    /// position into `buf`
    ///
    /// Returns the number of bytes copied and the number of stored bytes the
    /// unit occupies.
    pub(crate) fn read_unit_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(usize, u64)> {
        let stored = self.position.write_dist as u64;
        debug_assert!(offset <= stored);
        let start = self.position.read_pos() + offset;

        match self.mode {
            Mode::Stream => {
                let n = (stored - offset).min(buf.len() as u64) as usize;
                if n > 0 {
                    read_wrapped(&mut self.file, self.capacity, start, &mut buf[..n])?;
                }
                Ok((n, n as u64))
            }
            Mode::Object => {
                if stored == offset {
                    return Err(RingError::NotFound);
                }
                let header = self.object_header_at(offset)?;
                let len = header.len as usize;
                if len > buf.len() {
                    return Err(RingError::NoMemory {
                        needed: header.len,
                        provided: buf.len(),
                    });
                }
                if len > 0 {
                    read_wrapped(&mut self.file, self.capacity, start + HEADER, &mut buf[..len])?;
                }
                Ok((len, header.framed_len()))
            }
        }
    }

    /// Framed size of the object starting `offset` bytes past the read position
    pub(crate) fn object_span(&mut self, offset: u64) -> Result<u64> {
        Ok(self.object_header_at(offset)?.framed_len())
    }

    /// Read and validate the object header `offset` bytes past the read position
    fn object_header_at(&mut self, offset: u64) -> Result<ObjectHeader> {
        let stored = self.position.write_dist as u64;
        debug_assert!(offset <= stored);

        if stored - offset < HEADER {
            return Err(RingError::corrupt(format!(
                "{}: {} stored bytes cannot hold an object header",
                self.path,
                stored - offset
            )));
        }

        let mut bytes = [0u8; ObjectHeader::SIZE as usize];
        let start = self.position.read_pos() + offset;
        read_wrapped(&mut self.file, self.capacity, start, &mut bytes)?;
        let header = ObjectHeader::decode(bytes);

        if stored - offset - HEADER < header.len as u64 {
            return Err(RingError::corrupt(format!(
                "{}: object of {} bytes exceeds the {} stored bytes after its header",
                self.path,
                header.len,
                stored - offset - HEADER
            )));
        }
        Ok(header)
    }

    /// Sum whole objects from the read position until at least `overlap` bytes are covered
    fn walk_objects_until(&mut self, overlap: u64) -> Result<u64> {
        let mut dropped = 0;
        while dropped < overlap {
            dropped += self.object_span(dropped)?;
        }
        Ok(dropped)
    }

    /// Consume `distance` stored bytes and persist the new position
    pub(crate) fn advance_read(&mut self, distance: u64) -> Result<()> {
        debug_assert!(distance <= self.position.write_dist as u64);
        let read_pos = self.position.read_pos() + distance;
        self.position.set_read_pos(read_pos);
        self.position.write_dist -= distance as u32;
        self.persist_position()
    }

    fn advance_write(&mut self, distance: u64) -> Result<()> {
        debug_assert!(self.position.write_dist as u64 + distance <= self.capacity as u64);
        self.position.write_dist += distance as u32;
        self.persist_position()
    }

    fn persist_position(&mut self) -> Result<()> {
        self.file.set_attribute(&self.position.encode());
        // The store does not notice attribute-only changes on its own
        self.file.mark_dirty();
        self.file.sync()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::memory::{MemoryFile, MemoryStorage};

    fn open(storage: &MemoryStorage, capacity: u32, mode: Mode) -> PersistentRingBuffer<MemoryFile> {
        PersistentRingBuffer::open(storage, "ring.cb", RingConfig::new(capacity, mode)).unwrap()
    }

    #[test]
    fn test_create_new_buffer() {
        let storage = MemoryStorage::new();
        let buffer = open(&storage, 1024, Mode::Stream);

        assert_eq!(buffer.capacity(), 1024);
        assert_eq!(buffer.mode(), Mode::Stream);
        assert_eq!(buffer.path(), "ring.cb");
        assert_eq!(buffer.position(), PositionRecord::default());
        assert!(buffer.is_empty());
        assert_eq!(buffer.available(), 1024);
    }

    #[test]
    fn test_stream_append_take() {
        let storage = MemoryStorage::new();
        let mut buffer = open(&storage, 64, Mode::Stream);

        buffer.append(b"hello ", WriteMode::NoOverwrite).unwrap();
        buffer.append(b"world", WriteMode::NoOverwrite).unwrap();
        assert_eq!(buffer.len(), 11);

        let mut buf = [0u8; 4];
        assert_eq!(buffer.take(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"hell");

        let mut buf = [0u8; 32];
        assert_eq!(buffer.take(&mut buf).unwrap(), 7);
        assert_eq!(&buf[..7], b"o world");
        assert!(buffer.is_empty());
        assert_eq!(buffer.read_position(), 11);
        assert_eq!(buffer.take(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_position_persisted_in_attribute() {
        let storage = MemoryStorage::new();
        let mut buffer = open(&storage, 64, Mode::Stream);
        buffer.append(b"abcdef", WriteMode::NoOverwrite).unwrap();
        buffer.discard(2).unwrap();

        let attr = storage.attribute("ring.cb", 0xCB).unwrap();
        assert_eq!(attr, PositionRecord::new(2, 4).encode().to_vec());
    }

    #[test]
    fn test_buffer_reopen() {
        let storage = MemoryStorage::new();
        {
            let mut buffer = open(&storage, 16, Mode::Stream);
            buffer.append(b"0123456789", WriteMode::NoOverwrite).unwrap();
            buffer.discard(8).unwrap();
            buffer.append(b"abcdefgh", WriteMode::NoOverwrite).unwrap();
            buffer.close().unwrap();
        }

        let mut buffer = open(&storage, 16, Mode::Stream);
        assert_eq!(buffer.read_position(), 8);
        assert_eq!(buffer.len(), 10);
        let mut buf = [0u8; 16];
        assert_eq!(buffer.take(&mut buf).unwrap(), 10);
        assert_eq!(&buf[..10], b"89abcdefgh");
    }

    #[test]
    fn test_stream_overwrite_keeps_suffix() {
        let storage = MemoryStorage::new();
        let mut buffer = open(&storage, 8, Mode::Stream);
        buffer.append(b"xy", WriteMode::NoOverwrite).unwrap();
        buffer.append(b"0123456789AB", WriteMode::Overwrite).unwrap();

        assert_eq!(buffer.len(), 8);
        let mut buf = [0u8; 8];
        assert_eq!(buffer.peek(&mut buf).unwrap(), 8);
        assert_eq!(&buf, b"456789AB");
    }

    #[test]
    fn test_stream_overwrite_evicts_exact_overlap() {
        let storage = MemoryStorage::new();
        let mut buffer = open(&storage, 8, Mode::Stream);
        buffer.append(b"abcdef", WriteMode::NoOverwrite).unwrap();
        buffer.append(b"123", WriteMode::Overwrite).unwrap();

        assert_eq!(buffer.read_position(), 1);
        let mut buf = [0u8; 8];
        assert_eq!(buffer.take(&mut buf).unwrap(), 8);
        assert_eq!(&buf, b"bcdef123");
    }

    #[test]
    fn test_no_space_leaves_buffer_unmodified() {
        let storage = MemoryStorage::new();
        let mut buffer = open(&storage, 8, Mode::Stream);
        buffer.append(b"abcdef", WriteMode::NoOverwrite).unwrap();
        let before = buffer.position();

        let err = buffer.append(b"123", WriteMode::NoOverwrite).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSpace);
        assert_eq!(buffer.position(), before);
        assert_eq!(storage.content("ring.cb").unwrap(), b"abcdef".to_vec());
    }

    #[test]
    fn test_object_peek_take() {
        let storage = MemoryStorage::new();
        let mut buffer = open(&storage, 64, Mode::Object);

        let mut buf = [0u8; 16];
        assert_eq!(buffer.peek(&mut buf).unwrap_err().kind(), ErrorKind::NotFound);

        buffer.append(b"first", WriteMode::NoOverwrite).unwrap();
        buffer.append(b"", WriteMode::NoOverwrite).unwrap();
        buffer.append(b"third", WriteMode::NoOverwrite).unwrap();
        assert_eq!(buffer.len(), 5 + 4 + 0 + 4 + 5 + 4);
        assert_eq!(buffer.object_count().unwrap(), 3);

        let mut small = [0u8; 4];
        let err = buffer.take(&mut small).unwrap_err();
        assert!(matches!(err, RingError::NoMemory { needed: 5, provided: 4 }));
        assert_eq!(buffer.object_count().unwrap(), 3);

        assert_eq!(buffer.take(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"first");
        assert_eq!(buffer.take(&mut small).unwrap(), 0);
        assert_eq!(buffer.take(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"third");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_object_too_large_for_capacity() {
        let storage = MemoryStorage::new();
        let mut buffer = open(&storage, 16, Mode::Object);
        let err = buffer.append(&[0u8; 13], WriteMode::Overwrite).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSpace);
        buffer.append(&[0u8; 12], WriteMode::Overwrite).unwrap();
        assert_eq!(buffer.len(), 16);
    }

    #[test]
    fn test_object_tiny_capacity() {
        let storage = MemoryStorage::new();
        let mut buffer = open(&storage, 3, Mode::Object);
        let err = buffer.append(b"", WriteMode::Overwrite).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSpace);
    }

    #[test]
    fn test_object_overwrite_evicts_whole_objects() {
        let storage = MemoryStorage::new();
        let mut buffer = open(&storage, 32, Mode::Object);
        buffer.append(&[1u8; 6], WriteMode::NoOverwrite).unwrap(); // 10
        buffer.append(&[2u8; 6], WriteMode::NoOverwrite).unwrap(); // 20
        buffer.append(&[3u8; 4], WriteMode::NoOverwrite).unwrap(); // 28

        // Needs 8, 4 available: evicting the first object frees 10
        buffer.append(&[4u8; 4], WriteMode::Overwrite).unwrap();
        assert_eq!(buffer.read_position(), 10);
        assert_eq!(buffer.len(), 26);
        assert_eq!(buffer.object_count().unwrap(), 3);

        let mut buf = [0u8; 8];
        assert_eq!(buffer.take(&mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], &[2u8; 6]);
    }

    #[test]
    fn test_discard_objects() {
        let storage = MemoryStorage::new();
        let mut buffer = open(&storage, 64, Mode::Object);
        for i in 0..3u8 {
            buffer.append(&[i; 3], WriteMode::NoOverwrite).unwrap();
        }

        buffer.discard(0).unwrap();
        let err = buffer.discard(4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(buffer.object_count().unwrap(), 3);

        buffer.discard(2).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(buffer.peek(&mut buf).unwrap(), 3);
        assert_eq!(buf, [2u8; 3]);
    }

    #[test]
    fn test_discard_bytes_beyond_stored() {
        let storage = MemoryStorage::new();
        let mut buffer = open(&storage, 64, Mode::Stream);
        buffer.append(b"abc", WriteMode::NoOverwrite).unwrap();
        assert_eq!(buffer.discard(4).unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.object_count().unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_corrupt_header_detected() {
        let storage = MemoryStorage::new();
        let mut buffer = open(&storage, 64, Mode::Object);
        buffer.append(b"abc", WriteMode::NoOverwrite).unwrap();

        // Claim a 200-byte object where only 3 bytes follow the header
        storage.patch_content("ring.cb", 0, &200u32.to_le_bytes()).unwrap();
        let mut buf = [0u8; 256];
        assert_eq!(buffer.peek(&mut buf).unwrap_err().kind(), ErrorKind::Corrupt);
        assert_eq!(buffer.discard(1).unwrap_err().kind(), ErrorKind::Corrupt);
        assert_eq!(buffer.len(), 7);
    }

    #[test]
    fn test_record_claiming_too_much_is_corrupt() {
        let storage = MemoryStorage::new();
        open(&storage, 16, Mode::Stream).close().unwrap();
        storage
            .patch_attribute("ring.cb", 0xCB, &PositionRecord::new(0, 17).encode())
            .unwrap();

        let err = PersistentRingBuffer::open(&storage, "ring.cb", RingConfig::new(16, Mode::Stream))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn test_short_object_region_is_corrupt() {
        let storage = MemoryStorage::new();
        open(&storage, 16, Mode::Object).close().unwrap();
        storage
            .patch_attribute("ring.cb", 0xCB, &PositionRecord::new(0, 3).encode())
            .unwrap();

        let mut buffer = open(&storage, 16, Mode::Object);
        let mut buf = [0u8; 16];
        assert_eq!(buffer.peek(&mut buf).unwrap_err().kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn test_custom_attr_tag() {
        let storage = MemoryStorage::new();
        let config = RingConfig::new(32, Mode::Stream).with_attr_tag(0x10);
        let mut buffer = PersistentRingBuffer::open(&storage, "ring.cb", config).unwrap();
        buffer.append(b"abc", WriteMode::NoOverwrite).unwrap();

        assert!(storage.attribute("ring.cb", 0xCB).is_none());
        assert_eq!(
            storage.attribute("ring.cb", 0x10).unwrap(),
            PositionRecord::new(0, 3).encode().to_vec()
        );
    }
}
