//! Directory-backed store
//!
//! Each file is stored as a regular file under a root directory. Attributes
//! live in sidecar files next to the content:
//!
//! ```text
//! <root>/<path>             raw content
//! <root>/<path>.<tag>.attr  [tag u8][len u8][len bytes][crc32 LE u32]
//! ```
//!
//! Sidecars are replaced atomically (write to `.tmp`, fsync, rename, fsync the
//! directory), and a sidecar that fails its CRC32 check is reported as
//! [`io::ErrorKind::InvalidData`] when the file is opened. A sync that finds
//! the staged attribute identical to the last published one leaves the
//! sidecar alone.
//!
//! If the caller supplies a scratch buffer, contiguous writes are collected in
//! it and flushed before reads, seeks elsewhere, and syncs.

use crate::storage::{BackingFile, FileOptions, Storage};
use crc32fast::Hasher;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A [`Storage`] rooted at a host directory
#[derive(Debug, Clone)]
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    /// Use `root` as the store's directory, creating it if needed
    pub fn new<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path of a file's content
    pub fn content_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    /// Host path of a file's attribute sidecar
    pub fn attr_path(&self, path: &str, tag: u8) -> PathBuf {
        self.root.join(format!("{}.{:02x}.attr", path, tag))
    }
}

fn attr_crc(tag: u8, bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[tag, bytes.len() as u8]);
    hasher.update(bytes);
    hasher.finalize()
}

fn invalid_sidecar(path: &Path, reason: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("attribute sidecar {}: {}", path.display(), reason),
    )
}

/// Commit directory entries (creations, renames) of `dir`
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Load a sidecar, returning the attribute slot and whether a sidecar existed
fn load_attr(path: &Path, tag: u8, size: usize) -> io::Result<(Vec<u8>, bool)> {
    let mut attr = vec![0u8; size];
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((attr, false)),
        Err(e) => return Err(e),
    };

    if raw.len() < 6 {
        return Err(invalid_sidecar(path, "truncated"));
    }
    let len = raw[1] as usize;
    if raw[0] != tag || raw.len() != 2 + len + 4 {
        return Err(invalid_sidecar(path, "bad header"));
    }
    let bytes = &raw[2..2 + len];
    let mut crc = [0u8; 4];
    crc.copy_from_slice(&raw[2 + len..]);
    if u32::from_le_bytes(crc) != attr_crc(tag, bytes) {
        return Err(invalid_sidecar(path, "checksum mismatch"));
    }

    let n = len.min(size);
    attr[..n].copy_from_slice(&bytes[..n]);
    Ok((attr, true))
}

fn store_attr(path: &Path, tag: u8, bytes: &[u8]) -> io::Result<()> {
    if bytes.len() > u8::MAX as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "attribute larger than 255 bytes",
        ));
    }

    let mut raw = Vec::with_capacity(2 + bytes.len() + 4);
    raw.push(tag);
    raw.push(bytes.len() as u8);
    raw.extend_from_slice(bytes);
    raw.extend_from_slice(&attr_crc(tag, bytes).to_le_bytes());

    let tmp = path.with_extension("attr.tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&raw)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    sync_dir(parent_dir(path))
}

impl Storage for DirStorage {
    type File = DirFile;

    fn open(&self, path: &str, options: FileOptions) -> io::Result<DirFile> {
        let content_path = self.content_path(path);
        let attr_path = self.attr_path(path, options.attr_tag);

        let existed = content_path.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&content_path)?;
        if !existed {
            sync_dir(parent_dir(&content_path))?;
        }
        let (attr, present) = load_attr(&attr_path, options.attr_tag, options.attr_size)?;
        let published = present.then(|| attr.clone());

        let cache = options.buffer.map(|mut buffer| {
            buffer.clear();
            buffer
        });

        Ok(DirFile {
            file,
            attr_path,
            attr_tag: options.attr_tag,
            attr,
            published,
            pos: 0,
            dirty: false,
            cache,
            cache_off: 0,
        })
    }

    fn stat(&self, path: &str) -> io::Result<u64> {
        Ok(fs::metadata(self.content_path(path))?.len())
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        let content_path = self.content_path(path);
        fs::remove_file(&content_path)?;

        let prefix = match content_path.file_name() {
            Some(name) => format!("{}.", name.to_string_lossy()),
            None => return Ok(()),
        };
        let dir = parent_dir(&content_path);
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if is_sidecar(&name, &prefix) {
                fs::remove_file(entry.path())?;
            }
        }
        sync_dir(dir)
    }
}

/// `<prefix>xx.attr`, or `<prefix>xx.attr.tmp` left by an interrupted store
fn is_sidecar(name: &str, prefix: &str) -> bool {
    let Some(rest) = name.strip_prefix(prefix) else {
        return false;
    };
    let suffix = match rest.get(2..) {
        Some(suffix) => suffix,
        None => return false,
    };
    rest.as_bytes()[..2].iter().all(u8::is_ascii_hexdigit)
        && (suffix == ".attr" || suffix == ".attr.tmp")
}

/// An open file in a [`DirStorage`]
#[derive(Debug)]
pub struct DirFile {
    file: File,
    attr_path: PathBuf,
    attr_tag: u8,
    attr: Vec<u8>,
    /// Attribute bytes currently in the sidecar, if one exists
    published: Option<Vec<u8>>,
    pos: u64,
    dirty: bool,
    /// Pending writes, starting at `cache_off`
    cache: Option<Vec<u8>>,
    cache_off: u64,
}

impl DirFile {
    fn flush_cache(&mut self) -> io::Result<()> {
        if let Some(cache) = self.cache.as_mut() {
            if !cache.is_empty() {
                self.file.seek(SeekFrom::Start(self.cache_off))?;
                self.file.write_all(cache)?;
                cache.clear();
            }
        }
        Ok(())
    }

    fn write_through(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(self.pos))?;
        self.file.write_all(data)
    }
}

impl BackingFile for DirFile {
    fn seek(&mut self, offset: u64) -> io::Result<u64> {
        self.pos = offset;
        Ok(offset)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.flush_cache()?;
        self.file.seek(SeekFrom::Start(self.pos))?;

        let mut total = 0;
        while total < buf.len() {
            match self.file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        self.pos += total as u64;
        Ok(total)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.dirty = true;

        let Some((pending, capacity)) = self.cache.as_ref().map(|c| (c.len(), c.capacity())) else {
            self.write_through(data)?;
            self.pos += data.len() as u64;
            return Ok(());
        };

        let contiguous = pending == 0 || self.cache_off + pending as u64 == self.pos;
        if !contiguous || pending + data.len() > capacity {
            self.flush_cache()?;
        }

        if data.len() > capacity {
            self.write_through(data)?;
        } else if let Some(cache) = self.cache.as_mut() {
            if cache.is_empty() {
                self.cache_off = self.pos;
            }
            cache.extend_from_slice(data);
        }
        self.pos += data.len() as u64;
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
        self.flush_cache()?;
        if !self.dirty {
            return Ok(());
        }
        self.file.sync_data()?;
        if self.published.as_deref() != Some(self.attr.as_slice()) {
            store_attr(&self.attr_path, self.attr_tag, &self.attr)?;
            self.published = Some(self.attr.clone());
        }
        self.dirty = false;
        Ok(())
    }

    fn close(mut self) -> io::Result<Option<Vec<u8>>> {
        self.sync()?;
        Ok(self.cache.take())
    }
}
