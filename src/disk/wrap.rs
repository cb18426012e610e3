//! Wraparound I/O
//!
//! Logical offsets grow forever; the physical offset of a logical byte is
//! `logical % capacity`. A span that crosses the physical end of the file is
//! split into two I/O calls, the second one starting at offset 0.

use crate::error::{Result, RingError};
use crate::storage::BackingFile;

/// Physical start of a span and the number of bytes that fit before the end of the file
fn split(capacity: u32, logical_start: u64, len: usize) -> Result<(u64, usize)> {
    if len > capacity as usize {
        return Err(RingError::invalid(format!(
            "span of {} bytes exceeds capacity {}",
            len, capacity
        )));
    }
    let start = logical_start % capacity as u64;
    let room = (capacity as u64 - start) as usize;
    Ok((start, room.min(len)))
}

/// Write `data` at logical offset `logical_start`, then sync the file
pub(crate) fn write_wrapped<F: BackingFile>(
    file: &mut F,
    capacity: u32,
    logical_start: u64,
    data: &[u8],
) -> Result<()> {
    let (start, fit) = split(capacity, logical_start, data.len())?;

    file.seek(start)?;
    file.write(&data[..fit])?;

    if fit < data.len() {
        file.rewind()?;
        file.write(&data[fit..])?;
    }

    file.sync()?;
    Ok(())
}

/// Fill `buf` from logical offset `logical_start`
///
/// The caller guarantees that the range holds stored data, so a short read
/// from the backing file means the file and the position record disagree.
pub(crate) fn read_wrapped<F: BackingFile>(
    file: &mut F,
    capacity: u32,
    logical_start: u64,
    buf: &mut [u8],
) -> Result<()> {
    let (start, fit) = split(capacity, logical_start, buf.len())?;

    file.seek(start)?;
    read_exact(file, &mut buf[..fit], start)?;

    if fit < buf.len() {
        file.rewind()?;
        read_exact(file, &mut buf[fit..], 0)?;
    }

    Ok(())
}

fn read_exact<F: BackingFile>(file: &mut F, buf: &mut [u8], offset: u64) -> Result<()> {
    let n = file.read(buf)?;
    if n < buf.len() {
        return Err(RingError::corrupt(format!(
            "short read at offset {}: expected {} bytes, got {}",
            offset,
            buf.len(),
            n
        )));
    }
    Ok(())
}
