//! Basic usage example for the sherlog ringfile
//!
//! This example demonstrates:
//! 1. Opening an object-mode ring buffer in a directory-backed store
//! 2. Appending log records, overwriting the oldest ones once full
//! 3. Closing and reopening the buffer to show the state survives
//! 4. Reading records back with a cursor, then consuming them
//!
//! Set `RUST_LOG=sherlog_ringfile=trace` to see every buffer operation.

use sherlog_ringfile::{
    Cursor, DirStorage, Mode, PersistentRingBuffer, RingConfig, RingError, Storage, WriteMode,
};
use tracing_subscriber::EnvFilter;

// Severity tags prefixed to each record
const TAG_INFO: u8 = 1;
const TAG_WARNING: u8 = 2;
const TAG_ERROR: u8 = 3;

fn record(tag: u8, message: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(message.len() + 1);
    data.push(tag);
    data.extend_from_slice(message.as_bytes());
    data
}

fn main() -> Result<(), RingError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let dir = std::env::temp_dir().join("sherlog_ringfile_example");
    let storage = DirStorage::new(&dir)?;
    println!("Using ring buffer files in: {:?}", dir);

    // 1 KiB of records, with a scratch buffer to coalesce small writes
    let config = || {
        RingConfig::new(1024, Mode::Object).with_file_buffer(Vec::with_capacity(128))
    };

    let mut ring = PersistentRingBuffer::open(&storage, "events.cb", config())?;

    for i in 0..100 {
        let tag = match i % 10 {
            0 => TAG_ERROR,
            1 | 2 => TAG_WARNING,
            _ => TAG_INFO,
        };
        let data = record(tag, &format!("event {} from sensor {}", i, i % 4));
        ring.append(&data, WriteMode::Overwrite)?;
    }

    println!(
        "Stored {} bytes, read position {}",
        ring.len(),
        ring.read_position()
    );
    ring.close()?;

    // Reopen: the buffer resumes from its persisted position record
    let mut ring = PersistentRingBuffer::open(&storage, "events.cb", config())?;
    println!("Reopened with {} records", ring.object_count()?);

    let mut counts = [0usize; 4];
    let mut cursor = Cursor::new(&mut ring);
    loop {
        let batch = cursor.read_batch(16)?;
        if batch.is_empty() {
            break;
        }
        for item in batch {
            if let Some(&tag) = item.first() {
                counts[tag as usize % counts.len()] += 1;
            }
        }
    }
    cursor.commit()?;

    println!("  - Info records: {}", counts[TAG_INFO as usize]);
    println!("  - Warning records: {}", counts[TAG_WARNING as usize]);
    println!("  - Error records: {}", counts[TAG_ERROR as usize]);
    println!("Buffer empty after commit: {}", ring.is_empty());

    ring.close()?;
    storage.remove("events.cb")?;
    println!("Example completed successfully");
    Ok(())
}
