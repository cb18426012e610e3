//! Error types for the persistent ring buffer
//!
//! Every buffer operation returns [`Result`]. Conditions detected by the ring
//! itself get their own variant; errors raised by the backing store are passed
//! through unchanged as [`RingError::Io`].

use std::io;
use thiserror::Error;

/// Error types for the persistent ring buffer
#[derive(Debug, Error)]
pub enum RingError {
    /// Not enough room for the write under the requested write mode.
    /// The buffer is left unmodified.
    #[error("no space left in ring buffer: need {needed} bytes, {available} available")]
    NoSpace {
        /// Bytes the write would occupy
        needed: u64,
        /// Bytes the write mode allows to be used
        available: u64,
    },

    /// Object-mode read with nothing stored
    #[error("no object stored in ring buffer")]
    NotFound,

    /// The caller's buffer cannot hold the next object
    #[error("buffer too small for next object: need {needed} bytes, got {provided}")]
    NoMemory {
        /// Size of the next object
        needed: u32,
        /// Size of the caller's buffer
        provided: usize,
    },

    /// Stored data disagrees with the persisted position record
    #[error("ring buffer corrupt: {0}")]
    Corrupt(String),

    /// Malformed call or configuration
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Backing store failure
    #[error("backing store error: {0}")]
    Io(#[from] io::Error),
}

/// Discriminant of a [`RingError`] without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`RingError::NoSpace`]
    NoSpace,
    /// See [`RingError::NotFound`]
    NotFound,
    /// See [`RingError::NoMemory`]
    NoMemory,
    /// See [`RingError::Corrupt`]
    Corrupt,
    /// See [`RingError::InvalidArgument`]
    InvalidArgument,
    /// See [`RingError::Io`]
    Io,
}

impl RingError {
    /// The kind of this error, for matching without the payload
    pub fn kind(&self) -> ErrorKind {
        match self {
            RingError::NoSpace { .. } => ErrorKind::NoSpace,
            RingError::NotFound => ErrorKind::NotFound,
            RingError::NoMemory { .. } => ErrorKind::NoMemory,
            RingError::Corrupt(_) => ErrorKind::Corrupt,
            RingError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            RingError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!(reason = %msg, "ring buffer corruption detected");
        RingError::Corrupt(msg)
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        RingError::InvalidArgument(msg.into())
    }
}

/// Result type for ring buffer operations
pub type Result<T> = std::result::Result<T, RingError>;
