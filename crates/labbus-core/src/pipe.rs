//! The byte-pipe collaborator contract.
//!
//! A [`BytePipe`] is the abstract transport a [`crate::bus::Bus`] is built
//! on. Concrete serial drivers, TCP sockets, or in-memory test doubles all
//! implement it. This crate never assumes anything about baud rate, framing
//! bits, or parity — those are the collaborator's concern.

use thiserror::Error;

/// Errors raised by a [`BytePipe`] implementation.
#[derive(Error, Debug)]
pub enum PipeError {
    /// An operation was attempted while the pipe was not open.
    #[error("pipe is not open")]
    NotOpen,

    /// `open()` failed.
    #[error("failed to open pipe: {0}")]
    OpenFailed(String),

    /// `write_bytes` could not write the full buffer.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// `write_bytes` wrote fewer bytes than requested without erroring.
    #[error("short write: wrote {written} of {requested} bytes")]
    ShortWrite {
        /// Bytes actually written.
        written: usize,
        /// Bytes requested to write.
        requested: usize,
    },

    /// `read_nonblocking` failed.
    #[error("read failed: {0}")]
    ReadFailed(String),
}

/// Abstract byte pipe a [`crate::bus::Bus`] transmits and receives over.
///
/// Implementations are synchronous; the bus offloads blocking operations
/// onto a worker thread (see `Bus::open`).
pub trait BytePipe: Send + 'static {
    /// Open the underlying transport.
    ///
    /// # Errors
    ///
    /// Returns [`PipeError::OpenFailed`] if the transport could not be
    /// opened.
    fn open(&mut self) -> Result<(), PipeError>;

    /// Close the underlying transport. Idempotent.
    fn close(&mut self);

    /// `true` if the transport is currently open.
    fn is_open(&self) -> bool;

    /// Write every byte in `bytes` to the transport.
    ///
    /// # Errors
    ///
    /// Returns [`PipeError::NotOpen`] if the pipe isn't open,
    /// [`PipeError::WriteFailed`] on an I/O failure, or
    /// [`PipeError::ShortWrite`] if fewer bytes were written than requested.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), PipeError>;

    /// Read up to `max_bytes` without blocking.
    ///
    /// Returns an empty vector if no data is currently available. Never
    /// blocks waiting for data.
    ///
    /// # Errors
    ///
    /// Returns [`PipeError::NotOpen`] or [`PipeError::ReadFailed`].
    fn read_nonblocking(&mut self, max_bytes: usize) -> Result<Vec<u8>, PipeError>;
}
