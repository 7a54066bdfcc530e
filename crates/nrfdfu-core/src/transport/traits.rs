//! Byte-stream transport abstraction.
//!
//! Defines the `Transport` trait for non-blocking serial I/O,
//! allowing different implementations (serial port, mock, etc.).

use thiserror::Error;

use crate::reactor::Interest;

#[derive(Error, Debug)]
pub enum TransportError {
    /// Nothing can be transferred right now; wait for readiness.
    #[error("Operation would block")]
    WouldBlock,

    #[error("Failed to open port: {0}")]
    OpenFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    pub fn is_would_block(&self) -> bool {
        matches!(self, TransportError::WouldBlock)
    }
}

/// Abstract non-blocking byte-stream interface.
///
/// Reads and writes transfer what they can and return immediately.
/// `WouldBlock` is the signal to suspend until the reactor reports
/// readiness.
pub trait Transport: Send {
    /// Read up to `buf.len()` bytes. `Ok(0)` means nothing is available.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Write a prefix of `data`, returning how many bytes were accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Whether a read or write would make progress now.
    fn poll_ready(&mut self, interest: Interest) -> Result<bool, TransportError>;
}
