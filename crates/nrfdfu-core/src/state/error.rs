//! Machine errors and their coarse classification.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::buffer::BufferError;
use crate::control::ControlError;
use crate::file_view::FileViewError;
use crate::protocol::{ObjectType, ResponseError};
use crate::transport::TransportError;

use super::machine::DfuPhase;

/// Failure classes reported by [`DfuError::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Allocation,
    TransportIo,
    FileIo,
    Framing,
    Protocol,
    Integrity,
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Allocation => "allocation",
            ErrorKind::TransportIo => "transport I/O",
            ErrorKind::FileIo => "file I/O",
            ErrorKind::Framing => "framing",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Timeout => "timeout",
        };
        write!(f, "{}", name)
    }
}

#[derive(Error, Debug)]
pub enum DfuError {
    #[error("Buffer: {0}")]
    Buffer(#[from] BufferError),

    #[error("Image file: {0}")]
    File(#[from] FileViewError),

    #[error("Transport: {0}")]
    Transport(#[from] TransportError),

    #[error("Control line: {0}")]
    Control(#[from] ControlError),

    #[error("Event loop: {0}")]
    EventLoop(#[from] io::Error),

    #[error("SLIP framing error")]
    Framing,

    #[error("No complete frame within {mtu} bytes")]
    FrameTooLong { mtu: usize },

    #[error("{0}")]
    Response(#[from] ResponseError),

    #[error("Ping nonce mismatch: sent {sent}, got {got}")]
    PingMismatch { sent: u8, got: u8 },

    #[error("MTU {mtu} is below the minimum of {min}")]
    MtuTooSmall { mtu: u16, min: usize },

    #[error("Select of {object} object reported offset {offset}, expected 0")]
    NonZeroSelectOffset { object: ObjectType, offset: u32 },

    #[error("{object} file is {size} bytes, max object size is {max}")]
    ObjectTooLarge {
        object: ObjectType,
        size: u64,
        max: u32,
    },

    #[error("Device offset {reported}, expected {expected}")]
    OffsetMismatch { expected: u64, reported: u32 },

    #[error("Device CRC 0x{reported:08X}, expected 0x{expected:08X}")]
    CrcMismatch { expected: u32, reported: u32 },

    #[error("No image or object selected")]
    NothingSelected,

    #[error("Timed out in phase {phase}")]
    Timeout { phase: DfuPhase },
}

impl DfuError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DfuError::Buffer(BufferError::OutOfMemory { .. })
            | DfuError::File(FileViewError::Buffer(BufferError::OutOfMemory { .. })) => {
                ErrorKind::Allocation
            }
            DfuError::Buffer(_) => ErrorKind::Protocol,
            DfuError::File(_) => ErrorKind::FileIo,
            DfuError::Transport(_) | DfuError::Control(_) | DfuError::EventLoop(_) => {
                ErrorKind::TransportIo
            }
            DfuError::Framing | DfuError::FrameTooLong { .. } => ErrorKind::Framing,
            DfuError::Response(_)
            | DfuError::PingMismatch { .. }
            | DfuError::MtuTooSmall { .. }
            | DfuError::NonZeroSelectOffset { .. }
            | DfuError::NothingSelected => ErrorKind::Protocol,
            DfuError::ObjectTooLarge { .. }
            | DfuError::OffsetMismatch { .. }
            | DfuError::CrcMismatch { .. } => ErrorKind::Integrity,
            DfuError::Timeout { .. } => ErrorKind::Timeout,
        }
    }
}
