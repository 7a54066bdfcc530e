//! Response header validation and typed reply payloads.
//!
//! Every response is `0x60 || opcode || result || payload`. Only
//! `ResultCode::Success` lets the exchange continue; every other code is
//! terminal, but it is decoded so the log says why.

use std::fmt;

use thiserror::Error;

use super::constants::*;
use crate::buffer::{BufferError, BytesBuffer};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponseError {
    #[error("Response too short for a header: {len} bytes")]
    TooShort { len: usize },

    #[error("Bad response marker 0x{got:02X}")]
    BadMarker { got: u8 },

    #[error("Response for opcode 0x{got:02X}, expected {expected}")]
    WrongOpcode { expected: OpCode, got: u8 },

    #[error("{opcode} failed: {result}")]
    Failed {
        opcode: OpCode,
        result: ResultCode,
        extended: Option<u8>,
    },

    #[error("{opcode} payload: expected {expected} bytes, got {actual}")]
    PayloadLength {
        opcode: OpCode,
        expected: usize,
        actual: usize,
    },

    #[error("Payload read: {0}")]
    Buffer(#[from] BufferError),
}

/// Result byte of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Invalid,
    Success,
    OpCodeNotSupported,
    InvalidParameter,
    InsufficientResources,
    InvalidObject,
    UnsupportedType,
    OperationNotPermitted,
    OperationFailed,
    /// The byte after the header carries an extended error code.
    ExtendedError,
    Unknown(u8),
}

impl ResultCode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => ResultCode::Invalid,
            0x01 => ResultCode::Success,
            0x02 => ResultCode::OpCodeNotSupported,
            0x03 => ResultCode::InvalidParameter,
            0x04 => ResultCode::InsufficientResources,
            0x05 => ResultCode::InvalidObject,
            0x07 => ResultCode::UnsupportedType,
            0x08 => ResultCode::OperationNotPermitted,
            0x0A => ResultCode::OperationFailed,
            0x0B => ResultCode::ExtendedError,
            other => ResultCode::Unknown(other),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResultCode::Success)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultCode::Invalid => write!(f, "invalid opcode"),
            ResultCode::Success => write!(f, "success"),
            ResultCode::OpCodeNotSupported => write!(f, "opcode not supported"),
            ResultCode::InvalidParameter => write!(f, "invalid parameter"),
            ResultCode::InsufficientResources => write!(f, "insufficient resources"),
            ResultCode::InvalidObject => write!(f, "invalid object"),
            ResultCode::UnsupportedType => write!(f, "unsupported object type"),
            ResultCode::OperationNotPermitted => write!(f, "operation not permitted"),
            ResultCode::OperationFailed => write!(f, "operation failed"),
            ResultCode::ExtendedError => write!(f, "extended error"),
            ResultCode::Unknown(code) => write!(f, "unknown result 0x{:02X}", code),
        }
    }
}

/// Check that `rx` starts with a successful header for `expected`.
pub fn check_header(rx: &BytesBuffer, expected: OpCode) -> Result<(), ResponseError> {
    if rx.len() < RESPONSE_HEADER_LEN {
        return Err(ResponseError::TooShort { len: rx.len() });
    }
    let marker = rx.read8(0)?;
    let opcode = rx.read8(1)?;
    let result = ResultCode::from_u8(rx.read8(2)?);

    if marker != RESPONSE_MARKER {
        return Err(ResponseError::BadMarker { got: marker });
    }
    if opcode != expected.as_u8() {
        return Err(ResponseError::WrongOpcode {
            expected,
            got: opcode,
        });
    }
    if !result.is_success() {
        let extended = match result {
            ResultCode::ExtendedError => rx.read8(RESPONSE_HEADER_LEN).ok(),
            _ => None,
        };
        return Err(ResponseError::Failed {
            opcode: expected,
            result,
            extended,
        });
    }
    Ok(())
}

fn expect_len(payload: &BytesBuffer, opcode: OpCode, expected: usize) -> Result<(), ResponseError> {
    if payload.len() != expected {
        return Err(ResponseError::PayloadLength {
            opcode,
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

/// Ping reply: the echoed nonce.
pub fn parse_ping(payload: &BytesBuffer) -> Result<u8, ResponseError> {
    expect_len(payload, OpCode::Ping, 1)?;
    Ok(payload.read8(0)?)
}

/// PRN reply carries nothing.
pub fn parse_empty(payload: &BytesBuffer, opcode: OpCode) -> Result<(), ResponseError> {
    expect_len(payload, opcode, 0)
}

pub fn parse_mtu(payload: &BytesBuffer) -> Result<u16, ResponseError> {
    Ok(payload.read_le16(0)?)
}

/// `ObjectSelect` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectResponse {
    pub max_size: u32,
    pub offset: u32,
    pub crc: u32,
}

impl SelectResponse {
    pub fn parse(payload: &BytesBuffer) -> Result<Self, ResponseError> {
        expect_len(payload, OpCode::ObjectSelect, SELECT_RESPONSE_LEN)?;
        Ok(Self {
            max_size: payload.read_le32(0)?,
            offset: payload.read_le32(4)?,
            crc: payload.read_le32(8)?,
        })
    }
}

/// `CrcGet` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrcResponse {
    pub offset: u32,
    pub crc: u32,
}

impl CrcResponse {
    pub fn parse(payload: &BytesBuffer) -> Result<Self, ResponseError> {
        expect_len(payload, OpCode::CrcGet, CRC_RESPONSE_LEN)?;
        Ok(Self {
            offset: payload.read_le32(0)?,
            crc: payload.read_le32(4)?,
        })
    }
}

/// `FirmwareVersion` reply for one device slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersionResponse {
    pub image_type: u8,
    pub version: u32,
    pub address: u32,
    pub length: u32,
}

impl FirmwareVersionResponse {
    /// `None` when the slot is empty (no payload or type `0xFF`).
    pub fn parse(payload: &BytesBuffer) -> Result<Option<Self>, ResponseError> {
        if payload.is_empty() || payload.read8(0)? == IMAGE_TYPE_UNKNOWN {
            return Ok(None);
        }
        if payload.len() < FIRMWARE_VERSION_RESPONSE_LEN {
            return Err(ResponseError::PayloadLength {
                opcode: OpCode::FirmwareVersion,
                expected: FIRMWARE_VERSION_RESPONSE_LEN,
                actual: payload.len(),
            });
        }
        Ok(Some(Self {
            image_type: payload.read8(0)?,
            version: payload.read_le32(1)?,
            address: payload.read_le32(5)?,
            length: payload.read_le32(9)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(bytes: &[u8]) -> BytesBuffer {
        let mut b = BytesBuffer::with_capacity(64).unwrap();
        b.append_slice(bytes).unwrap();
        b
    }

    #[test]
    fn test_header_ok() {
        let rx = buf(&[0x60, 0x09, 0x01, 0x05]);
        assert!(check_header(&rx, OpCode::Ping).is_ok());
    }

    #[test]
    fn test_header_rejections() {
        assert_eq!(
            check_header(&buf(&[0x60, 0x09]), OpCode::Ping),
            Err(ResponseError::TooShort { len: 2 })
        );
        assert_eq!(
            check_header(&buf(&[0x61, 0x09, 0x01]), OpCode::Ping),
            Err(ResponseError::BadMarker { got: 0x61 })
        );
        assert_eq!(
            check_header(&buf(&[0x60, 0x07, 0x01]), OpCode::Ping),
            Err(ResponseError::WrongOpcode {
                expected: OpCode::Ping,
                got: 0x07
            })
        );
        assert_eq!(
            check_header(&buf(&[0x60, 0x09, 0x03]), OpCode::Ping),
            Err(ResponseError::Failed {
                opcode: OpCode::Ping,
                result: ResultCode::InvalidParameter,
                extended: None
            })
        );
    }

    #[test]
    fn test_extended_error_byte_kept() {
        let err = check_header(&buf(&[0x60, 0x01, 0x0B, 0x07]), OpCode::ObjectCreate).unwrap_err();
        assert_eq!(
            err,
            ResponseError::Failed {
                opcode: OpCode::ObjectCreate,
                result: ResultCode::ExtendedError,
                extended: Some(0x07)
            }
        );
    }

    #[test]
    fn test_select_response() {
        let payload = buf(&[0x00, 0x10, 0, 0, 0, 0, 0, 0, 0x78, 0x56, 0x34, 0x12]);
        let select = SelectResponse::parse(&payload).unwrap();
        assert_eq!(select.max_size, 4096);
        assert_eq!(select.offset, 0);
        assert_eq!(select.crc, 0x12345678);

        assert!(SelectResponse::parse(&buf(&[0; 11])).is_err());
    }

    #[test]
    fn test_firmware_version_unknown_slot() {
        assert_eq!(FirmwareVersionResponse::parse(&buf(&[])).unwrap(), None);
        let mut empty = vec![0xFF];
        empty.extend([0u8; 12]);
        assert_eq!(FirmwareVersionResponse::parse(&buf(&empty)).unwrap(), None);
    }

    #[test]
    fn test_firmware_version_slot() {
        let mut bytes = vec![0x00];
        bytes.extend(6_001_000u32.to_le_bytes());
        bytes.extend(0x1000u32.to_le_bytes());
        bytes.extend(0x25000u32.to_le_bytes());
        let fw = FirmwareVersionResponse::parse(&buf(&bytes)).unwrap().unwrap();
        assert_eq!(fw.image_type, 0x00);
        assert_eq!(fw.version, 6_001_000);
        assert_eq!(fw.address, 0x1000);
        assert_eq!(fw.length, 0x25000);

        assert!(FirmwareVersionResponse::parse(&buf(&bytes[..5])).is_err());
    }
}
