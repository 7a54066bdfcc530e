//! Protocol constants for the Nordic secure DFU serial transport.
//!
//! Values match the nRF5 SDK bootloader (`nrf_dfu_req_handler.h`).

use std::fmt;
use std::time::Duration;

// ============================================================================
// Opcodes (Host -> Device)
// ============================================================================

/// Request opcodes understood by the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Create an init packet (command) or firmware (data) object.
    ObjectCreate = 0x01,
    /// Set the packet receipt notification interval.
    PrnSet = 0x02,
    /// Return offset and running CRC-32 of the current object type.
    CrcGet = 0x03,
    /// Commit the current object.
    ObjectExecute = 0x04,
    /// Select an object type; the reply carries max size, offset and CRC.
    ObjectSelect = 0x06,
    /// Serial MTU in bytes.
    MtuGet = 0x07,
    /// Append data to the current object. Never answered.
    ObjectWrite = 0x08,
    /// One-byte nonce echoed back.
    Ping = 0x09,
    /// Type and version of the image in a device slot.
    FirmwareVersion = 0x0B,
    /// Leave DFU and boot the application.
    Abort = 0x0C,
}

impl OpCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x01 => OpCode::ObjectCreate,
            0x02 => OpCode::PrnSet,
            0x03 => OpCode::CrcGet,
            0x04 => OpCode::ObjectExecute,
            0x06 => OpCode::ObjectSelect,
            0x07 => OpCode::MtuGet,
            0x08 => OpCode::ObjectWrite,
            0x09 => OpCode::Ping,
            0x0B => OpCode::FirmwareVersion,
            0x0C => OpCode::Abort,
            _ => return None,
        })
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether the bootloader sends a response to this request.
    pub const fn expects_response(self) -> bool {
        !matches!(self, OpCode::ObjectWrite | OpCode::Abort)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpCode::ObjectCreate => "OBJECT_CREATE",
            OpCode::PrnSet => "PRN_SET",
            OpCode::CrcGet => "CRC_GET",
            OpCode::ObjectExecute => "OBJECT_EXECUTE",
            OpCode::ObjectSelect => "OBJECT_SELECT",
            OpCode::MtuGet => "MTU_GET",
            OpCode::ObjectWrite => "OBJECT_WRITE",
            OpCode::Ping => "PING",
            OpCode::FirmwareVersion => "FW_VERSION",
            OpCode::Abort => "ABORT",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// Responses (Device -> Host)
// ============================================================================

/// First byte of every response frame.
pub const RESPONSE_MARKER: u8 = 0x60;

/// `RESPONSE_MARKER || opcode || result`.
pub const RESPONSE_HEADER_LEN: usize = 3;

/// Image type reported for an empty device slot.
pub const IMAGE_TYPE_UNKNOWN: u8 = 0xFF;

/// Highest device slot index probed with `FirmwareVersion`.
pub const MAX_IMAGE_SLOT: u8 = 0xFE;

// ============================================================================
// Object types
// ============================================================================

/// Object kinds for `ObjectSelect` / `ObjectCreate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectType {
    /// Init packet.
    Command = 0x01,
    /// Firmware image.
    Data = 0x02,
}

impl ObjectType {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectType::Command => write!(f, "command"),
            ObjectType::Data => write!(f, "data"),
        }
    }
}

// ============================================================================
// Payload sizes
// ============================================================================

/// `ObjectSelect` reply payload: max size, offset, CRC.
pub const SELECT_RESPONSE_LEN: usize = 12;

/// `CrcGet` reply payload: offset, CRC.
pub const CRC_RESPONSE_LEN: usize = 8;

/// `FirmwareVersion` reply payload: type, version, address, length.
pub const FIRMWARE_VERSION_RESPONSE_LEN: usize = 13;

/// Buffer size used before the MTU is known. Large enough for the ping,
/// PRN and MTU exchanges.
pub const PREAMBLE_MTU_SIZE: usize = 16;

/// Packet receipt notifications are disabled.
pub const PRN_DISABLED: u16 = 0;

/// Raw bytes per `ObjectWrite` so the SLIP-encoded frame fits in `mtu`.
///
/// Escaping can double every byte and the end marker adds one.
pub const fn chunk_size_for_mtu(mtu: usize) -> usize {
    (mtu.saturating_sub(1) / 2).saturating_sub(1)
}

// ============================================================================
// Timing
// ============================================================================

/// Time for the board to enter its bootloader after reset.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Wait after the last application object is executed.
pub const DEFAULT_POST_VALIDATE_APPLICATION: Duration = Duration::from_secs(1);

/// Wait after the last softdevice object is executed.
pub const DEFAULT_POST_VALIDATE_SOFTDEVICE: Duration = Duration::from_secs(5);

/// How long a pending read or write may stall.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Serial defaults
// ============================================================================

pub const DEFAULT_BAUD_RATE: u32 = 115_200;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_round_trip() {
        for raw in 0u8..=0xFF {
            if let Some(op) = OpCode::from_u8(raw) {
                assert_eq!(op.as_u8(), raw);
            }
        }
        assert_eq!(OpCode::from_u8(0x05), None);
        assert_eq!(OpCode::from_u8(RESPONSE_MARKER), None);
    }

    #[test]
    fn test_chunk_size() {
        assert_eq!(chunk_size_for_mtu(256), 126);
        assert_eq!(chunk_size_for_mtu(PREAMBLE_MTU_SIZE), 6);
        assert_eq!(chunk_size_for_mtu(0), 0);
        // Worst case: opcode + doubled payload + END fits.
        for mtu in 16..600 {
            assert!(1 + 2 * chunk_size_for_mtu(mtu) + 1 <= mtu);
        }
    }
}
