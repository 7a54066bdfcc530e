//! Request frames (Host -> Device).

use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use super::constants::{ObjectType, OpCode};
use crate::buffer::{BufferError, BytesBuffer};
use crate::slip;

/// One request and its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    Ping { nonce: u8 },
    PrnSet { prn: u16 },
    MtuGet,
    FirmwareVersion { index: u8 },
    ObjectSelect { object_type: ObjectType },
    ObjectCreate { object_type: ObjectType, size: u32 },
    ObjectWrite(&'a [u8]),
    CrcGet,
    ObjectExecute,
    Abort,
}

impl Request<'_> {
    pub fn opcode(&self) -> OpCode {
        match self {
            Request::Ping { .. } => OpCode::Ping,
            Request::PrnSet { .. } => OpCode::PrnSet,
            Request::MtuGet => OpCode::MtuGet,
            Request::FirmwareVersion { .. } => OpCode::FirmwareVersion,
            Request::ObjectSelect { .. } => OpCode::ObjectSelect,
            Request::ObjectCreate { .. } => OpCode::ObjectCreate,
            Request::ObjectWrite(_) => OpCode::ObjectWrite,
            Request::CrcGet => OpCode::CrcGet,
            Request::ObjectExecute => OpCode::ObjectExecute,
            Request::Abort => OpCode::Abort,
        }
    }

    /// Write the unframed payload (everything after the opcode).
    pub fn write_payload<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match *self {
            Request::Ping { nonce } => w.write_u8(nonce),
            Request::PrnSet { prn } => w.write_u16::<LittleEndian>(prn),
            Request::FirmwareVersion { index } => w.write_u8(index),
            Request::ObjectSelect { object_type } => w.write_u8(object_type.as_u8()),
            Request::ObjectCreate { object_type, size } => {
                w.write_u8(object_type.as_u8())?;
                w.write_u32::<LittleEndian>(size)
            }
            Request::ObjectWrite(data) => w.write_all(data),
            Request::MtuGet | Request::CrcGet | Request::ObjectExecute | Request::Abort => Ok(()),
        }
    }

    /// Reset `tx` and fill it with the SLIP-encoded frame.
    ///
    /// Fails with `Overflow` when the encoded frame does not fit the buffer.
    pub fn encode_into(&self, tx: &mut BytesBuffer) -> Result<(), BufferError> {
        tx.reset();
        slip::encode_append(tx, &[self.opcode().as_u8()])?;
        match self {
            Request::ObjectWrite(data) => slip::encode_append(tx, data)?,
            _ => {
                let mut payload = Vec::with_capacity(5);
                // Writing into a Vec cannot fail.
                let _ = self.write_payload(&mut payload);
                slip::encode_append(tx, &payload)?;
            }
        }
        slip::encode_end_marker(tx)
    }
}
