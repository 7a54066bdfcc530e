//! Bounded byte buffer used for SLIP frames and file windows.
//!
//! A `BytesBuffer` has a fixed logical capacity that only changes through
//! [`BytesBuffer::resize`]. Appends never grow it implicitly, so a frame that
//! would not fit the negotiated MTU is reported instead of silently sent.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Out of memory reserving {requested} bytes")]
    OutOfMemory { requested: usize },

    #[error("Buffer full: capacity {capacity} bytes")]
    Overflow { capacity: usize },

    #[error("Read of {len} bytes at offset {offset} exceeds length {length}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        length: usize,
    },
}

/// Growable-on-request, fixed-between-requests byte container.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BytesBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl BytesBuffer {
    /// Empty buffer with zero capacity. Does not allocate.
    pub const fn new() -> Self {
        Self {
            data: Vec::new(),
            capacity: 0,
        }
    }

    /// Allocate a buffer able to hold `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Result<Self, BufferError> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| BufferError::OutOfMemory {
                requested: capacity,
            })?;
        Ok(Self { data, capacity })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes still available before the buffer is full.
    pub fn remaining(&self) -> usize {
        self.capacity - self.data.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Discard the contents, keeping the storage.
    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// Change the capacity, keeping the first `min(len, new_capacity)` bytes.
    ///
    /// On failure the buffer is left untouched.
    pub fn resize(&mut self, new_capacity: usize) -> Result<(), BufferError> {
        if new_capacity > self.data.capacity() {
            let additional = new_capacity - self.data.len();
            self.data
                .try_reserve_exact(additional)
                .map_err(|_| BufferError::OutOfMemory {
                    requested: new_capacity,
                })?;
        } else {
            self.data.truncate(new_capacity);
            self.data.shrink_to(new_capacity);
        }
        self.capacity = new_capacity;
        Ok(())
    }

    /// Drop the first `distance` bytes and move the tail to the front.
    pub fn shift_left(&mut self, distance: usize) -> Result<(), BufferError> {
        if distance > self.data.len() {
            return Err(BufferError::OutOfBounds {
                offset: 0,
                len: distance,
                length: self.data.len(),
            });
        }
        self.data.drain(..distance);
        Ok(())
    }

    pub fn append8(&mut self, value: u8) -> Result<(), BufferError> {
        if self.data.len() >= self.capacity {
            return Err(BufferError::Overflow {
                capacity: self.capacity,
            });
        }
        self.data.push(value);
        Ok(())
    }

    /// Append all of `bytes` or nothing.
    pub fn append_slice(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        if bytes.len() > self.remaining() {
            return Err(BufferError::Overflow {
                capacity: self.capacity,
            });
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    pub fn read8(&self, offset: usize) -> Result<u8, BufferError> {
        self.data
            .get(offset)
            .copied()
            .ok_or(BufferError::OutOfBounds {
                offset,
                len: 1,
                length: self.data.len(),
            })
    }

    pub fn write8(&mut self, offset: usize, value: u8) -> Result<(), BufferError> {
        let length = self.data.len();
        let slot = self.data.get_mut(offset).ok_or(BufferError::OutOfBounds {
            offset,
            len: 1,
            length,
        })?;
        *slot = value;
        Ok(())
    }

    pub fn read_le16(&self, offset: usize) -> Result<u16, BufferError> {
        let mut cursor = Cursor::new(self.window(offset, 2)?);
        cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| self.out_of_bounds(offset, 2))
    }

    pub fn read_le32(&self, offset: usize) -> Result<u32, BufferError> {
        let mut cursor = Cursor::new(self.window(offset, 4)?);
        cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| self.out_of_bounds(offset, 4))
    }

    /// Emit the contents at trace level.
    pub fn dump(&self, label: &str) {
        tracing::trace!(
            label,
            len = self.data.len(),
            bytes = %hex(&self.data),
            "Buffer dump"
        );
    }

    fn window(&self, offset: usize, len: usize) -> Result<&[u8], BufferError> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or(self.out_of_bounds(offset, len))
    }

    fn out_of_bounds(&self, offset: usize, len: usize) -> BufferError {
        BufferError::OutOfBounds {
            offset,
            len,
            length: self.data.len(),
        }
    }
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(bytes: &[u8]) -> BytesBuffer {
        let mut buf = BytesBuffer::with_capacity(bytes.len() + 4).unwrap();
        buf.append_slice(bytes).unwrap();
        buf
    }

    #[test]
    fn test_new_buffer_is_empty() {
        let buf = BytesBuffer::with_capacity(16).unwrap();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.capacity(), 16);
        assert_eq!(buf.remaining(), 16);
    }

    #[test]
    fn test_append_respects_capacity() {
        let mut buf = BytesBuffer::with_capacity(2).unwrap();
        buf.append8(1).unwrap();
        buf.append8(2).unwrap();
        assert_eq!(
            buf.append8(3),
            Err(BufferError::Overflow { capacity: 2 })
        );
        assert_eq!(buf.as_slice(), &[1, 2]);
    }

    #[test]
    fn test_append_slice_is_all_or_nothing() {
        let mut buf = BytesBuffer::with_capacity(4).unwrap();
        buf.append8(9).unwrap();
        assert!(buf.append_slice(&[1, 2, 3, 4]).is_err());
        assert_eq!(buf.as_slice(), &[9]);
    }

    #[test]
    fn test_shift_left_law() {
        let bytes = [0x10, 0x11, 0x12, 0x13, 0x78, 0x56, 0x34, 0x12, 0xAA];
        let mut buf = filled(&bytes);
        let before_len = buf.len();
        let expected = buf.read_le32(4).unwrap();

        buf.shift_left(4).unwrap();

        assert_eq!(buf.len(), before_len - 4);
        assert_eq!(buf.read_le32(0).unwrap(), expected);
        assert_eq!(expected, 0x12345678);
    }

    #[test]
    fn test_shift_left_past_end_fails() {
        let mut buf = filled(&[1, 2]);
        assert!(buf.shift_left(3).is_err());
        buf.shift_left(2).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_resize_preserves_prefix() {
        let mut buf = filled(&[1, 2, 3, 4, 5]);
        buf.resize(3).unwrap();
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
        assert_eq!(buf.capacity(), 3);

        buf.resize(256).unwrap();
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
        assert_eq!(buf.remaining(), 253);
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let mut buf = filled(&[1, 2, 3]);
        let cap = buf.capacity();
        buf.reset();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), cap);
    }

    #[test]
    fn test_le_reads_bounds_checked() {
        let buf = filled(&[0x34, 0x12, 0x00]);
        assert_eq!(buf.read_le16(0).unwrap(), 0x1234);
        assert!(buf.read_le16(2).is_err());
        assert!(buf.read_le32(0).is_err());
        assert!(buf.read_le32(usize::MAX).is_err());
    }

    #[test]
    fn test_read_write_byte() {
        let mut buf = filled(&[0, 0]);
        buf.write8(1, 0xEE).unwrap();
        assert_eq!(buf.read8(1).unwrap(), 0xEE);
        assert!(buf.write8(2, 1).is_err());
        assert!(buf.read8(2).is_err());
    }
}
