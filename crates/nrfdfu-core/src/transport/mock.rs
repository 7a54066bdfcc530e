//! Mock serial transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::{Transport, TransportError};
use crate::reactor::Interest;
use crate::slip::{self, SlipDecoder};

/// Largest frame the mock will decode from the host side.
const MOCK_MAX_FRAME: usize = 64 * 1024;

/// Device-side behaviour plugged into a [`MockTransport`].
///
/// Called with every complete frame the host writes (SLIP already removed).
/// Returned payloads are SLIP-encoded and queued for the host to read.
pub trait Responder: Send {
    fn on_frame(&mut self, frame: &[u8]) -> Vec<Vec<u8>>;
}

#[derive(Default)]
struct MockState {
    /// Bytes waiting to be read by the host.
    rx: VecDeque<u8>,
    /// Captured write calls, one entry per accepted chunk.
    write_log: Vec<Vec<u8>>,
    /// Decoded host frames.
    frames: Vec<Vec<u8>>,
    decoder: Option<SlipDecoder>,
    responder: Option<Box<dyn Responder>>,
    /// Accept at most this many bytes per write.
    max_write: Option<usize>,
    /// Number of upcoming writes that report `WouldBlock`.
    blocked_writes: usize,
    /// Leading byte and count of writes that report `WouldBlock`.
    blocked_leading: Option<(u8, usize)>,
    disconnected: bool,
}

/// Mock transport for unit testing state machine logic.
///
/// Clones share state, so a test can keep a handle while the machine owns
/// another.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock whose written frames are answered by `responder`.
    pub fn with_responder(responder: impl Responder + 'static) -> Self {
        let mock = Self::new();
        mock.lock().responder = Some(Box::new(responder));
        mock
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue raw bytes for the host to read.
    pub fn queue_rx(&self, bytes: &[u8]) {
        self.lock().rx.extend(bytes.iter().copied());
    }

    /// Queue a SLIP-encoded frame for the host to read.
    pub fn queue_frame(&self, payload: &[u8]) {
        self.queue_rx(&slip::encode_frame(payload));
    }

    pub fn has_rx_data(&self) -> bool {
        !self.lock().rx.is_empty()
    }

    /// All captured write calls.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.lock().write_log.clone()
    }

    /// Every byte written, in order.
    pub fn wire_bytes(&self) -> Vec<u8> {
        self.lock().write_log.concat()
    }

    /// Complete frames decoded from the written bytes.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.lock().frames.clone()
    }

    pub fn clear_writes(&self) {
        let mut state = self.lock();
        state.write_log.clear();
        state.frames.clear();
    }

    /// Limit how many bytes a single write accepts.
    pub fn set_max_write(&self, max: Option<usize>) {
        self.lock().max_write = max;
    }

    /// Make the next `count` writes return `WouldBlock`.
    pub fn block_next_writes(&self, count: usize) {
        self.lock().blocked_writes = count;
    }

    /// Make the next `count` writes starting with `byte` return `WouldBlock`.
    pub fn block_writes_starting_with(&self, byte: u8, count: usize) {
        self.lock().blocked_leading = Some((byte, count));
    }

    /// Simulate an unplugged board.
    pub fn disconnect(&self) {
        self.lock().disconnected = true;
    }

    pub fn reconnect(&self) {
        self.lock().disconnected = false;
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.lock();
        if state.disconnected {
            return Err(TransportError::Disconnected);
        }
        if state.rx.is_empty() {
            return Err(TransportError::WouldBlock);
        }
        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.disconnected {
            return Err(TransportError::Disconnected);
        }
        if state.blocked_writes > 0 {
            state.blocked_writes -= 1;
            return Err(TransportError::WouldBlock);
        }
        if let Some((byte, count)) = state.blocked_leading
            && count > 0
            && data.first() == Some(&byte)
        {
            state.blocked_leading = Some((byte, count - 1));
            return Err(TransportError::WouldBlock);
        }

        let n = state.max_write.map_or(data.len(), |max| max.min(data.len()));
        let accepted = &data[..n];
        state.write_log.push(accepted.to_vec());

        if state.decoder.is_none() {
            let decoder = SlipDecoder::new(MOCK_MAX_FRAME)
                .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
            state.decoder = Some(decoder);
        }
        let frames = match state.decoder.as_mut() {
            Some(decoder) => decoder
                .push(accepted)
                .map_err(|e| TransportError::WriteFailed(e.to_string()))?,
            None => Vec::new(),
        };

        for frame in frames {
            if let Some(responder) = state.responder.as_mut() {
                for reply in responder.on_frame(&frame) {
                    state.rx.extend(slip::encode_frame(&reply));
                }
            }
            state.frames.push(frame);
        }
        Ok(n)
    }

    fn poll_ready(&mut self, interest: Interest) -> Result<bool, TransportError> {
        let state = self.lock();
        if state.disconnected {
            return Err(TransportError::Disconnected);
        }
        Ok(match interest {
            Interest::Readable => !state.rx.is_empty(),
            Interest::Writable => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Responder for Echo {
        fn on_frame(&mut self, frame: &[u8]) -> Vec<Vec<u8>> {
            vec![frame.to_vec()]
        }
    }

    #[test]
    fn test_mock_rx_queue() {
        let mut mock = MockTransport::new();
        mock.queue_rx(&[1, 2, 3]);

        let mut buf = [0u8; 2];
        assert_eq!(mock.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(mock.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 3);

        // Queue is empty now
        assert!(mock.read(&mut buf).unwrap_err().is_would_block());
    }

    #[test]
    fn test_mock_write_capture() {
        let mut mock = MockTransport::new();
        mock.write(b"Hello").unwrap();
        mock.write(b"World").unwrap();

        let writes = mock.get_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], b"Hello");
        assert_eq!(writes[1], b"World");
    }

    #[test]
    fn test_mock_short_and_blocked_writes() {
        let mut mock = MockTransport::new();
        mock.set_max_write(Some(3));
        mock.block_next_writes(1);

        assert!(mock.poll_ready(Interest::Writable).unwrap());
        assert!(mock.write(b"abcdef").unwrap_err().is_would_block());
        assert_eq!(mock.write(b"abcdef").unwrap(), 3);
        assert_eq!(mock.wire_bytes(), b"abc");
    }

    #[test]
    fn test_mock_blocks_writes_by_leading_byte() {
        let mut mock = MockTransport::new();
        mock.block_writes_starting_with(0x0C, 1);

        assert_eq!(mock.write(&[0x09, 0xC0]).unwrap(), 2);
        assert!(mock.write(&[0x0C, 0xC0]).unwrap_err().is_would_block());
        assert_eq!(mock.write(&[0x0C, 0xC0]).unwrap(), 2);
        assert_eq!(mock.wire_bytes(), [0x09, 0xC0, 0x0C, 0xC0]);
    }

    #[test]
    fn test_mock_responder_answers_frames() {
        let handle = MockTransport::with_responder(Echo);
        let mut mock = handle.clone();

        let wire = slip::encode_frame(&[0x09, 0x01]);
        let (a, b) = wire.split_at(1);
        mock.write(a).unwrap();
        assert!(!handle.has_rx_data());
        mock.write(b).unwrap();

        assert_eq!(handle.frames(), vec![vec![0x09, 0x01]]);
        let mut buf = [0u8; 8];
        let n = mock.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &slip::encode_frame(&[0x09, 0x01])[..]);
    }

    #[test]
    fn test_mock_disconnect() {
        let mut mock = MockTransport::new();
        mock.disconnect();
        assert!(matches!(
            mock.write(b"test"),
            Err(TransportError::Disconnected)
        ));
        mock.reconnect();
        assert!(mock.write(b"test").is_ok());
    }
}
