//! SLIP framing (RFC 1055) as used by the Nordic serial DFU transport.
//!
//! Encoding appends into a bounded [`BytesBuffer`] so a frame can never
//! outgrow the negotiated MTU. Decoding is incremental, one byte at a time,
//! because the machine reads the UART byte by byte.

use crate::buffer::{BufferError, BytesBuffer};

pub const END: u8 = 0xC0; // frame delimiter
pub const ESC: u8 = 0xDB;
pub const ESC_END: u8 = 0xDC;
pub const ESC_ESC: u8 = 0xDD;

/// Decoder state carried between bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlipDecodeState {
    #[default]
    Decoding,
    EscapeSeen,
    /// Framing error seen; bytes are dropped until the next `END`.
    Discarding,
}

/// Append `src` to `dst`, escaping `END` and `ESC`.
pub fn encode_append(dst: &mut BytesBuffer, src: &[u8]) -> Result<(), BufferError> {
    for &b in src {
        match b {
            END => {
                dst.append8(ESC)?;
                dst.append8(ESC_END)?;
            }
            ESC => {
                dst.append8(ESC)?;
                dst.append8(ESC_ESC)?;
            }
            _ => dst.append8(b)?,
        }
    }
    Ok(())
}

pub fn encode_end_marker(dst: &mut BytesBuffer) -> Result<(), BufferError> {
    dst.append8(END)
}

/// Feed one received byte through the decoder.
///
/// Returns `true` when `b` completed a frame; `dst` then holds the decoded
/// payload without any framing bytes.
pub fn feed_byte(
    b: u8,
    dst: &mut BytesBuffer,
    state: &mut SlipDecodeState,
) -> Result<bool, BufferError> {
    match *state {
        SlipDecodeState::Decoding => match b {
            END => return Ok(true),
            ESC => *state = SlipDecodeState::EscapeSeen,
            _ => dst.append8(b)?,
        },
        SlipDecodeState::EscapeSeen => match b {
            ESC_END => {
                dst.append8(END)?;
                *state = SlipDecodeState::Decoding;
            }
            ESC_ESC => {
                dst.append8(ESC)?;
                *state = SlipDecodeState::Decoding;
            }
            _ => *state = SlipDecodeState::Discarding,
        },
        SlipDecodeState::Discarding => {
            if b == END {
                dst.reset();
                *state = SlipDecodeState::Decoding;
            }
        }
    }
    Ok(false)
}

/// Encode a complete frame into a fresh vector.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() * 2 + 1);
    for &b in payload {
        match b {
            END => out.extend_from_slice(&[ESC, ESC_END]),
            ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
            _ => out.push(b),
        }
    }
    out.push(END);
    out
}

/// Stream decoder that collects whole frames from arbitrary chunks.
///
/// Frames that hit a framing error are dropped. Empty frames are skipped.
#[derive(Debug)]
pub struct SlipDecoder {
    frame: BytesBuffer,
    state: SlipDecodeState,
}

impl SlipDecoder {
    pub fn new(max_frame: usize) -> Result<Self, BufferError> {
        Ok(Self {
            frame: BytesBuffer::with_capacity(max_frame)?,
            state: SlipDecodeState::Decoding,
        })
    }

    pub fn state(&self) -> SlipDecodeState {
        self.state
    }

    /// Push bytes, returning any completed frames.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Vec<u8>>, BufferError> {
        let mut frames = Vec::new();
        for &b in data {
            if feed_byte(b, &mut self.frame, &mut self.state)? {
                if !self.frame.is_empty() {
                    frames.push(self.frame.as_slice().to_vec());
                }
                self.frame.reset();
            }
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(wire: &[u8], cap: usize) -> (Vec<u8>, bool, SlipDecodeState) {
        let mut dst = BytesBuffer::with_capacity(cap).unwrap();
        let mut state = SlipDecodeState::Decoding;
        let mut done = false;
        for &b in wire {
            done = feed_byte(b, &mut dst, &mut state).unwrap();
            if done {
                break;
            }
        }
        (dst.as_slice().to_vec(), done, state)
    }

    #[test]
    fn test_encode_escapes_special_bytes() {
        let mut dst = BytesBuffer::with_capacity(16).unwrap();
        encode_append(&mut dst, &[0x01, END, ESC, 0x02]).unwrap();
        encode_end_marker(&mut dst).unwrap();
        assert_eq!(
            dst.as_slice(),
            &[0x01, ESC, ESC_END, ESC, ESC_ESC, 0x02, END]
        );
        assert_eq!(encode_frame(&[0x01, END, ESC, 0x02]), dst.as_slice());
    }

    #[test]
    fn test_round_trip_every_byte_value() {
        let payload: Vec<u8> = (0..=255u8).chain([END, ESC, END, END, ESC]).collect();
        let wire = encode_frame(&payload);
        let (decoded, done, state) = decode_all(&wire, payload.len());
        assert!(done);
        assert_eq!(decoded, payload);
        assert_eq!(state, SlipDecodeState::Decoding);
    }

    #[test]
    fn test_round_trip_assorted_payloads() {
        let payloads: [&[u8]; 5] = [
            &[],
            &[END],
            &[ESC, ESC_END],
            &[0x60, 0x09, 0x01, 0x02],
            &[ESC_ESC, ESC_END, END, 0x00, 0xFF],
        ];
        for payload in payloads {
            let (decoded, done, state) = decode_all(&encode_frame(payload), 16);
            assert!(done, "payload {:?}", payload);
            assert_eq!(decoded, payload);
            assert_eq!(state, SlipDecodeState::Decoding);
        }
    }

    #[test]
    fn test_bad_escape_discards_until_end() {
        let mut dst = BytesBuffer::with_capacity(16).unwrap();
        let mut state = SlipDecodeState::Decoding;

        assert!(!feed_byte(0x11, &mut dst, &mut state).unwrap());
        assert!(!feed_byte(ESC, &mut dst, &mut state).unwrap());
        assert!(!feed_byte(0x42, &mut dst, &mut state).unwrap());
        assert_eq!(state, SlipDecodeState::Discarding);

        // Everything up to END is ignored, including escapes.
        for b in [0x01, ESC, ESC_END, 0x02] {
            assert!(!feed_byte(b, &mut dst, &mut state).unwrap());
            assert_eq!(state, SlipDecodeState::Discarding);
        }

        // END resets without reporting a frame.
        assert!(!feed_byte(END, &mut dst, &mut state).unwrap());
        assert_eq!(state, SlipDecodeState::Decoding);
        assert!(dst.is_empty());
    }

    #[test]
    fn test_decode_overflow_reported() {
        let mut dst = BytesBuffer::with_capacity(1).unwrap();
        let mut state = SlipDecodeState::Decoding;
        feed_byte(0x01, &mut dst, &mut state).unwrap();
        assert!(feed_byte(0x02, &mut dst, &mut state).is_err());
    }

    #[test]
    fn test_stream_decoder_splits_frames() {
        let mut decoder = SlipDecoder::new(64).unwrap();
        let mut wire = encode_frame(&[1, 2, END]);
        wire.extend(encode_frame(&[ESC]));
        let (a, b) = wire.split_at(3);

        let mut frames = decoder.push(a).unwrap();
        frames.extend(decoder.push(b).unwrap());

        assert_eq!(frames, vec![vec![1, 2, END], vec![ESC]]);
    }

    #[test]
    fn test_stream_decoder_drops_corrupt_frame() {
        let mut decoder = SlipDecoder::new(64).unwrap();
        let mut wire = vec![0x05, ESC, 0x00, 0x06, END];
        wire.extend(encode_frame(&[7]));
        let frames = decoder.push(&wire).unwrap();
        assert_eq!(frames, vec![vec![7]]);
        assert_eq!(decoder.state(), SlipDecodeState::Decoding);
    }
}
