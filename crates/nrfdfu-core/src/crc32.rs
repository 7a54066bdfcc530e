//! Streaming CRC-32 (IEEE 802.3) with seed carry.
//!
//! The bootloader reports a running CRC over every byte written to the
//! current object type. `compute` continues from a previously returned
//! value so the host can keep the same running checksum chunk by chunk.

use crc::{CRC_32_ISO_HDLC, Crc};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// CRC-32 of `bytes`, continuing from `seed`.
///
/// `seed` is zero for the first block and the previous return value after
/// that: `compute(compute(0, a), b) == compute(0, a ++ b)`.
pub fn compute(seed: u32, bytes: &[u8]) -> u32 {
    // A finished CRC is the register XOR-ed out; undo that and feed the
    // register back in the algorithm's (unreflected) init convention.
    let register = !seed;
    let mut digest = CRC32.digest_with_initial(register.reverse_bits());
    digest.update(bytes);
    digest.finalize()
}

/// Running CRC accumulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Crc32 {
    value: u32,
}

impl Crc32 {
    pub const fn new() -> Self {
        Self { value: 0 }
    }

    /// Start from a value reported by the device.
    pub const fn with_seed(seed: u32) -> Self {
        Self { value: seed }
    }

    pub fn update(&mut self, bytes: &[u8]) -> u32 {
        self.value = compute(self.value, bytes);
        self.value
    }

    pub fn value(&self) -> u32 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(compute(0, b"123456789"), 0xCBF4_3926);
        assert_eq!(compute(0, b"123456789"), CRC32.checksum(b"123456789"));
    }

    #[test]
    fn test_empty_input_keeps_seed() {
        assert_eq!(compute(0, &[]), 0);
        assert_eq!(compute(0xDEAD_BEEF, &[]), 0xDEAD_BEEF);
    }

    #[test]
    fn test_streaming_law() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i * 31 % 251) as u8).collect();
        for split in [0, 1, 7, 126, 500, 999, 1000] {
            let (a, b) = data.split_at(split);
            assert_eq!(
                compute(compute(0, a), b),
                compute(0, &data),
                "split at {}",
                split
            );
        }
    }

    #[test]
    fn test_accumulator_matches_one_shot() {
        let data = b"The quick brown fox jumps over the lazy dog";
        let mut acc = Crc32::new();
        for chunk in data.chunks(5) {
            acc.update(chunk);
        }
        assert_eq!(acc.value(), 0x414F_A339);
        assert_eq!(acc.value(), compute(0, data));
    }
}
