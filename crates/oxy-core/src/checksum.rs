//! CRC-8 integrity code used on the STC31 command/response frames
//!
//! Polynomial 0x31 (x^8 + x^5 + x^4 + 1), initial value 0xFF, MSB first,
//! no final XOR. This is the Sensirion word checksum.

pub const CRC_POLY: u8 = 0x31;
pub const CRC_INIT: u8 = 0xFF;

/// Compute the CRC-8 of `data`.
pub fn checksum(data: &[u8]) -> u8 {
    let mut crc = CRC_INIT;

    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            if crc & 0x80 != 0 {
                crc = (crc << 1) ^ CRC_POLY;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}

/// Returns true when `crc` is the checksum of `word`.
#[inline]
pub fn verify(word: [u8; 2], crc: u8) -> bool {
    checksum(&word) == crc
}
