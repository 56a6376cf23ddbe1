//! # MSP Checksums
//!
//! - MSPv1: XOR of length, code and payload bytes.
//! - MSPv2: CRC-8-DVB-S2 over flag, code, length and payload bytes.
//!
//! **Polynomial**: 0xD5 (x^8 + x^7 + x^6 + x^4 + x^2 + 1)
//! **Initial Value**: 0x00

/// CRC-8-DVB-S2 polynomial
const CRC8_POLY: u8 = 0xD5;

/// Precomputed CRC8 lookup table for fast calculation
const CRC8_TABLE: [u8; 256] = generate_crc8_table();

/// Generate CRC8 lookup table at compile time
const fn generate_crc8_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u8;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ CRC8_POLY;
            } else {
                crc <<= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Continue a CRC8-DVB-S2 computation with more bytes
///
/// Lets a frame be checksummed piecewise (header, then payload) without
/// copying it into one buffer.
pub fn crc8_dvb_s2_update(mut crc: u8, data: &[u8]) -> u8 {
    for &byte in data {
        crc = CRC8_TABLE[(crc ^ byte) as usize];
    }

    crc
}

/// Calculate CRC8-DVB-S2 checksum using lookup table (fast)
///
/// # Examples
///
/// ```
/// use msp_fci::msp::crc::crc8_dvb_s2;
///
/// assert_eq!(crc8_dvb_s2(&[]), 0x00);
/// ```
pub fn crc8_dvb_s2(data: &[u8]) -> u8 {
    crc8_dvb_s2_update(0, data)
}

/// XOR checksum used by MSPv1
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &byte| acc ^ byte)
}

/// Checksum of an MSPv1 frame: XOR of `len`, `code` and the payload
pub fn msp_v1_checksum(len: u8, code: u8, payload: &[u8]) -> u8 {
    len ^ code ^ xor_checksum(payload)
}

/// Checksum of an MSPv2 frame: CRC8-DVB-S2 of `flag`, `code` (LE), `len` (LE)
/// and the payload
pub fn msp_v2_checksum(flag: u8, code: u16, len: u16, payload: &[u8]) -> u8 {
    let [code_lo, code_hi] = code.to_le_bytes();
    let [len_lo, len_hi] = len.to_le_bytes();
    let crc = crc8_dvb_s2(&[flag, code_lo, code_hi, len_lo, len_hi]);
    crc8_dvb_s2_update(crc, payload)
}

/// Calculate CRC8-DVB-S2 checksum using direct algorithm (slow, for verification)
///
/// Shifts bit by bit exactly as the polynomial is defined.
/// Used primarily for testing the lookup table implementation.
#[allow(dead_code)]
fn crc8_dvb_s2_slow(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;

    for &byte in data {
        crc ^= byte;

        for _ in 0..8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ CRC8_POLY;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}
