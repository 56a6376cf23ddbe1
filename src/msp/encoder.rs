//! # MSP Frame Encoder
//!
//! Packs a function code and payload into a request frame.
//!
//! ```text
//! MSPv1: '$' 'M' '<' len:u8 code:u8 payload... crc:u8
//! MSPv2: '$' 'X' '<' flag:u8 code:u16le len:u16le payload... crc:u8
//! ```

use bytes::{BufMut, BytesMut};

use super::crc::{msp_v1_checksum, msp_v2_checksum};
use super::protocol::*;
use crate::error::{MspError, Result};

/// Flag byte sent in MSPv2 requests
pub const MSP_V2_FLAG: u8 = 0;

/// Pack `payload` into a complete request frame for `version`
///
/// # Errors
///
/// Returns [`MspError::PayloadTooLarge`] if the payload does not fit the
/// version's length field, or if `code` does not fit MSPv1's 8-bit code.
///
/// # Examples
///
/// ```
/// use msp_fci::msp::encoder::pack;
/// use msp_fci::msp::protocol::MspVersion;
///
/// let frame = pack(MspVersion::V1, 109, &[]).unwrap();
/// assert_eq!(frame, vec![b'$', b'M', b'<', 0x00, 0x6D, 0x6D]);
/// ```
pub fn pack(version: MspVersion, code: u16, payload: &[u8]) -> Result<Vec<u8>> {
    match version {
        MspVersion::V1 => pack_v1(code, payload),
        MspVersion::V2 => pack_v2(code, payload),
    }
}

fn pack_v1(code: u16, payload: &[u8]) -> Result<Vec<u8>> {
    let len = u8::try_from(payload.len()).map_err(|_| MspError::PayloadTooLarge {
        len: payload.len(),
        max: MSP_V1_MAX_PAYLOAD,
    })?;
    let code = u8::try_from(code).map_err(|_| MspError::Unsupported("16-bit code over MSPv1"))?;

    let mut frame = BytesMut::with_capacity(payload.len() + 6);
    frame.put_slice(&[MSP_PREAMBLE, MSP_V1_MARKER, MSP_DIRECTION_REQUEST]);
    frame.put_u8(len);
    frame.put_u8(code);
    frame.put_slice(payload);
    frame.put_u8(msp_v1_checksum(len, code, payload));

    Ok(frame.to_vec())
}

fn pack_v2(code: u16, payload: &[u8]) -> Result<Vec<u8>> {
    let len = u16::try_from(payload.len()).map_err(|_| MspError::PayloadTooLarge {
        len: payload.len(),
        max: MSP_V2_MAX_PAYLOAD,
    })?;

    let mut frame = BytesMut::with_capacity(payload.len() + 9);
    frame.put_slice(&[MSP_PREAMBLE, MSP_V2_MARKER, MSP_DIRECTION_REQUEST]);
    frame.put_u8(MSP_V2_FLAG);
    frame.put_u16_le(code);
    frame.put_u16_le(len);
    frame.put_slice(payload);
    frame.put_u8(msp_v2_checksum(MSP_V2_FLAG, code, len, payload));

    Ok(frame.to_vec())
}
