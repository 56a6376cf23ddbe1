//! # MSP Frame Decoder
//!
//! Receive state machine for MSPv1 and MSPv2 response frames.
//!
//! ```text
//! Search ──'$'──▶ Variant ──'M' (v1)──▶ Header v1 ─┐
//!                    │      'X' (v2)──▶ Header v2 ─┼─▶ Payload ─▶ Checksum
//!                    └── other version ─▶ VersionMismatch
//! ```
//!
//! The scan for `$` has no timeout of its own; every read is bounded by the
//! serial port's read timeout.

use super::crc::{msp_v1_checksum, msp_v2_checksum};
use super::protocol::*;
use crate::error::{MspError, Result};
use crate::serial::SerialPortIO;

/// Header fields shared by both versions once parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameHeader {
    direction: u8,
    flag: u8,
    code: u16,
    len: usize,
}

/// Read one response frame into `payload`, returning its function code
///
/// `payload` is cleared first and reused, so a caller polling in a loop
/// does not reallocate on every frame.
///
/// # Errors
///
/// - [`MspError::ShortRead`] if the port times out mid-frame
/// - [`MspError::VersionMismatch`] if the preamble announces the other version
/// - [`MspError::RemoteError`] if the device answered with `!`
/// - [`MspError::ChecksumError`] on CRC mismatch
pub async fn read_frame_into<P>(port: &mut P, version: MspVersion, payload: &mut Vec<u8>) -> Result<u16>
where
    P: SerialPortIO + ?Sized,
{
    payload.clear();

    seek_preamble(port, version).await?;

    let header = match version {
        MspVersion::V1 => read_header_v1(port).await?,
        MspVersion::V2 => read_header_v2(port).await?,
    };

    if header.direction == MSP_DIRECTION_ERROR {
        // Drop the rest of the frame so the next transaction starts aligned
        let mut rest = vec![0u8; header.len + 1];
        port.read(&mut rest).await?;
        return Err(MspError::RemoteError { code: header.code });
    }

    payload.resize(header.len, 0);
    read_exact(port, payload).await?;

    let mut crc = [0u8; 1];
    read_exact(port, &mut crc).await?;

    let expected = match version {
        MspVersion::V1 => msp_v1_checksum(header.len as u8, header.code as u8, payload),
        MspVersion::V2 => msp_v2_checksum(header.flag, header.code, header.len as u16, payload),
    };

    if expected != crc[0] {
        return Err(MspError::ChecksumError {
            expected,
            received: crc[0],
        });
    }

    Ok(header.code)
}

/// Read one response frame
///
/// # Errors
///
/// Same as [`read_frame_into`].
pub async fn read_frame<P>(port: &mut P, version: MspVersion) -> Result<MspFrame>
where
    P: SerialPortIO + ?Sized,
{
    let mut payload = Vec::new();
    let code = read_frame_into(port, version, &mut payload).await?;
    Ok(MspFrame::new(code, payload))
}

/// Skip bytes up to a `$`, then check the version marker that follows
async fn seek_preamble<P>(port: &mut P, version: MspVersion) -> Result<()>
where
    P: SerialPortIO + ?Sized,
{
    let mut byte = [0u8; 1];

    loop {
        read_exact(port, &mut byte).await?;
        if byte[0] != MSP_PREAMBLE {
            continue;
        }

        read_exact(port, &mut byte).await?;
        match MspVersion::from_marker(byte[0]) {
            Some(received) if received == version => return Ok(()),
            Some(received) => {
                return Err(MspError::VersionMismatch {
                    expected: version,
                    received,
                })
            }
            // Not a frame start, keep scanning
            None => continue,
        }
    }
}

async fn read_header_v1<P>(port: &mut P) -> Result<FrameHeader>
where
    P: SerialPortIO + ?Sized,
{
    let mut header = [0u8; MSP_V1_HEADER_SIZE];
    read_exact(port, &mut header).await?;

    let [direction, len, code] = header;
    Ok(FrameHeader {
        direction,
        flag: 0,
        code: code as u16,
        len: len as usize,
    })
}

async fn read_header_v2<P>(port: &mut P) -> Result<FrameHeader>
where
    P: SerialPortIO + ?Sized,
{
    let mut header = [0u8; MSP_V2_HEADER_SIZE];
    read_exact(port, &mut header).await?;

    let [direction, flag, code_lo, code_hi, len_lo, len_hi] = header;
    Ok(FrameHeader {
        direction,
        flag,
        code: u16::from_le_bytes([code_lo, code_hi]),
        len: u16::from_le_bytes([len_lo, len_hi]) as usize,
    })
}

async fn read_exact<P>(port: &mut P, buf: &mut [u8]) -> Result<()>
where
    P: SerialPortIO + ?Sized,
{
    if buf.is_empty() {
        return Ok(());
    }

    let read = port.read(buf).await?;
    if read < buf.len() {
        return Err(MspError::ShortRead {
            read,
            expected: buf.len(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msp::crc::{crc8_dvb_s2, xor_checksum};
    use crate::msp::encoder::pack;
    use crate::serial::port_trait::mocks::{error_frame, response_frame, MockSerialPort};
    use crate::serial::port_trait::MockSerialPortIO;

    fn v1_raw_imu_frame() -> Vec<u8> {
        let mut frame = vec![0x24, 0x4D, 0x3E, 0x12, 0x66];
        frame.extend_from_slice(&[
            0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04, 0x00, 0x05, 0x00, 0x06, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
        ]);
        let crc = xor_checksum(&frame[3..]);
        frame.push(crc);
        frame
    }

    #[tokio::test]
    async fn test_decode_v1_raw_imu() {
        let mut port = MockSerialPort::new();
        port.push_inbound(&v1_raw_imu_frame());

        let frame = read_frame(&mut port, MspVersion::V1).await.unwrap();
        assert_eq!(frame.code, 102);
        assert_eq!(frame.payload.len(), 18);
        assert_eq!(&frame.payload[..4], &[0x01, 0x00, 0x02, 0x00]);
        assert_eq!(port.pending_inbound(), 0);
    }

    #[tokio::test]
    async fn test_decode_v2_altitude() {
        let mut frame = vec![0x24, 0x58, 0x3E, 0x00, 0x6D, 0x00, 0x06, 0x00];
        frame.extend_from_slice(&[0xE8, 0x03, 0x00, 0x00, 0x00, 0x00]);
        let crc = crc8_dvb_s2(&frame[3..]);
        frame.push(crc);

        let mut port = MockSerialPort::new();
        port.push_inbound(&frame);

        let decoded = read_frame(&mut port, MspVersion::V2).await.unwrap();
        assert_eq!(decoded.code, 109);
        assert_eq!(decoded.payload, vec![0xE8, 0x03, 0x00, 0x00, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn test_skips_garbage_before_preamble() {
        let mut port = MockSerialPort::new();
        port.push_inbound(&[0x00, 0xFF, 0x13, b'M', b'$', b'Q']);
        port.push_inbound(&response_frame(MspVersion::V1, 105, &[0xDC, 0x05]));

        let frame = read_frame(&mut port, MspVersion::V1).await.unwrap();
        assert_eq!(frame.code, 105);
        assert_eq!(frame.payload, vec![0xDC, 0x05]);
    }

    #[tokio::test]
    async fn test_round_trip_both_versions() {
        let payloads: [&[u8]; 4] = [&[], &[0x42], &[0u8; 64], &[0xFFu8; 254]];
        for version in [MspVersion::V1, MspVersion::V2] {
            for payload in payloads {
                let mut port = MockSerialPort::new();
                port.push_inbound(&response_frame(version, 200, payload));

                let frame = read_frame(&mut port, version).await.unwrap();
                assert_eq!(frame.code, 200);
                assert_eq!(frame.payload, payload);
            }
        }
    }

    #[tokio::test]
    async fn test_round_trip_large_v2_payload() {
        let payload: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let mut port = MockSerialPort::new();
        port.push_inbound(&response_frame(MspVersion::V2, 0x3000, &payload));

        let frame = read_frame(&mut port, MspVersion::V2).await.unwrap();
        assert_eq!(frame.code, 0x3000);
        assert_eq!(frame.payload, payload);
    }

    #[tokio::test]
    async fn test_version_mismatch_consumes_two_bytes() {
        let mut port = MockSerialPort::new();
        let frame = response_frame(MspVersion::V2, 109, &[1, 2, 3, 4, 5, 6]);
        port.push_inbound(&frame);

        let err = read_frame(&mut port, MspVersion::V1).await.unwrap_err();
        assert!(matches!(
            err,
            MspError::VersionMismatch {
                expected: MspVersion::V1,
                received: MspVersion::V2
            }
        ));
        assert_eq!(port.pending_inbound(), frame.len() - 2);
    }

    #[tokio::test]
    async fn test_remote_error_v1() {
        let mut port = MockSerialPort::new();
        let crc = xor_checksum(&[0x00, 0x6D]);
        port.push_inbound(&[0x24, 0x4D, 0x21, 0x00, 0x6D, crc]);

        let err = read_frame(&mut port, MspVersion::V1).await.unwrap_err();
        assert!(matches!(err, MspError::RemoteError { code: 109 }));
        assert_eq!(port.pending_inbound(), 0);
    }

    #[tokio::test]
    async fn test_remote_error_drain_propagates_io_error() {
        // Preamble, marker and header arrive; the port dies before the checksum
        let mut port = MockSerialPortIO::new();
        let mut inbound = error_frame(MspVersion::V1, 109).into_iter();
        let mut reads = 0;
        port.expect_read().returning(move |buf| {
            reads += 1;
            if reads > 3 {
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"));
            }
            for slot in buf.iter_mut() {
                *slot = inbound.next().unwrap_or_default();
            }
            Ok(buf.len())
        });

        assert!(matches!(read_frame(&mut port, MspVersion::V1).await, Err(MspError::Io(_))));
    }

    #[tokio::test]
    async fn test_remote_error_v2() {
        let mut port = MockSerialPort::new();
        port.push_inbound(&error_frame(MspVersion::V2, 200));

        let err = read_frame(&mut port, MspVersion::V2).await.unwrap_err();
        assert!(matches!(err, MspError::RemoteError { code: 200 }));
    }

    #[tokio::test]
    async fn test_unknown_direction_is_accepted() {
        let mut frame = response_frame(MspVersion::V1, 109, &[7, 7]);
        frame[2] = b'?';
        let mut port = MockSerialPort::new();
        port.push_inbound(&frame);

        let decoded = read_frame(&mut port, MspVersion::V1).await.unwrap();
        assert_eq!(decoded.payload, vec![7, 7]);
    }

    #[tokio::test]
    async fn test_checksum_error_v1() {
        let mut frame = v1_raw_imu_frame();
        let last = frame.len() - 1;
        frame[last] ^= 0x01;

        let mut port = MockSerialPort::new();
        port.push_inbound(&frame);

        assert!(matches!(
            read_frame(&mut port, MspVersion::V1).await,
            Err(MspError::ChecksumError { .. })
        ));
    }

    #[tokio::test]
    async fn test_v2_single_bit_flip_rejected() {
        let good = response_frame(MspVersion::V2, 109, &[0xE8, 0x03, 0x00, 0x00, 0x00, 0x00]);

        // Flip every bit between the flag and the end of the payload
        for byte in 3..good.len() - 1 {
            for bit in 0..8 {
                let mut frame = good.clone();
                frame[byte] ^= 1 << bit;
                // A flipped length byte may make the frame run short instead
                let mut port = MockSerialPort::new();
                port.push_inbound(&frame);
                let result = read_frame(&mut port, MspVersion::V2).await;
                assert!(result.is_err(), "byte {} bit {} accepted", byte, bit);
            }
        }
    }

    #[tokio::test]
    async fn test_short_read_in_header() {
        let mut port = MockSerialPort::new();
        port.push_inbound(&[0x24, 0x4D, 0x3E, 0x12]);

        assert!(matches!(
            read_frame(&mut port, MspVersion::V1).await,
            Err(MspError::ShortRead { read: 2, expected: 3 })
        ));
    }

    #[tokio::test]
    async fn test_short_read_in_payload() {
        let frame = response_frame(MspVersion::V1, 102, &[0u8; 18]);
        let mut port = MockSerialPort::new();
        port.push_inbound(&frame[..10]);

        assert!(matches!(
            read_frame(&mut port, MspVersion::V1).await,
            Err(MspError::ShortRead { .. })
        ));
    }

    #[tokio::test]
    async fn test_silent_port_is_short_read() {
        let mut port = MockSerialPort::new();
        assert!(matches!(
            read_frame(&mut port, MspVersion::V1).await,
            Err(MspError::ShortRead { read: 0, expected: 1 })
        ));
    }

    #[tokio::test]
    async fn test_payload_buffer_is_reused() {
        let mut port = MockSerialPort::new();
        port.push_inbound(&response_frame(MspVersion::V1, 105, &[1, 2, 3, 4]));
        port.push_inbound(&response_frame(MspVersion::V1, 105, &[5, 6]));

        let mut payload = Vec::new();
        read_frame_into(&mut port, MspVersion::V1, &mut payload).await.unwrap();
        assert_eq!(payload, vec![1, 2, 3, 4]);
        read_frame_into(&mut port, MspVersion::V1, &mut payload).await.unwrap();
        assert_eq!(payload, vec![5, 6]);
    }

    #[test]
    fn test_request_frames_are_not_responses() {
        // Requests carry '<'; the decoder only cares about '!' versus anything else
        let request = pack(MspVersion::V1, 109, &[]).unwrap();
        assert_eq!(request[2], MSP_DIRECTION_REQUEST);
    }
}
