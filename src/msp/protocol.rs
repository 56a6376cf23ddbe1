//! # MSP Protocol Constants and Types
//!
//! Core protocol definitions for MultiWii Serial Protocol communication.

use std::fmt;

/// Frame preamble, first byte of every MSP frame
pub const MSP_PREAMBLE: u8 = b'$';

/// Second preamble byte of an MSPv1 frame
pub const MSP_V1_MARKER: u8 = b'M';

/// Second preamble byte of an MSPv2 frame
pub const MSP_V2_MARKER: u8 = b'X';

/// Direction byte for host-to-device requests
pub const MSP_DIRECTION_REQUEST: u8 = b'<';

/// Direction byte for device-to-host responses
pub const MSP_DIRECTION_RESPONSE: u8 = b'>';

/// Direction byte for device-side errors
pub const MSP_DIRECTION_ERROR: u8 = b'!';

/// Maximum payload size for MSPv1 (8-bit length field)
pub const MSP_V1_MAX_PAYLOAD: usize = 255;

/// Maximum payload size for MSPv2 (16-bit length field)
pub const MSP_V2_MAX_PAYLOAD: usize = 65535;

/// MSPv1 header after the preamble: direction(1) + length(1) + code(1)
pub const MSP_V1_HEADER_SIZE: usize = 3;

/// MSPv2 header after the preamble: direction(1) + flag(1) + code(2) + length(2)
pub const MSP_V2_HEADER_SIZE: usize = 6;

/// RC channel bounds accepted by `MSP_SET_RAW_RC`
pub const RC_CHANNEL_VALUE_MIN: u16 = 1000;
pub const RC_CHANNEL_VALUE_MAX: u16 = 2000;
pub const RC_CHANNEL_VALUE_CENTER: u16 = 1500;

/// On-wire protocol variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MspVersion {
    /// `$M` frames, 8-bit code and length, XOR checksum
    #[default]
    V1,
    /// `$X` frames, 16-bit code and length, CRC-8/DVB-S2
    V2,
}

impl MspVersion {
    /// Largest payload the version can carry
    #[must_use]
    pub fn max_payload(self) -> usize {
        match self {
            MspVersion::V1 => MSP_V1_MAX_PAYLOAD,
            MspVersion::V2 => MSP_V2_MAX_PAYLOAD,
        }
    }

    /// Second preamble byte identifying the version
    #[must_use]
    pub fn marker(self) -> u8 {
        match self {
            MspVersion::V1 => MSP_V1_MARKER,
            MspVersion::V2 => MSP_V2_MARKER,
        }
    }

    /// Version announced by a preamble marker byte, if any
    #[must_use]
    pub fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            MSP_V1_MARKER => Some(MspVersion::V1),
            MSP_V2_MARKER => Some(MspVersion::V2),
            _ => None,
        }
    }

    /// The other variant
    #[must_use]
    pub fn other(self) -> Self {
        match self {
            MspVersion::V1 => MspVersion::V2,
            MspVersion::V2 => MspVersion::V1,
        }
    }

    /// Numeric version (1 or 2), as used in configuration files
    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            MspVersion::V1 => 1,
            MspVersion::V2 => 2,
        }
    }

    /// Parses a numeric version (1 or 2)
    #[must_use]
    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(MspVersion::V1),
            2 => Some(MspVersion::V2),
            _ => None,
        }
    }
}

impl fmt::Display for MspVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MSPv{}", self.number())
    }
}

/// MSP function codes understood by this crate
///
/// Numbering follows the Betaflight/iNav `msp_protocol.h` tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MspCode {
    /// Receiver channel-to-function map
    RxMap = 64,
    /// Raw accelerometer and gyro readings
    RawImu = 102,
    /// Receiver channel values
    Rc = 105,
    /// Estimated altitude and vertical speed
    Altitude = 109,
    /// Override receiver channels (requires `USE_RX_MSP` on the target)
    SetRawRc = 200,
}

impl MspCode {
    /// Numeric function code
    #[must_use]
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl From<MspCode> for u16 {
    fn from(code: MspCode) -> Self {
        code.as_u16()
    }
}

impl TryFrom<u16> for MspCode {
    type Error = u16;

    fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        match value {
            64 => Ok(MspCode::RxMap),
            102 => Ok(MspCode::RawImu),
            105 => Ok(MspCode::Rc),
            109 => Ok(MspCode::Altitude),
            200 => Ok(MspCode::SetRawRc),
            other => Err(other),
        }
    }
}

impl fmt::Display for MspCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MspCode::RxMap => "MSP_RX_MAP",
            MspCode::RawImu => "MSP_RAW_IMU",
            MspCode::Rc => "MSP_RC",
            MspCode::Altitude => "MSP_ALTITUDE",
            MspCode::SetRawRc => "MSP_SET_RAW_RC",
        };
        write!(f, "{}({})", name, self.as_u16())
    }
}

/// A deframed MSP message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MspFrame {
    /// Function code carried by the frame
    pub code: u16,

    /// Payload data
    pub payload: Vec<u8>,
}

impl MspFrame {
    /// Create a new MSP frame
    pub fn new(code: u16, payload: Vec<u8>) -> Self {
        Self { code, payload }
    }
}
