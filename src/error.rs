//! # Error Types
//!
//! Custom error types for MSP FCI using `thiserror`.

use thiserror::Error;

use crate::msp::protocol::MspVersion;

/// Main error type for MSP FCI
#[derive(Debug, Error)]
pub enum MspError {
    /// Serial port is not open
    #[error("serial port is not open")]
    PortClosed,

    /// Payload does not fit the active MSP version
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    /// Serial port accepted fewer bytes than the frame holds
    #[error("short write: {written} of {expected} bytes")]
    WriteShort { written: usize, expected: usize },

    /// Serial port returned fewer bytes than requested
    #[error("short read: {read} of {expected} bytes")]
    ShortRead { read: usize, expected: usize },

    /// Preamble announced the other MSP version
    #[error("version mismatch: expected {expected}, received {received}")]
    VersionMismatch {
        expected: MspVersion,
        received: MspVersion,
    },

    /// Flight controller answered with the `!` direction
    #[error("flight controller rejected code {code}")]
    RemoteError { code: u16 },

    /// Response carried a different code than the request
    #[error("response code {received} does not answer request code {expected}")]
    CodeMismatch { expected: u16, received: u16 },

    /// Checksum mismatch
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{received:02X}")]
    ChecksumError { expected: u8, received: u8 },

    /// Payload too small for the message schema
    #[error("buffer too short: need {needed} bytes at offset {offset}, have {len}")]
    ShortBuffer {
        needed: usize,
        offset: usize,
        len: usize,
    },

    /// Payload length does not match the message schema
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Channel index or value out of bounds
    #[error("channel {index} = {value} is out of range")]
    OutOfRange { index: usize, value: u16 },

    /// Periodic callback frequency is not a positive finite number
    #[error("invalid callback frequency: {0} Hz")]
    InvalidFrequency(f32),

    /// Message does not support the requested direction
    #[error("{0} is not supported")]
    Unsupported(&'static str),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for MSP FCI
pub type Result<T> = std::result::Result<T, MspError>;
