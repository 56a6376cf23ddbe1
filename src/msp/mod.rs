//! # MSP Protocol Module
//!
//! Implementation of the MultiWii Serial Protocol (MSP) host side.
//!
//! This module handles:
//! - Little-endian payload codecs
//! - MSPv1 / MSPv2 frame encoding and decoding
//! - XOR and CRC-8/DVB-S2 checksums
//! - Typed message schemas
//! - The request/response transaction layer

pub mod codec;
pub mod crc;
pub mod decoder;
pub mod encoder;
pub mod messages;
pub mod protocol;
pub mod transaction;

pub use messages::{Altitude, Imu, Message, RCRawIn, RCRawOut, RXMap};
pub use protocol::{MspCode, MspFrame, MspVersion};
pub use transaction::{transact, Msp, SharedMsp};
