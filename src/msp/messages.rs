//! # MSP Message Catalog
//!
//! Typed payload schemas for the MSP codes this crate speaks.
//!
//! | Message | Code | Decode | Encode |
//! |---------|------|--------|--------|
//! | [`Imu`] | `MSP_RAW_IMU` (102) | yes | no |
//! | [`Altitude`] | `MSP_ALTITUDE` (109) | yes | no |
//! | [`RXMap`] | `MSP_RX_MAP` (64) | yes | no |
//! | [`RCRawIn`] | `MSP_RC` (105) | yes | no |
//! | [`RCRawOut`] | `MSP_SET_RAW_RC` (200) | no | yes |
//!
//! New messages are added by implementing [`Message`] for a new type.

use std::f32::consts::PI;
use std::fmt;

use super::codec::{decode_float, decode_int, encode_int};
use super::protocol::{MspCode, RC_CHANNEL_VALUE_MAX, RC_CHANNEL_VALUE_MIN};
use crate::error::{MspError, Result};

/// A typed MSP message
///
/// Rendering goes through [`fmt::Display`].
pub trait Message: fmt::Display + Send {
    /// MSP code the message is requested or sent with
    fn code(&self) -> MspCode;

    /// Replace the message fields with the contents of `payload`
    ///
    /// # Errors
    ///
    /// [`MspError::Unsupported`] unless the message can be read from the
    /// flight controller; a schema error if the payload does not fit.
    fn decode(&mut self, _payload: &[u8]) -> Result<()> {
        Err(MspError::Unsupported("decode"))
    }

    /// Append the message payload to `out`
    ///
    /// # Errors
    ///
    /// [`MspError::Unsupported`] unless the message can be sent to the
    /// flight controller.
    fn encode(&self, _out: &mut Vec<u8>) -> Result<()> {
        Err(MspError::Unsupported("encode"))
    }
}

/// Accelerometer scale: 1 g = 512 LSB at ±8 g full range, in m/s²
pub const ACC_SCALE: f32 = 9.80665 * (8.0 / 4096.0);

/// Gyro scale from raw rate readings to rad/s
pub const GYRO_SCALE: f32 = (PI / 180.0) / (2000.0 / 16.4);

/// Altitude scale: centimeters to meters
pub const ALTITUDE_SCALE: f32 = 0.01;

/// `MSP_RAW_IMU` payload size: accelerometer, gyro and magnetometer, 3 × i16 each
pub const RAW_IMU_PAYLOAD_SIZE: usize = 18;

/// Raw IMU readings converted to SI units
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Imu {
    /// Acceleration in m/s²
    acc: [f32; 3],
    /// Angular rate in rad/s
    ang: [f32; 3],
}

impl Imu {
    pub fn acc(&self) -> [f32; 3] {
        self.acc
    }

    pub fn ang(&self) -> [f32; 3] {
        self.ang
    }
}

impl Message for Imu {
    fn code(&self) -> MspCode {
        MspCode::RawImu
    }

    fn decode(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() < RAW_IMU_PAYLOAD_SIZE {
            return Err(MspError::ShortBuffer {
                needed: RAW_IMU_PAYLOAD_SIZE,
                offset: 0,
                len: payload.len(),
            });
        }

        let mut acc = [0.0; 3];
        let mut ang = [0.0; 3];
        for axis in 0..3 {
            acc[axis] = decode_float::<i16, f32>(payload, 2 * axis, ACC_SCALE)?;
            ang[axis] = decode_float::<i16, f32>(payload, 6 + 2 * axis, GYRO_SCALE)?;
        }

        self.acc = acc;
        self.ang = ang;
        Ok(())
    }
}

impl fmt::Display for Imu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Acceleration: {:?} m/s^2, Angular velocity: {:?} rad/s",
            self.acc, self.ang
        )
    }
}

/// Estimated altitude
///
/// The vario field that follows the altitude on most targets is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Altitude {
    /// Altitude in meters
    altitude: f32,
}

impl Altitude {
    pub fn altitude(&self) -> f32 {
        self.altitude
    }
}

impl Message for Altitude {
    fn code(&self) -> MspCode {
        MspCode::Altitude
    }

    fn decode(&mut self, payload: &[u8]) -> Result<()> {
        self.altitude = decode_float::<i32, f32>(payload, 0, ALTITUDE_SCALE)?;
        Ok(())
    }
}

impl fmt::Display for Altitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Altitude: {} m", self.altitude)
    }
}

/// Logical stick and switch functions, as indices into [`RXMap`]
pub mod functions {
    pub const ROLL: usize = 0;
    pub const PITCH: usize = 1;
    pub const YAW: usize = 2;
    pub const THROTTLE: usize = 3;
    pub const AUX1: usize = 4;
}

/// Receiver channel map
///
/// Byte `i` is the RC channel index carrying logical function `i`
/// (see [`functions`]).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RXMap {
    map: Vec<u8>,
}

impl RXMap {
    pub fn map(&self) -> &[u8] {
        &self.map
    }

    /// RC channel index carrying `function`, if the map covers it
    pub fn channel_for(&self, function: usize) -> Option<usize> {
        self.map.get(function).map(|&channel| channel as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Message for RXMap {
    fn code(&self) -> MspCode {
        MspCode::RxMap
    }

    fn decode(&mut self, payload: &[u8]) -> Result<()> {
        if payload.is_empty() {
            return Err(MspError::ShortBuffer {
                needed: 1,
                offset: 0,
                len: 0,
            });
        }

        let mut map = Vec::with_capacity(payload.len());
        for offset in 0..payload.len() {
            map.push(decode_int::<u8>(payload, offset)?);
        }

        self.map = map;
        Ok(())
    }
}

impl fmt::Display for RXMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RX Map: {:?}", self.map)
    }
}

/// Receiver channel values as seen by the flight controller
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RCRawIn {
    channels: Vec<u16>,
}

impl RCRawIn {
    pub fn channels(&self) -> &[u16] {
        &self.channels
    }

    pub fn channel(&self, idx: usize) -> Option<u16> {
        self.channels.get(idx).copied()
    }
}

impl Message for RCRawIn {
    fn code(&self) -> MspCode {
        MspCode::Rc
    }

    fn decode(&mut self, payload: &[u8]) -> Result<()> {
        if payload.is_empty() || payload.len() % 2 != 0 {
            return Err(MspError::InvalidPayload(format!(
                "RC payload must be a non-empty multiple of 2 bytes, got {}",
                payload.len()
            )));
        }

        let mut channels = Vec::with_capacity(payload.len() / 2);
        for offset in (0..payload.len()).step_by(2) {
            channels.push(decode_int::<u16>(payload, offset)?);
        }

        self.channels = channels;
        Ok(())
    }
}

impl fmt::Display for RCRawIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RC Channels: {:?}", self.channels)
    }
}

/// Channel values to override the receiver with (`MSP_SET_RAW_RC`)
///
/// Only takes effect on targets built with `USE_RX_MSP`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RCRawOut {
    channels: Vec<u16>,
}

impl RCRawOut {
    /// Creates the message from `channels` without range checks
    pub fn new(channels: Vec<u16>) -> Self {
        Self { channels }
    }

    pub fn channels(&self) -> &[u16] {
        &self.channels
    }

    /// Set one channel, checking the index and the 1000..=2000 range
    ///
    /// # Errors
    ///
    /// [`MspError::OutOfRange`] if `idx` is past the last channel or `value`
    /// is outside 1000..=2000. The channels are left untouched on error.
    pub fn set_channel(&mut self, idx: usize, value: u16) -> Result<()> {
        if !(RC_CHANNEL_VALUE_MIN..=RC_CHANNEL_VALUE_MAX).contains(&value) {
            return Err(MspError::OutOfRange { index: idx, value });
        }

        match self.channels.get_mut(idx) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(MspError::OutOfRange { index: idx, value }),
        }
    }

    /// Replace every channel; the caller is responsible for the values
    pub fn set_all(&mut self, channels: Vec<u16>) {
        self.channels = channels;
    }
}

impl Message for RCRawOut {
    fn code(&self) -> MspCode {
        MspCode::SetRawRc
    }

    fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        out.reserve(self.channels.len() * 2);
        for &channel in &self.channels {
            encode_int(channel, out);
        }
        Ok(())
    }
}

impl fmt::Display for RCRawOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RC Channels: {:?}", self.channels)
    }
}
