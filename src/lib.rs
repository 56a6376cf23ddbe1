//! # MSP FCI
//!
//! Host-side MultiWii Serial Protocol client for flight controllers.
//!
//! This library speaks MSPv1 and MSPv2 over a serial link. With it you can
//! read telemetry (IMU, altitude, receiver channels, channel map) and
//! command the vehicle (arm, disarm, stick channels) from a companion
//! computer. Reads can also run periodically on background workers.

pub mod config;
pub mod error;
pub mod interface;
pub mod logging;
pub mod msp;
pub mod serial;

pub use error::{MspError, Result};
pub use interface::{Interface, InterfaceOptions};
