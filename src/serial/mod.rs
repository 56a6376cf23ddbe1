//! # Serial Communication Module
//!
//! Handles the serial link to the flight controller.
//!
//! This module handles:
//! - Opening the serial port (8N1, no flow control)
//! - Timeout-bounded reads of exact byte counts
//! - The [`SerialPortIO`] seam used by the MSP transaction layer

pub mod port_trait;

pub use port_trait::{SerialPortIO, TokioSerialPort};

use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info};

use crate::error::{MspError, Result};

/// Default MSP baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default bound on a single serial read
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Open a serial port with MSP settings
///
/// # Arguments
///
/// * `path` - Device path (e.g., "/dev/ttyACM0")
/// * `baud_rate` - Line speed, 115200 for most flight controllers
/// * `timeout` - Upper bound for each read
///
/// # Errors
///
/// Returns [`MspError::Serial`] if the device cannot be opened.
///
/// # Examples
///
/// ```no_run
/// use msp_fci::serial::{open, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let port = open("/dev/ttyACM0", DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT)?;
///     println!("{:?}", port);
///     Ok(())
/// }
/// ```
pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<TokioSerialPort> {
    debug!("Trying to open serial port: {}", path);

    let port = tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .timeout(timeout)
        .open_native_async()
        .map_err(|e| MspError::Serial(format!("Failed to open {}: {}", path, e)))?;

    info!("Opened serial port {} at {} baud", path, baud_rate);
    Ok(TokioSerialPort::new(port, path, baud_rate, timeout))
}

/// Fill `buf` from `reader`, giving up once `timeout` has elapsed
///
/// Returns the number of bytes read, which is less than `buf.len()` on
/// timeout or end of stream.
pub async fn read_full<R>(reader: &mut R, buf: &mut [u8], timeout: Duration) -> io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let deadline = Instant::now() + timeout;
    let mut filled = 0;

    while filled < buf.len() {
        match tokio::time::timeout_at(deadline, reader.read(&mut buf[filled..])).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => filled += n,
            Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => break,
            Ok(Err(e)) => return Err(e),
            Err(_) => break,
        }
    }

    Ok(filled)
}
