//! # MSP Transaction Layer
//!
//! [`Msp`] owns the serial port and moves one frame at a time across it.
//! Callers pair a request with its response by holding the [`SharedMsp`]
//! lock across a `send` and the matching [`Msp::receive_answer`], which is
//! what [`transact`] does.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::decoder::read_frame_into;
use super::encoder::pack;
use super::protocol::{MspFrame, MspVersion};
use crate::error::{MspError, Result};
use crate::serial::{self, SerialPortIO};

/// MSP instance shared between the interface and its periodic workers
///
/// Holding the guard is holding the transaction.
pub type SharedMsp = Arc<Mutex<Msp>>;

/// Frames answering other codes skipped while waiting for one answer
pub const MAX_STALE_FRAMES: usize = 8;

/// Host side of an MSP link
pub struct Msp {
    port: Box<dyn SerialPortIO>,
    version: MspVersion,
    max_payload_bytes: usize,
}

impl std::fmt::Debug for Msp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Msp")
            .field("port", &self.port.name())
            .field("version", &self.version)
            .field("max_payload_bytes", &self.max_payload_bytes)
            .finish()
    }
}

impl Msp {
    /// Wrap an already opened port
    pub fn new(port: Box<dyn SerialPortIO>, version: MspVersion) -> Self {
        Self {
            port,
            version,
            max_payload_bytes: version.max_payload(),
        }
    }

    /// Open `path` and speak `version` on it
    ///
    /// # Errors
    ///
    /// Returns [`MspError::Serial`] if the port cannot be opened.
    pub fn open(path: &str, baud_rate: u32, timeout: Duration, version: MspVersion) -> Result<Self> {
        let port = serial::open(path, baud_rate, timeout)?;
        Ok(Self::new(Box::new(port), version))
    }

    /// Move the instance behind the transaction lock
    pub fn into_shared(self) -> SharedMsp {
        Arc::new(Mutex::new(self))
    }

    pub fn version(&self) -> MspVersion {
        self.version
    }

    /// Switch the protocol version used for following frames
    pub fn set_version(&mut self, version: MspVersion) {
        if version != self.version {
            info!("Switching MSP version from {} to {}", self.version, version);
        }
        self.version = version;
        self.max_payload_bytes = version.max_payload();
    }

    /// Payload limit of the current version
    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    pub fn port_name(&self) -> Option<String> {
        self.port.name()
    }

    pub fn baud_rate(&self) -> Option<u32> {
        self.port.baud_rate()
    }

    pub fn is_open(&self) -> bool {
        self.port.is_open()
    }

    /// Frame `payload` under `code` and write it out
    ///
    /// # Errors
    ///
    /// - [`MspError::PortClosed`] if the port is not open
    /// - [`MspError::PayloadTooLarge`] if `payload` is not below the version's limit
    /// - [`MspError::WriteShort`] if the port accepted only part of the frame
    pub async fn send(&mut self, code: u16, payload: &[u8]) -> Result<()> {
        if !self.port.is_open() {
            return Err(MspError::PortClosed);
        }

        if payload.len() >= self.max_payload_bytes {
            return Err(MspError::PayloadTooLarge {
                len: payload.len(),
                max: self.max_payload_bytes,
            });
        }

        let frame = pack(self.version, code, payload)?;
        let written = self.port.write(&frame).await?;
        if written < frame.len() {
            return Err(MspError::WriteShort {
                written,
                expected: frame.len(),
            });
        }

        self.port.flush().await?;
        debug!("Sent code {} with {} byte payload", code, payload.len());
        Ok(())
    }

    /// Receive one frame into `payload`, returning its code
    ///
    /// On [`MspError::VersionMismatch`] the instance has already switched to
    /// the version announced by the device; the frame itself is dropped.
    ///
    /// # Errors
    ///
    /// [`MspError::PortClosed`], or any error of
    /// [`read_frame_into`](super::decoder::read_frame_into).
    pub async fn receive_into(&mut self, payload: &mut Vec<u8>) -> Result<u16> {
        if !self.port.is_open() {
            return Err(MspError::PortClosed);
        }

        match read_frame_into(&mut *self.port, self.version, payload).await {
            Err(MspError::VersionMismatch { expected, received }) => {
                warn!("Version mismatch: expected {}, received {}", expected, received);
                self.set_version(received);
                Err(MspError::VersionMismatch { expected, received })
            }
            other => other,
        }
    }

    /// Receive one frame
    ///
    /// # Errors
    ///
    /// Same as [`Msp::receive_into`].
    pub async fn receive(&mut self) -> Result<MspFrame> {
        let mut payload = Vec::new();
        let code = self.receive_into(&mut payload).await?;
        Ok(MspFrame::new(code, payload))
    }

    /// Send a request and receive the next frame
    ///
    /// # Errors
    ///
    /// Any error of [`Msp::send`] or [`Msp::receive`].
    pub async fn request(&mut self, code: u16, payload: &[u8]) -> Result<MspFrame> {
        self.send(code, payload).await?;
        self.receive().await
    }

    /// Receive the answer to `code`, skipping frames that answer other codes
    ///
    /// A reply that arrived after its request timed out stays in the input
    /// and would otherwise be taken as the answer to the next request. Up to
    /// [`MAX_STALE_FRAMES`] such frames are dropped before giving up.
    ///
    /// # Errors
    ///
    /// Any error of [`Msp::receive_into`], or [`MspError::CodeMismatch`] once
    /// the stale frame budget is used up.
    pub async fn receive_answer(&mut self, code: u16, payload: &mut Vec<u8>) -> Result<()> {
        let mut stale = 0;
        loop {
            let received = match self.receive_into(payload).await {
                Ok(received) => received,
                Err(MspError::RemoteError { code: received }) if received != code => received,
                Err(e) => return Err(e),
            };
            if received == code {
                return Ok(());
            }

            stale += 1;
            if stale >= MAX_STALE_FRAMES {
                return Err(MspError::CodeMismatch {
                    expected: code,
                    received,
                });
            }
            warn!("Dropping stale answer to code {} while waiting for {}", received, code);
        }
    }

    /// Discard buffered input
    ///
    /// # Errors
    ///
    /// Returns the port's I/O error.
    pub fn flush(&mut self) -> Result<()> {
        self.port.clear_input()?;
        Ok(())
    }
}

/// Run one request/response exchange under the lock
///
/// The lock is held from the request write until the response is read,
/// so no other frame can get between them. Late answers to earlier
/// requests are skipped. The response payload lands in `response`.
///
/// # Errors
///
/// Any error of [`Msp::send`] or [`Msp::receive_answer`].
pub async fn transact(msp: &SharedMsp, code: u16, request: &[u8], response: &mut Vec<u8>) -> Result<()> {
    let mut msp = msp.lock().await;
    msp.send(code, request).await?;
    msp.receive_answer(code, response).await
}
