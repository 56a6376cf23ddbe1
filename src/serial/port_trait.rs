//! Trait abstraction for serial port operations to enable testing

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use super::read_full;

/// Trait for serial port I/O operations
///
/// `read` fills as much of `buf` as arrives before the port's read timeout
/// and returns the byte count; callers treat a partial read as a failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SerialPortIO: Send {
    /// Whether the port can currently be used
    fn is_open(&self) -> bool;

    /// Write `data`, returning how many bytes the port accepted
    async fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Read up to `buf.len()` bytes, bounded by the port's timeout
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;

    /// Discard any buffered, unread input
    fn clear_input(&mut self) -> io::Result<()>;

    /// Device path, when the port has one
    fn name(&self) -> Option<String> {
        None
    }

    /// Configured baud rate, when the port has one
    fn baud_rate(&self) -> Option<u32> {
        None
    }
}

/// Wrapper around tokio_serial::SerialStream that implements SerialPortIO
pub struct TokioSerialPort {
    port: tokio_serial::SerialStream,
    name: String,
    baud_rate: u32,
    timeout: Duration,
    open: bool,
}

impl std::fmt::Debug for TokioSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioSerialPort")
            .field("name", &self.name)
            .field("baud_rate", &self.baud_rate)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TokioSerialPort {
    pub fn new(port: tokio_serial::SerialStream, name: &str, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            port,
            name: name.to_string(),
            baud_rate,
            timeout,
            open: true,
        }
    }

    /// Read timeout applied to every `read` call
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn track(&mut self, error: &io::Error) {
        if matches!(
            error.kind(),
            io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected | io::ErrorKind::UnexpectedEof
        ) {
            self.open = false;
        }
    }
}

#[async_trait]
impl SerialPortIO for TokioSerialPort {
    fn is_open(&self) -> bool {
        self.open
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < data.len() {
            match AsyncWriteExt::write(&mut self.port, &data[written..]).await {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) => {
                    self.track(&e);
                    return Err(e);
                }
            }
        }
        Ok(written)
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = self.timeout;
        let result = read_full(&mut self.port, buf, timeout).await;
        if let Err(ref e) = result {
            self.track(e);
        }
        result
    }

    async fn flush(&mut self) -> io::Result<()> {
        AsyncWriteExt::flush(&mut self.port).await
    }

    fn clear_input(&mut self) -> io::Result<()> {
        use tokio_serial::SerialPort;
        self.port
            .clear(tokio_serial::ClearBuffer::Input)
            .map_err(io::Error::from)
    }

    fn name(&self) -> Option<String> {
        Some(self.name.clone())
    }

    fn baud_rate(&self) -> Option<u32> {
        Some(self.baud_rate)
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use crate::msp::encoder::pack;
    use crate::msp::protocol::{MspVersion, MSP_DIRECTION_ERROR, MSP_DIRECTION_RESPONSE};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Produces the device's answer to one written request frame
    pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

    struct MockState {
        open: bool,
        inbound: VecDeque<u8>,
        written: Vec<Vec<u8>>,
        responder: Option<Responder>,
        latency: Duration,
        read_latency: Duration,
        write_limit: Option<usize>,
        interleaved: usize,
        cleared: usize,
    }

    /// Mock serial port for testing
    ///
    /// Clones share state, so a test can keep one handle for inspection
    /// while another is owned by the code under test.
    #[derive(Clone)]
    pub struct MockSerialPort {
        state: Arc<Mutex<MockState>>,
    }

    impl MockSerialPort {
        pub fn new() -> Self {
            Self {
                state: Arc::new(Mutex::new(MockState {
                    open: true,
                    inbound: VecDeque::new(),
                    written: Vec::new(),
                    responder: None,
                    latency: Duration::ZERO,
                    read_latency: Duration::ZERO,
                    write_limit: None,
                    interleaved: 0,
                    cleared: 0,
                })),
            }
        }

        /// Mock that answers every request through `responder`
        pub fn with_responder<F>(responder: F) -> Self
        where
            F: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
        {
            let mock = Self::new();
            mock.state.lock().unwrap().responder = Some(Box::new(responder));
            mock
        }

        pub fn push_inbound(&self, bytes: &[u8]) {
            self.state.lock().unwrap().inbound.extend(bytes.iter().copied());
        }

        pub fn set_latency(&self, latency: Duration) {
            self.state.lock().unwrap().latency = latency;
        }

        /// Delay before every read is served
        pub fn set_read_latency(&self, latency: Duration) {
            self.state.lock().unwrap().read_latency = latency;
        }

        pub fn set_write_limit(&self, limit: Option<usize>) {
            self.state.lock().unwrap().write_limit = limit;
        }

        pub fn set_open(&self, open: bool) {
            self.state.lock().unwrap().open = open;
        }

        pub fn get_written_data(&self) -> Vec<Vec<u8>> {
            self.state.lock().unwrap().written.clone()
        }

        pub fn pending_inbound(&self) -> usize {
            self.state.lock().unwrap().inbound.len()
        }

        /// Requests written while an earlier response was still unread
        pub fn interleaved(&self) -> usize {
            self.state.lock().unwrap().interleaved
        }

        pub fn clear_count(&self) -> usize {
            self.state.lock().unwrap().cleared
        }
    }

    #[async_trait]
    impl SerialPortIO for MockSerialPort {
        fn is_open(&self) -> bool {
            self.state.lock().unwrap().open
        }

        async fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            let latency = self.state.lock().unwrap().latency;
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            let mut guard = self.state.lock().unwrap();
            let state = &mut *guard;
            let accepted = state.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
            let frame = data[..accepted].to_vec();

            if state.responder.is_some() && !state.inbound.is_empty() {
                state.interleaved += 1;
            }
            if let Some(responder) = state.responder.as_mut() {
                let response = responder(&frame);
                state.inbound.extend(response);
            }
            state.written.push(frame);

            Ok(accepted)
        }

        async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let latency = self.state.lock().unwrap().read_latency;
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            let mut state = self.state.lock().unwrap();
            let n = buf.len().min(state.inbound.len());
            for slot in buf[..n].iter_mut() {
                *slot = state.inbound.pop_front().unwrap_or_default();
            }
            Ok(n)
        }

        async fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn clear_input(&mut self) -> io::Result<()> {
            let mut state = self.state.lock().unwrap();
            state.inbound.clear();
            state.cleared += 1;
            Ok(())
        }
    }

    /// Build a device response frame (`>` direction)
    pub fn response_frame(version: MspVersion, code: u16, payload: &[u8]) -> Vec<u8> {
        with_direction(version, code, payload, MSP_DIRECTION_RESPONSE)
    }

    /// Build a device error frame (`!` direction)
    pub fn error_frame(version: MspVersion, code: u16) -> Vec<u8> {
        with_direction(version, code, &[], MSP_DIRECTION_ERROR)
    }

    // The direction byte is outside both checksums, so a packed request can
    // be turned into a response by rewriting it.
    fn with_direction(version: MspVersion, code: u16, payload: &[u8], direction: u8) -> Vec<u8> {
        let mut frame = pack(version, code, payload).unwrap();
        frame[2] = direction;
        frame
    }

    /// Function code of a request frame written by the host
    pub fn request_code(frame: &[u8]) -> u16 {
        match frame.get(1) {
            Some(b'X') => u16::from_le_bytes([frame[4], frame[5]]),
            _ => frame[4] as u16,
        }
    }
}
