//! # Flight Controller Interface
//!
//! High-level access to a flight controller over MSP.
//!
//! This module handles:
//! - Startup: AUX map discovery and RC reset, retried until they succeed
//! - One-shot reads of any [`Message`]
//! - Arming, disarming and stick (TRPY) commands through `MSP_SET_RAW_RC`
//! - Periodic callbacks polling messages in the background
//!
//! Public commands report pass/fail as `bool` and log the reason; the
//! `try_*` variants return the structured error.

pub mod periodic;

pub use periodic::{PeriodicCallback, PeriodicWorker, WorkerStatsSnapshot};

use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{MspError, Result};
use crate::logging::{self, LoggerLevel};
use crate::msp::messages::functions::{AUX1, PITCH, ROLL, THROTTLE, YAW};
use crate::msp::protocol::{MspVersion, RC_CHANNEL_VALUE_CENTER, RC_CHANNEL_VALUE_MAX, RC_CHANNEL_VALUE_MIN};
use crate::msp::transaction::{transact, Msp, SharedMsp};
use crate::msp::{Message, RCRawIn, RCRawOut, RXMap};
use crate::serial::{self, SerialPortIO};

/// AUX1 value that arms the vehicle
pub const ARM_VALUE: u16 = RC_CHANNEL_VALUE_MIN;

/// AUX1 value that disarms the vehicle
pub const DISARM_VALUE: u16 = RC_CHANNEL_VALUE_MAX;

/// Connection settings for [`Interface::connect`]
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceOptions {
    pub baud_rate: u32,
    pub version: MspVersion,
    pub log_level: LoggerLevel,
    /// Upper bound for every serial read
    pub read_timeout: Duration,
    /// Delay between startup attempts
    pub retry_interval: Duration,
}

impl Default for InterfaceOptions {
    fn default() -> Self {
        Self {
            baud_rate: serial::DEFAULT_BAUD_RATE,
            version: MspVersion::V1,
            log_level: LoggerLevel::Full,
            read_timeout: serial::DEFAULT_READ_TIMEOUT,
            retry_interval: Duration::from_secs(1),
        }
    }
}

impl From<&Config> for InterfaceOptions {
    fn from(config: &Config) -> Self {
        Self {
            baud_rate: config.serial.baud_rate,
            version: config.msp.version(),
            log_level: config.logging.level,
            read_timeout: config.serial.timeout(),
            retry_interval: config.msp.retry_interval(),
        }
    }
}

/// Connection to one flight controller
///
/// Created by [`Interface::connect`], which only returns once the AUX map
/// is known and the RC channels are in a safe state. Periodic callbacks
/// registered on the interface stop when it is shut down or dropped.
pub struct Interface {
    msp: SharedMsp,
    rx_map: RXMap,
    rc_out: RCRawOut,
    callbacks: Vec<Box<dyn PeriodicWorker>>,
    options: InterfaceOptions,
}

impl std::fmt::Debug for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interface")
            .field("rx_map", &self.rx_map)
            .field("rc_out", &self.rc_out)
            .field("callbacks", &self.callbacks.len())
            .field("options", &self.options)
            .finish()
    }
}

impl Interface {
    /// Open `port` and wait until the flight controller is usable
    ///
    /// Installs the global logger at `options.log_level` (unless one is
    /// already installed), then retries AUX map discovery and RC reset every
    /// `options.retry_interval` until both succeed.
    ///
    /// # Errors
    ///
    /// Returns [`MspError::Serial`] if the port cannot be opened. Protocol
    /// failures during startup are retried, never returned.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use msp_fci::interface::{Interface, InterfaceOptions};
    /// use msp_fci::msp::Altitude;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let fc = Interface::connect("/dev/ttyACM0", InterfaceOptions::default()).await?;
    ///     let mut altitude = Altitude::default();
    ///     if fc.read(&mut altitude).await {
    ///         println!("{}", altitude);
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(port: &str, options: InterfaceOptions) -> Result<Self> {
        logging::init(options.log_level);

        let msp = Msp::open(port, options.baud_rate, options.read_timeout, options.version)?;
        Ok(Self::start(msp, options).await)
    }

    /// Same as [`Interface::connect`] over an already opened port
    pub async fn with_transport(port: Box<dyn SerialPortIO>, options: InterfaceOptions) -> Self {
        let msp = Msp::new(port, options.version);
        Self::start(msp, options).await
    }

    async fn start(msp: Msp, options: InterfaceOptions) -> Self {
        let mut interface = Self {
            msp: msp.into_shared(),
            rx_map: RXMap::default(),
            rc_out: RCRawOut::default(),
            callbacks: Vec::new(),
            options,
        };

        while let Err(e) = interface.register_aux_map().await {
            warn!(
                "Unable to register AUX map ({}), retrying in {:?}",
                e, interface.options.retry_interval
            );
            tokio::time::sleep(interface.options.retry_interval).await;
        }
        info!("Registered {}", interface.rx_map);

        while let Err(e) = interface.try_reset_rc().await {
            warn!(
                "Unable to reset RC channels ({}), retrying in {:?}",
                e, interface.options.retry_interval
            );
            tokio::time::sleep(interface.options.retry_interval).await;
        }
        info!("Reset {}", interface.rc_out);

        interface
    }

    async fn register_aux_map(&mut self) -> Result<()> {
        let mut map = RXMap::default();
        self.try_read(&mut map).await?;
        self.rx_map = map;
        Ok(())
    }

    /// Request `message` and decode the answer into it
    ///
    /// `message` is left untouched on failure.
    ///
    /// # Errors
    ///
    /// Any transaction or decode error.
    pub async fn try_read<M: Message>(&self, message: &mut M) -> Result<()> {
        let mut payload = Vec::new();
        transact(&self.msp, message.code().as_u16(), &[], &mut payload).await?;
        message.decode(&payload)
    }

    /// Request `message` and decode the answer into it
    ///
    /// Returns `false`, and logs why, on failure.
    pub async fn read<M: Message>(&self, message: &mut M) -> bool {
        match self.try_read(message).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to read {}: {}", message.code(), e);
                false
            }
        }
    }

    /// Arm by setting AUX1 to [`ARM_VALUE`]
    pub async fn arm(&mut self) -> bool {
        self.report("arm", &[(AUX1, ARM_VALUE)]).await
    }

    /// Disarm by setting AUX1 to [`DISARM_VALUE`]
    pub async fn disarm(&mut self) -> bool {
        self.report("disarm", &[(AUX1, DISARM_VALUE)]).await
    }

    /// Command throttle, roll, pitch and yaw, each in 1000..=2000
    ///
    /// Channels are placed according to the AUX map. Nothing is sent if
    /// any value is out of range.
    pub async fn trpy(&mut self, throttle: u16, roll: u16, pitch: u16, yaw: u16) -> bool {
        self.report(
            "set TRPY",
            &[(ROLL, roll), (PITCH, pitch), (YAW, yaw), (THROTTLE, throttle)],
        )
        .await
    }

    /// Center every channel and pull throttle to its minimum
    ///
    /// The channel count is taken from the flight controller's `MSP_RC`.
    pub async fn reset_rc(&mut self) -> bool {
        match self.try_reset_rc().await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to reset RC channels: {}", e);
                false
            }
        }
    }

    async fn try_reset_rc(&mut self) -> Result<()> {
        let mut rc_in = RCRawIn::default();
        self.try_read(&mut rc_in).await?;

        let mut rc_out = RCRawOut::new(vec![RC_CHANNEL_VALUE_CENTER; rc_in.channels().len()]);
        let throttle = self.channel_for(THROTTLE, RC_CHANNEL_VALUE_MIN)?;
        rc_out.set_channel(throttle, RC_CHANNEL_VALUE_MIN)?;

        self.send_rc(&rc_out).await?;
        self.rc_out = rc_out;
        Ok(())
    }

    async fn report(&mut self, action: &str, updates: &[(usize, u16)]) -> bool {
        match self.write_functions(updates).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to {}: {}", action, e);
                false
            }
        }
    }

    /// Apply `(function, value)` updates to a copy of the channels, send
    /// it, and keep it only once it is on the wire
    async fn write_functions(&mut self, updates: &[(usize, u16)]) -> Result<()> {
        let mut rc_out = self.rc_out.clone();
        for &(function, value) in updates {
            let channel = self.channel_for(function, value)?;
            rc_out.set_channel(channel, value)?;
        }

        self.send_rc(&rc_out).await?;
        self.rc_out = rc_out;
        Ok(())
    }

    fn channel_for(&self, function: usize, value: u16) -> Result<usize> {
        self.rx_map
            .channel_for(function)
            .ok_or(MspError::OutOfRange { index: function, value })
    }

    /// Send `MSP_SET_RAW_RC`, then consume its acknowledgement if one comes
    ///
    /// Only the send decides success. Targets built without MSP receiver
    /// support reject the frame or stay silent, which is logged and ignored.
    async fn send_rc(&self, rc_out: &RCRawOut) -> Result<()> {
        let mut payload = Vec::new();
        rc_out.encode(&mut payload)?;

        let code = rc_out.code().as_u16();
        let mut msp = self.msp.lock().await;
        msp.send(code, &payload).await?;

        let mut ack = Vec::new();
        if let Err(e) = msp.receive_answer(code, &mut ack).await {
            warn!("No acknowledgement for {}: {}", rc_out.code(), e);
        }
        Ok(())
    }

    /// Poll `M` at `frequency` Hz for the lifetime of the interface
    ///
    /// `callback` runs on the worker's task with each decoded message.
    ///
    /// # Errors
    ///
    /// [`MspError::InvalidFrequency`] unless `0 < frequency <= 1000`.
    pub fn register_callback<M, F>(&mut self, frequency: f32, callback: F) -> Result<()>
    where
        M: Message + Default + 'static,
        F: FnMut(&M) + Send + 'static,
    {
        let worker = self.periodic::<M, F>(frequency, callback)?;
        info!("Registered {} callback at {} Hz", worker.code(), frequency);
        self.callbacks.push(Box::new(worker));
        Ok(())
    }

    /// Start a worker polling `M` whose lifetime the caller controls
    ///
    /// # Errors
    ///
    /// [`MspError::InvalidFrequency`] unless `0 < frequency <= 1000`.
    pub fn periodic<M, F>(&self, frequency: f32, callback: F) -> Result<PeriodicCallback<M>>
    where
        M: Message + Default + 'static,
        F: FnMut(&M) + Send + 'static,
    {
        PeriodicCallback::new(self.msp.clone(), frequency, callback)
    }

    /// Stop every registered callback and wait for them to finish
    pub async fn stop_callbacks(&mut self) {
        for worker in self.callbacks.iter_mut() {
            worker.stop().await;
        }
        self.callbacks.clear();
    }

    /// Stop all callbacks, then release the port
    pub async fn shutdown(mut self) {
        self.stop_callbacks().await;
        info!("Interface shut down");
    }

    pub fn rx_map(&self) -> &RXMap {
        &self.rx_map
    }

    /// Last channel values sent to the flight controller
    pub fn rc_channels(&self) -> &[u16] {
        self.rc_out.channels()
    }

    /// Callbacks registered through [`Interface::register_callback`]
    pub fn callbacks(&self) -> &[Box<dyn PeriodicWorker>] {
        &self.callbacks
    }

    pub fn log_level(&self) -> LoggerLevel {
        self.options.log_level
    }

    pub fn options(&self) -> &InterfaceOptions {
        &self.options
    }

    /// Underlying MSP instance, for raw transactions
    pub fn msp(&self) -> &SharedMsp {
        &self.msp
    }
}
