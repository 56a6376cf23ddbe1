//! # MSP FCI
//!
//! Polls telemetry from a flight controller and prints it.
//!
//! ```bash
//! msp-fci [config.toml]
//! ```
//!
//! Without a configuration file the defaults apply: `/dev/ttyACM0` at
//! 115200 baud, MSPv1, IMU at 100 Hz and altitude at 10 Hz.
//!
//! Expected output:
//! ```text
//! [INFO] MSP FCI v0.1.0 starting...
//! [INFO] Opened serial port /dev/ttyACM0 at 115200 baud
//! [INFO] Registered RX Map: [0, 1, 3, 2, 4, 5, 6, 7]
//! Acceleration: [0.0, 0.0, 9.80665] m/s^2, Angular velocity: [0.0, 0.0, 0.0] rad/s
//! Altitude: 1.23 m
//! ```

use anyhow::{Context, Result};
use tracing::info;

use msp_fci::config::{Config, MessageKind};
use msp_fci::logging;
use msp_fci::msp::{Altitude, Imu, Message, RCRawIn, RXMap};
use msp_fci::{Interface, InterfaceOptions};

fn print_message<M: Message>(message: &M) {
    println!("{}", message);
}

fn register(fc: &mut Interface, kind: MessageKind, frequency: f32) -> msp_fci::Result<()> {
    match kind {
        MessageKind::Imu => fc.register_callback::<Imu, _>(frequency, print_message::<Imu>),
        MessageKind::Altitude => fc.register_callback::<Altitude, _>(frequency, print_message::<Altitude>),
        MessageKind::Rc => fc.register_callback::<RCRawIn, _>(frequency, print_message::<RCRawIn>),
        MessageKind::RxMap => fc.register_callback::<RXMap, _>(frequency, print_message::<RXMap>),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("Failed to load {}", path))?,
        None => Config::default(),
    };

    logging::init(config.logging.level);
    info!("MSP FCI v{} starting...", env!("CARGO_PKG_VERSION"));

    let options = InterfaceOptions::from(&config);
    let mut fc = Interface::connect(&config.serial.port, options)
        .await
        .with_context(|| format!("Failed to connect to {}", config.serial.port))?;

    for callback in &config.callbacks {
        register(&mut fc, callback.message, callback.frequency_hz)?;
    }

    info!("Press Ctrl+C to exit");
    tokio::signal::ctrl_c().await?;

    info!("Received Ctrl+C, shutting down...");
    fc.shutdown().await;
    Ok(())
}
