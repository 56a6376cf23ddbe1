//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every field has a default, so an empty file (or no file at all, via
//! [`Config::default`]) is a valid configuration.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{MspError, Result};
use crate::logging::LoggerLevel;
use crate::msp::protocol::MspVersion;

/// Baud rates accepted by the flight controller firmware
pub const SUPPORTED_BAUD_RATES: [u32; 14] = [
    9600, 19200, 38400, 57600, 115200, 230400, 250000, 400000, 460800, 500000, 921600, 1000000,
    1500000, 2000000,
];

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub msp: MspConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default = "default_callbacks")]
    pub callbacks: Vec<CallbackConfig>,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Upper bound for every serial read
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// MSP link configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MspConfig {
    /// Protocol version to start with, 1 or 2
    #[serde(default = "default_msp_version")]
    pub version: u8,

    /// Delay between attempts while the interface starts up
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LoggerLevel,
}

/// Messages a configured callback can poll
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Imu,
    Altitude,
    Rc,
    RxMap,
}

/// One periodic callback
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CallbackConfig {
    pub message: MessageKind,
    pub frequency_hz: f32,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyACM0".to_string() }
fn default_baud_rate() -> u32 { 115200 }
fn default_timeout_ms() -> u64 { 100 }

fn default_msp_version() -> u8 { 1 }
fn default_retry_interval_ms() -> u64 { 1000 }

fn default_callbacks() -> Vec<CallbackConfig> {
    vec![
        CallbackConfig { message: MessageKind::Imu, frequency_hz: 100.0 },
        CallbackConfig { message: MessageKind::Altitude, frequency_hz: 10.0 },
    ]
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for MspConfig {
    fn default() -> Self {
        Self {
            version: default_msp_version(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            msp: MspConfig::default(),
            logging: LoggingConfig::default(),
            callbacks: default_callbacks(),
        }
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl MspConfig {
    /// Configured version, MSPv1 if the number is unknown
    pub fn version(&self) -> MspVersion {
        MspVersion::from_number(self.version).unwrap_or_default()
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

fn invalid(message: impl std::fmt::Display) -> MspError {
    MspError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use msp_fci::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns [`MspError::Config`] on parse or validation failure.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {:?}",
                SUPPORTED_BAUD_RATES
            )));
        }

        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 10000 {
            return Err(invalid("timeout_ms must be between 1 and 10000"));
        }

        if MspVersion::from_number(self.msp.version).is_none() {
            return Err(invalid("msp version must be 1 or 2"));
        }

        if self.msp.retry_interval_ms == 0 || self.msp.retry_interval_ms > 60000 {
            return Err(invalid("retry_interval_ms must be between 1 and 60000"));
        }

        for callback in &self.callbacks {
            let frequency = callback.frequency_hz;
            if !frequency.is_finite() || frequency <= 0.0 || frequency > 1000.0 {
                return Err(invalid(format!(
                    "{:?} callback frequency_hz must be in (0, 1000], got {}",
                    callback.message, frequency
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.serial.port, "/dev/ttyACM0");
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.serial.timeout(), Duration::from_millis(100));
        assert_eq!(config.msp.version(), MspVersion::V1);
        assert_eq!(config.msp.retry_interval(), Duration::from_secs(1));
        assert_eq!(config.logging.level, LoggerLevel::Full);
        assert_eq!(config.callbacks.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[serial]
port = "/dev/ttyUSB1"
baud_rate = 921600
timeout_ms = 250

[msp]
version = 2
retry_interval_ms = 500

[logging]
level = "warn"

[[callbacks]]
message = "rc"
frequency_hz = 25.0

[[callbacks]]
message = "rx_map"
frequency_hz = 0.5
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB1");
        assert_eq!(config.serial.baud_rate, 921600);
        assert_eq!(config.serial.timeout_ms, 250);
        assert_eq!(config.msp.version(), MspVersion::V2);
        assert_eq!(config.msp.retry_interval_ms, 500);
        assert_eq!(config.logging.level, LoggerLevel::Warn);
        assert_eq!(
            config.callbacks,
            vec![
                CallbackConfig { message: MessageKind::Rc, frequency_hz: 25.0 },
                CallbackConfig { message: MessageKind::RxMap, frequency_hz: 0.5 },
            ]
        );
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Config::load("/nonexistent/msp-fci.toml"),
            Err(MspError::Io(_))
        ));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            Config::from_toml("[serial]\nbaud_rate = \"fast\""),
            Err(MspError::Config(_))
        ));
        assert!(Config::from_toml("[[callbacks]]\nmessage = \"gps\"\nfrequency_hz = 1.0").is_err());
    }

    #[test]
    fn test_validation_rejects_out_of_range_values() {
        let cases = [
            "[serial]\nport = \"\"",
            "[serial]\nbaud_rate = 420000",
            "[serial]\ntimeout_ms = 0",
            "[serial]\ntimeout_ms = 10001",
            "[msp]\nversion = 3",
            "[msp]\nretry_interval_ms = 0",
            "[msp]\nretry_interval_ms = 60001",
            "[[callbacks]]\nmessage = \"imu\"\nfrequency_hz = 0.0",
            "[[callbacks]]\nmessage = \"imu\"\nfrequency_hz = 1000.5",
        ];

        for case in cases {
            let result = Config::from_toml(case);
            assert!(matches!(result, Err(MspError::Config(_))), "accepted: {}", case);
        }
    }

    #[test]
    fn test_validation_error_message() {
        let err = Config::from_toml("[msp]\nversion = 7").unwrap_err();
        assert!(err.to_string().contains("msp version must be 1 or 2"));
    }

    #[test]
    fn test_explicit_empty_callbacks() {
        let config = Config::from_toml("callbacks = []").unwrap();
        assert!(config.callbacks.is_empty());
    }
}
