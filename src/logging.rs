//! # Logging
//!
//! Level-gated line logging on top of `tracing`.
//!
//! Every component logs through the `tracing` macros. [`init`] installs a
//! global subscriber that renders one line per event:
//!
//! ```text
//! [INFO] Opened serial port /dev/ttyACM0 at 115200 baud
//! [WARNING] Version mismatch: expected MSPv1, received MSPv2   (yellow)
//! [ERROR] Failed to read MSP_ALTITUDE(109): short read          (red)
//! ```

use serde::Deserialize;
use std::fmt;
use std::io::IsTerminal;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

const ANSI_YELLOW: &str = "\x1b[33m";
const ANSI_RED: &str = "\x1b[31m";
const ANSI_RESET: &str = "\x1b[0m";

/// Verbosity, ordered from most to least verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggerLevel {
    /// Everything, including debug and trace output
    #[default]
    Full,
    Info,
    Warn,
    Err,
    /// Nothing
    Inactive,
}

impl LoggerLevel {
    /// Most verbose `tracing` level let through
    pub fn level_filter(self) -> LevelFilter {
        match self {
            LoggerLevel::Full => LevelFilter::TRACE,
            LoggerLevel::Info => LevelFilter::INFO,
            LoggerLevel::Warn => LevelFilter::WARN,
            LoggerLevel::Err => LevelFilter::ERROR,
            LoggerLevel::Inactive => LevelFilter::OFF,
        }
    }
}

impl fmt::Display for LoggerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoggerLevel::Full => "full",
            LoggerLevel::Info => "info",
            LoggerLevel::Warn => "warn",
            LoggerLevel::Err => "err",
            LoggerLevel::Inactive => "inactive",
        };
        f.write_str(name)
    }
}

/// Event formatter producing `[LEVEL] message` lines
#[derive(Debug, Clone, Copy)]
pub struct MspLogFormat {
    ansi: bool,
}

impl MspLogFormat {
    pub fn new(ansi: bool) -> Self {
        Self { ansi }
    }
}

impl<S, N> FormatEvent<S, N> for MspLogFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let (label, color) = match *event.metadata().level() {
            Level::ERROR => ("ERROR", Some(ANSI_RED)),
            Level::WARN => ("WARNING", Some(ANSI_YELLOW)),
            Level::INFO => ("INFO", None),
            Level::DEBUG => ("DEBUG", None),
            Level::TRACE => ("TRACE", None),
        };
        let color = color.filter(|_| self.ansi);

        if let Some(color) = color {
            writer.write_str(color)?;
        }
        write!(writer, "[{}] ", label)?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        if color.is_some() {
            writer.write_str(ANSI_RESET)?;
        }
        writeln!(writer)
    }
}

/// Install the global subscriber at `level`
///
/// `RUST_LOG` directives are applied on top of `level`. Returns `false`
/// if a global subscriber was already installed, in which case the
/// existing one keeps running.
pub fn init(level: LoggerLevel) -> bool {
    let filter = EnvFilter::builder()
        .with_default_directive(level.level_filter().into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .event_format(MspLogFormat::new(std::io::stdout().is_terminal()))
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}


#[cfg(test)]
mod tests {
    use super::capture::{subscriber, CaptureWriter};
    use super::*;
    use tracing::{debug, error, info, warn};

    fn capture<F: FnOnce()>(level: LoggerLevel, ansi: bool, f: F) -> String {
        let sink = CaptureWriter::default();
        tracing::subscriber::with_default(subscriber(sink.clone(), level, ansi), f);
        sink.contents()
    }

    #[test]
    fn test_level_order() {
        assert!(LoggerLevel::Full < LoggerLevel::Info);
        assert!(LoggerLevel::Info < LoggerLevel::Warn);
        assert!(LoggerLevel::Warn < LoggerLevel::Err);
        assert!(LoggerLevel::Err < LoggerLevel::Inactive);
        assert_eq!(LoggerLevel::default(), LoggerLevel::Full);
    }

    #[test]
    fn test_level_filter_mapping() {
        assert_eq!(LoggerLevel::Full.level_filter(), LevelFilter::TRACE);
        assert_eq!(LoggerLevel::Info.level_filter(), LevelFilter::INFO);
        assert_eq!(LoggerLevel::Warn.level_filter(), LevelFilter::WARN);
        assert_eq!(LoggerLevel::Err.level_filter(), LevelFilter::ERROR);
        assert_eq!(LoggerLevel::Inactive.level_filter(), LevelFilter::OFF);
    }

    #[test]
    fn test_plain_lines() {
        let output = capture(LoggerLevel::Full, false, || {
            info!("link up");
            warn!("slow");
            error!("broken");
        });

        assert_eq!(output, "[INFO] link up\n[WARNING] slow\n[ERROR] broken\n");
    }

    #[test]
    fn test_colored_lines() {
        let output = capture(LoggerLevel::Full, true, || {
            info!("link up");
            warn!("slow");
            error!("broken");
        });

        assert_eq!(
            output,
            "[INFO] link up\n\x1b[33m[WARNING] slow\x1b[0m\n\x1b[31m[ERROR] broken\x1b[0m\n"
        );
    }

    #[test]
    fn test_level_gating() {
        let output = capture(LoggerLevel::Warn, false, || {
            debug!("noise");
            info!("hidden");
            warn!("shown");
            error!("shown too");
        });
        assert_eq!(output, "[WARNING] shown\n[ERROR] shown too\n");

        let output = capture(LoggerLevel::Inactive, false, || error!("silent"));
        assert!(output.is_empty());
    }

    #[test]
    fn test_deserialize_level() {
        #[derive(Deserialize)]
        struct Wrapper {
            level: LoggerLevel,
        }

        let parsed: Wrapper = toml::from_str("level = \"err\"").unwrap();
        assert_eq!(parsed.level, LoggerLevel::Err);
        assert!(toml::from_str::<Wrapper>("level = \"verbose\"").is_err());
    }

    #[test]
    fn test_display_matches_config_names() {
        assert_eq!(LoggerLevel::Inactive.to_string(), "inactive");
        assert_eq!(LoggerLevel::Full.to_string(), "full");
    }
}
