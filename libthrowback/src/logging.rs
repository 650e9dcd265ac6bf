//! Logging setup
//!
//! Log lines always go to stderr so that `--format json` output on stdout
//! stays parseable. The format and level come from `THROWBACK_LOG_FORMAT`
//! and `THROWBACK_LOG_LEVEL`; `RUST_LOG`, when set, replaces the level.
//!
//! ```no_run
//! use libthrowback::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig {
//!     format: LogFormat::Json,
//!     level: Some("throwback=debug".to_string()),
//!     verbose: false,
//! }
//! .init();
//! ```

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::EnvFilter;

pub const FORMAT_ENV: &str = "THROWBACK_LOG_FORMAT";
pub const LEVEL_ENV: &str = "THROWBACK_LOG_LEVEL";

const DEFAULT_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain lines without target, suitable for cron mail
    #[default]
    Text,
    /// One JSON object per event
    Json,
    /// Multi-line with file and line numbers
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format '{}' (expected text, json or pretty)", other)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Filter directive such as `warn` or `libthrowback=debug`
    pub level: Option<String>,
    /// `--verbose`; raises the default level to debug
    pub verbose: bool,
}

impl LoggingConfig {
    /// Read format and level from the environment
    ///
    /// An unrecognized format falls back to text rather than failing the run.
    pub fn from_env(verbose: bool) -> Self {
        let format = match std::env::var(FORMAT_ENV) {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                eprintln!("Warning: {}; using text", e);
                LogFormat::Text
            }),
            Err(_) => LogFormat::Text,
        };
        Self {
            format,
            level: std::env::var(LEVEL_ENV).ok().filter(|l| !l.trim().is_empty()),
            verbose,
        }
    }

    fn directive(&self) -> &str {
        match (&self.level, self.verbose) {
            (_, true) => "debug",
            (Some(level), false) => level,
            (None, false) => DEFAULT_LEVEL,
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(self.directive()))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
    }

    /// Install the global subscriber
    ///
    /// A second call is a no-op, which keeps tests that build several
    /// binaries' worth of setup from panicking.
    pub fn init(&self) {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.filter())
            .with_writer(std::io::stderr);

        let installed = match self.format {
            LogFormat::Text => builder.with_target(false).without_time().try_init(),
            LogFormat::Json => builder.json().flatten_event(true).try_init(),
            LogFormat::Pretty => builder.pretty().with_file(true).with_line_number(true).try_init(),
        };
        if installed.is_err() {
            tracing::debug!("Global subscriber already set; keeping it");
        }
    }
}

/// `LoggingConfig::from_env(false).init()`
pub fn init_default() {
    LoggingConfig::from_env(false).init();
}
