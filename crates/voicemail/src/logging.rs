//! Tracing subscriber setup for voicemail hosts
//!
//! Session tasks log inside a `voicemail_session` span carrying the session
//! and channel ids. Hosts that want those spans opened and closed in the
//! output enable [`LoggingConfig::with_session_spans`].

use serde::Deserialize;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::ConfigError;

/// Environment variable overriding the log level
pub const LOG_LEVEL_ENV: &str = "RVOIP_VOICEMAIL_LOG";

/// Environment variable selecting the output format (`pretty`, `compact`, `json`)
pub const LOG_FORMAT_ENV: &str = "RVOIP_VOICEMAIL_LOG_FORMAT";

/// Output format of the fmt subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::InvalidLogFormat(other.to_string())),
        }
    }
}

/// How a host process wants voicemail logs rendered
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    pub format: LogFormat,
    /// Include file and line of each event
    pub file_info: bool,
    /// Emit an event when a session span opens and closes
    pub session_spans: bool,
    /// Name logged in the startup line
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::default(),
            file_info: false,
            session_spans: false,
            app_name: "rvoip-voicemail".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        Self {
            level,
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    /// Defaults overridden by [`LOG_LEVEL_ENV`] and [`LOG_FORMAT_ENV`]
    pub fn from_env(app_name: impl Into<String>) -> Result<Self, ConfigError> {
        let mut config = Self::new(Level::INFO, app_name);
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            config.level = parse_log_level(&level)?;
        }
        if let Ok(format) = std::env::var(LOG_FORMAT_ENV) {
            config.format = format.parse()?;
        }
        Ok(config)
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    pub fn with_session_spans(mut self) -> Self {
        self.session_spans = true;
        self
    }

    /// Filter applying `level` on top of any `RUST_LOG` directives
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::from_default_env().add_directive(LevelFilter::from_level(self.level).into())
    }
}

/// Install the global subscriber described by `config`
///
/// Fails if a global subscriber is already installed.
pub fn setup_logging(config: &LoggingConfig) -> Result<(), ConfigError> {
    let span_events = if config.session_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(config.filter())
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };
    installed.map_err(|e| ConfigError::Subscriber(e.to_string()))?;

    tracing::info!(format = ?config.format, "Starting {} v{}", config.app_name, env!("CARGO_PKG_VERSION"));
    Ok(())
}

/// Parse a log level such as `debug` or `WARN`
pub fn parse_log_level(level: &str) -> Result<Level, ConfigError> {
    Level::from_str(level.trim()).map_err(|_| ConfigError::InvalidLogLevel(level.to_string()))
}
