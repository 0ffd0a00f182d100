use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::types::{Error, Result};

/// Output format of the global subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event, on stdout
    Json,
}

/// How the process-wide `tracing` subscriber is set up
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Base level; `RUST_LOG` directives are applied on top
    pub level: Level,
    pub format: LogFormat,
    /// Source file and line of each event
    pub file_info: bool,
    /// Span enter/exit events
    pub log_spans: bool,
    /// Name reported in the startup line
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new(Level::INFO, "siphon")
    }
}

impl LoggingConfig {
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        LoggingConfig {
            level,
            format: LogFormat::Text,
            file_info: false,
            log_spans: false,
            app_name: app_name.into(),
        }
    }

    pub fn with_json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::from_default_env().add_directive(self.level.into())
    }
}

/// Install the global subscriber. A second call fails instead of panicking.
pub fn setup_logging(config: LoggingConfig) -> Result<()> {
    let builder = fmt::Subscriber::builder()
        .with_env_filter(config.filter())
        .with_span_events(if config.log_spans { FmtSpan::ACTIVE } else { FmtSpan::NONE })
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = match config.format {
        LogFormat::Json => builder.with_writer(std::io::stdout).json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    installed.map_err(|e| Error::Internal(format!("log subscriber already installed: {}", e)))?;

    tracing::debug!(app = %config.app_name, level = %config.level, format = ?config.format, "Logging ready");
    Ok(())
}

/// Parse a level name such as `debug` or `WARN`
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level).map_err(|_| Error::Config(format!("unknown log level: {}", level)))
}

/// Startup line with the application version
pub fn log_welcome(app_name: &str, version: &str) {
    tracing::info!(version, "{} starting", app_name);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert!(matches!(parse_log_level("loud"), Err(Error::Config(_))));
    }

    #[test]
    fn test_builders() {
        let config = LoggingConfig::new(Level::TRACE, "siphon-test").with_json().with_spans();
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.log_spans);
        assert!(!config.file_info);
        assert_eq!(LoggingConfig::default().level, Level::INFO);
    }
}
