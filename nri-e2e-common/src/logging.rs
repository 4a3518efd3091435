//! Tracing subscriber setup shared by the runner binary.

use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Environment variable overriding the log filter.
pub const LOG_ENV: &str = "NRI_E2E_LOG";
/// Environment variable selecting the log format (`text` or `json`).
pub const LOG_FORMAT_ENV: &str = "NRI_E2E_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },

    #[error("failed to install global subscriber: {0}")]
    Install(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive passed to `EnvFilter`.
    pub filter: String,
    pub format: LogFormat,
    /// Whether the filter came from the environment and should not be overridden.
    pub from_env: bool,
    pub ansi: bool,
}

impl LogConfig {
    /// Build a config from `NRI_E2E_LOG` / `NRI_E2E_LOG_FORMAT`, falling back to `default_level`.
    pub fn from_env(default_level: &str) -> Self {
        let env_filter = std::env::var(LOG_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty());
        let format = std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or_default();

        Self {
            from_env: env_filter.is_some(),
            filter: env_filter.unwrap_or_else(|| default_level.to_string()),
            format,
            ansi: true,
        }
    }

    /// Set the level unless the environment already chose a filter.
    pub fn with_level(mut self, level: &str) -> Self {
        if !self.from_env {
            self.filter = level.to_string();
        }
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn without_ansi(mut self) -> Self {
        self.ansi = false;
        self
    }

    fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        EnvFilter::try_new(&self.filter).map_err(|err| LoggingError::InvalidFilter {
            filter: self.filter.clone(),
            message: err.to_string(),
        })
    }
}

/// Install the global tracing subscriber. Logs go to stderr.
pub fn init_logging(config: &LogConfig) -> Result<(), LoggingError> {
    let filter = config.env_filter()?;

    let result = match config.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_ansi(config.ansi),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false),
            )
            .try_init(),
    };

    result.map_err(|err| LoggingError::Install(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(filter: &str, from_env: bool) -> LogConfig {
        LogConfig {
            filter: filter.to_string(),
            format: LogFormat::Text,
            from_env,
            ansi: false,
        }
    }

    #[test]
    fn test_with_level_overrides_default() {
        let config = config("info", false).with_level("debug");
        assert_eq!(config.filter, "debug");
    }

    #[test]
    fn test_with_level_keeps_env_filter() {
        let config = config("nri_e2e=trace", true).with_level("debug");
        assert_eq!(config.filter, "nri_e2e=trace");
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_invalid_filter_is_rejected() {
        let err = config("nri_e2e=loud", false).env_filter().unwrap_err();
        assert!(matches!(err, LoggingError::InvalidFilter { .. }));
    }

    #[test]
    fn test_with_format() {
        let config = config("info", false).with_format(LogFormat::Json);
        assert_eq!(config.format, LogFormat::Json);
    }
}
