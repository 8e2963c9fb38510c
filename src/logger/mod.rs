//! Logger Module
//!
//! Console logging based on `tracing-subscriber`, in full, compact or JSON
//! format, filtered through an `EnvFilter` directive.

pub mod config;
pub mod error;

// Re-export main types
pub use config::*;
pub use error::LoggerError;

use std::io::IsTerminal;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber described by `config`.
///
/// Fails if the configuration is invalid or a global subscriber is already
/// installed.
pub fn init_logger(config: &LoggerConfig) -> Result<(), LoggerError> {
    config
        .validate()
        .map_err(|e| LoggerError::config(format!("{:#}", e)))?;

    let filter =
        EnvFilter::try_new(&config.level).map_err(|e| LoggerError::config(e.to_string()))?;
    let use_ansi = config.colored && std::io::stdout().is_terminal();

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Full => registry
            .with(fmt::layer().with_ansi(use_ansi).with_target(true))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().with_ansi(use_ansi).with_target(true).compact())
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().with_ansi(false).json())
            .try_init(),
    };

    result.map_err(|e| LoggerError::install(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_rejected_before_install() {
        let config = LoggerConfig {
            level: "verbose".to_string(),
            ..LoggerConfig::default()
        };
        assert!(matches!(
            init_logger(&config),
            Err(LoggerError::Config { .. })
        ));
    }

    #[test]
    fn test_second_install_fails() {
        let config = LoggerConfig {
            format: LogFormat::Compact,
            colored: false,
            ..LoggerConfig::default()
        };
        // another test may have installed a subscriber already
        let _ = init_logger(&config);
        assert!(matches!(
            init_logger(&config),
            Err(LoggerError::Install { .. })
        ));
    }
}
