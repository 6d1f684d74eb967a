//! Structured logging setup

use crate::DiagnosticsError;
use tracing_subscriber::EnvFilter;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset or invalid
    pub default_directive: String,
    /// Include the event target (module path) in each line
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_directive: "info".to_string(),
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// Per-frame tracing for the wsmedia crates, `info` elsewhere
    pub fn verbose() -> Self {
        Self {
            default_directive: "info,wsmedia=debug,wsmedia_core=debug,wsmedia_media=debug"
                .to_string(),
            with_target: true,
        }
    }
}

/// Installs the global `tracing` subscriber
#[derive(Debug, Default)]
pub struct DebugLogger;

impl DebugLogger {
    /// Build the filter for `config`, preferring `RUST_LOG`
    pub fn filter(config: &LoggingConfig) -> Result<EnvFilter, DiagnosticsError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&config.default_directive).map_err(|e| {
            DiagnosticsError::InvalidDirective {
                directive: config.default_directive.clone(),
                reason: e.to_string(),
            }
        })
    }

    /// Install a fmt subscriber; returns `false` if one was already installed
    pub fn init_logging(config: &LoggingConfig) -> Result<bool, DiagnosticsError> {
        let filter = Self::filter(config)?;
        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(config.with_target)
            .try_init()
            .is_ok();
        if installed {
            tracing::debug!(directive = %config.default_directive, "Logging initialized");
        }
        Ok(installed)
    }
}
