//! # wsmedia diagnostics
//!
//! Logging initialisation and serialisable stream reports for wsmedia.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod debug_logger;
pub mod stream_report;

use thiserror::Error;

// Re-export main types
pub use debug_logger::{DebugLogger, LoggingConfig};
pub use stream_report::StreamReport;

/// Diagnostics errors
#[derive(Error, Debug)]
pub enum DiagnosticsError {
    /// A log filter directive could not be parsed
    #[error("Invalid log directive '{directive}': {reason}")]
    InvalidDirective {
        /// The directive as given
        directive: String,
        /// Parser message
        reason: String,
    },

    /// A report could not be serialised
    #[error("Report serialization failed: {source}")]
    Serialization {
        /// Underlying serde error
        #[from]
        source: serde_json::Error,
    },
}
