//! Errors surfaced by the stream handle

use thiserror::Error;
use wsmedia_core::WsMediaError;
use wsmedia_media::MediaError;

/// Errors returned by [`crate::MediaStream`] and its builder
#[derive(Error, Debug)]
pub enum StreamError {
    /// Transport or protocol failure
    #[error(transparent)]
    Transport(#[from] WsMediaError),

    /// Decoder or renderer failure
    #[error(transparent)]
    Media(#[from] MediaError),

    /// A required builder field was not set
    #[error("Missing required configuration: {field}")]
    MissingConfiguration {
        /// Name of the missing field
        field: String,
    },
}

impl StreamError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> String {
        match self {
            StreamError::Transport(e) => e.error_code(),
            StreamError::Media(_) => "MEDIA_ERROR".to_string(),
            StreamError::MissingConfiguration { .. } => "MISSING_CONFIGURATION".to_string(),
        }
    }
}

/// Result alias for stream operations
pub type StreamResult<T> = Result<T, StreamError>;
