//! Media pipeline error types
//!
//! Errors raised while classifying, decoding, scheduling or rendering media
//! units. Per-frame errors never stop a stream: callers log them and carry on
//! with the next unit.

use thiserror::Error;

/// Main error type for media processing operations
#[derive(Error, Debug)]
pub enum MediaError {
    /// No decoder on this platform accepts the configuration
    #[error("Codec not supported: {codec}")]
    CodecUnsupported {
        /// Codec string
        codec: String,
    },

    /// A frame arrived before the decoder was configured
    #[error("Decoder not configured for {codec}")]
    DecoderNotConfigured {
        /// Codec string of the rejected frame
        codec: String,
    },

    /// The codec string matches no known family
    #[error("Unknown format: {media} codec {codec}")]
    UnknownFormat {
        /// Media kind
        media: String,
        /// Codec string
        codec: String,
    },

    /// Decoding operation failed
    #[error("Decoding failed: {codec} - {reason}")]
    DecodingFailed {
        /// Codec name
        codec: String,
        /// Failure reason
        reason: String,
    },

    /// Codec initialization failed
    #[error("Codec initialization failed: {codec} - {reason}")]
    CodecInitializationFailed {
        /// Codec name
        codec: String,
        /// Failure reason
        reason: String,
    },

    /// Drawing to the display surface failed
    #[error("Render failed: {reason}")]
    RenderFailed {
        /// Failure reason
        reason: String,
    },

    /// Hardware acceleration not available
    #[error("Hardware acceleration not available: {reason}")]
    HardwareAccelerationNotAvailable {
        /// Reason for unavailability
        reason: String,
    },

    /// Invalid frame data error
    #[error("Invalid frame data: expected {expected} bytes, got {actual}")]
    InvalidFrameData {
        /// Expected data size
        expected: usize,
        /// Actual data size
        actual: usize,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// The component was closed
    #[error("Media component closed")]
    Closed,
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Check if error is recoverable
    ///
    /// Recoverable errors clear up on a later unit of the same stream: a
    /// keyframe with a supported codec, or a well-formed payload.
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::CodecUnsupported { .. } => true,
            MediaError::DecoderNotConfigured { .. } => true,
            MediaError::InvalidFrameData { .. } => true,
            MediaError::HardwareAccelerationNotAvailable { .. } => true,
            MediaError::DecodingFailed { .. } => false,
            MediaError::CodecInitializationFailed { .. } => false,
            _ => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::CodecUnsupported { .. } => ErrorCategory::Codec,
            MediaError::DecoderNotConfigured { .. } => ErrorCategory::State,
            MediaError::UnknownFormat { .. } => ErrorCategory::Format,
            MediaError::DecodingFailed { .. } => ErrorCategory::Codec,
            MediaError::CodecInitializationFailed { .. } => ErrorCategory::Codec,
            MediaError::RenderFailed { .. } => ErrorCategory::Video,
            MediaError::HardwareAccelerationNotAvailable { .. } => ErrorCategory::Platform,
            MediaError::InvalidFrameData { .. } => ErrorCategory::Data,
            MediaError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
            MediaError::Closed => ErrorCategory::State,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Configuration and parameter errors
    Configuration,
    /// Codec-related errors
    Codec,
    /// Format and data structure errors
    Format,
    /// Platform compatibility errors
    Platform,
    /// Data validation errors
    Data,
    /// State management errors
    State,
    /// Audio-specific errors
    Audio,
    /// Video-specific errors
    Video,
}
