//! Error types for the wsmedia transport and protocol layer

use std::time::Duration;
use thiserror::Error;

/// Main error type for stream transport and protocol operations
#[derive(Error, Debug)]
pub enum WsMediaError {
    /// Transport error
    #[error("Transport error: {reason}")]
    Transport {
        /// Reason for transport error
        reason: String,
    },

    /// The stream URL could not be parsed or uses an unsupported scheme
    #[error("Invalid stream URL {url}: {reason}")]
    InvalidUrl {
        /// URL as supplied by the caller
        url: String,
        /// Reason the URL was rejected
        reason: String,
    },

    /// Invalid message format
    #[error("Invalid message format: {message}, error: {source}")]
    InvalidMessage {
        /// Invalid message content
        message: String,
        /// Parsing error
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Invalid state error
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Operation timed out error
    #[error("Operation timed out: {operation} after {duration:?}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Duration after which timeout occurred
        duration: Duration,
    },

    /// Server start failed
    #[error("Failed to start server on {address}: {source}")]
    ServerStartFailed {
        /// Address that failed to bind
        address: std::net::SocketAddr,
        /// Underlying error
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The pipeline task is gone
    #[error("Pipeline closed")]
    PipelineClosed,
}

impl WsMediaError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> String {
        match self {
            WsMediaError::Transport { .. } => "TRANSPORT_ERROR".to_string(),
            WsMediaError::InvalidUrl { .. } => "INVALID_URL".to_string(),
            WsMediaError::InvalidMessage { .. } => "INVALID_MESSAGE".to_string(),
            WsMediaError::InvalidState { .. } => "INVALID_STATE".to_string(),
            WsMediaError::Timeout { .. } => "TIMEOUT".to_string(),
            WsMediaError::ServerStartFailed { .. } => "SERVER_START_FAILED".to_string(),
            WsMediaError::PipelineClosed => "PIPELINE_CLOSED".to_string(),
        }
    }

    /// Whether retrying the same operation later can succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WsMediaError::Transport { .. } | WsMediaError::Timeout { .. }
        )
    }
}

/// Result alias used across the transport layer
pub type WsMediaResult<T> = Result<T, WsMediaError>;
