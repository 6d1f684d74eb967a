//! Pipeline events

use serde::Serialize;
use std::time::Duration;
use wsmedia_core::ConnectionState;

/// Notifications published by a running [`crate::MediaStream`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A frame became visible, or the surface went blank or showed a diagnostic
    ReadyStateChanged {
        /// Whether a decoded frame is on screen
        loaded: bool,
    },
    /// The transport changed state
    ConnectionStateChanged {
        /// New state
        state: ConnectionState,
    },
    /// The connection dropped and a reconnect is pending
    ReconnectScheduled {
        /// Delay until the attempt
        delay: Duration,
    },
    /// A decoded frame was discarded by backpressure
    FrameDropped {
        /// Decoder depth at the time of the drop
        pending: usize,
    },
}

impl PipelineEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::ReadyStateChanged { .. } => "ready_state_changed",
            PipelineEvent::ConnectionStateChanged { .. } => "connection_state_changed",
            PipelineEvent::ReconnectScheduled { .. } => "reconnect_scheduled",
            PipelineEvent::FrameDropped { .. } => "frame_dropped",
        }
    }

    /// Check if this is a connection-related event
    pub fn is_connection_event(&self) -> bool {
        matches!(
            self,
            PipelineEvent::ConnectionStateChanged { .. } | PipelineEvent::ReconnectScheduled { .. }
        )
    }
}
