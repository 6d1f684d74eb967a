//! Configuration types and defaults

use std::time::Duration;
use wsmedia_core::TransportConfig;
use wsmedia_media::{AudioConfig, VideoConfig};

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Connection and reconnect timing
    pub transport: TransportConfig,
    /// Video track handling
    pub video: VideoConfig,
    /// Audio track handling; `None` ignores audio units
    pub audio: Option<AudioConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            video: VideoConfig::default(),
            audio: Some(AudioConfig::default()),
        }
    }
}

impl PipelineConfig {
    /// Video only; audio units are dropped by the router
    pub fn video_only() -> Self {
        Self {
            audio: None,
            ..Default::default()
        }
    }

    /// Shallow decoder backlog and fast reconnects
    pub fn low_latency() -> Self {
        Self {
            transport: TransportConfig::low_latency(),
            video: VideoConfig {
                max_pending_frames: 3,
                ..VideoConfig::default()
            },
            audio: Some(AudioConfig::default()),
        }
    }

    /// Override the reconnect delay
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.transport.reconnect_delay = delay;
        self
    }
}
