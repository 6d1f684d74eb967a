//! Point-in-time stream reports

use crate::DiagnosticsError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wsmedia_core::ConnectionState;
use wsmedia_media::{AudioStats, RenderBackend, VideoStats};

/// Snapshot of one stream's connection and pipeline counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamReport {
    /// When the snapshot was taken
    pub generated_at: DateTime<Utc>,
    /// Source URL, once connected
    pub url: Option<String>,
    /// Connection state
    pub connection: ConnectionState,
    /// Reconnects performed so far
    pub reconnect_attempts: u64,
    /// Whether a frame is on screen
    pub ready: bool,
    /// Renderer variant in use
    pub render_backend: Option<RenderBackend>,
    /// Video counters
    pub video: VideoStats,
    /// Audio counters, absent for video-only pipelines
    pub audio: Option<AudioStats>,
}

impl StreamReport {
    /// Report stamped with the current time
    pub fn new(connection: ConnectionState, video: VideoStats, audio: Option<AudioStats>) -> Self {
        Self {
            generated_at: Utc::now(),
            url: None,
            connection,
            reconnect_attempts: 0,
            ready: false,
            render_backend: None,
            video,
            audio,
        }
    }

    /// Attach the source URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Attach the reconnect counter
    pub fn with_reconnect_attempts(mut self, attempts: u64) -> Self {
        self.reconnect_attempts = attempts;
        self
    }

    /// Attach presentation state
    pub fn with_presentation(mut self, ready: bool, backend: RenderBackend) -> Self {
        self.ready = ready;
        self.render_backend = Some(backend);
        self
    }

    /// Share of decoded frames dropped by backpressure
    pub fn video_drop_ratio(&self) -> f64 {
        if self.video.frames_decoded == 0 {
            return 0.0;
        }
        self.video.frames_dropped as f64 / self.video.frames_decoded as f64
    }

    /// Compact JSON
    pub fn to_json(&self) -> Result<String, DiagnosticsError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Indented JSON
    pub fn to_json_pretty(&self) -> Result<String, DiagnosticsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Emit the report as a single `info` event
    pub fn log(&self) {
        match self.to_json() {
            Ok(json) => tracing::info!(report = %json, "Stream report"),
            Err(e) => tracing::warn!("Failed to serialize stream report: {}", e),
        }
    }
}
