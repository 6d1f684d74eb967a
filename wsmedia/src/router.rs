//! Inbound message routing
//!
//! The router holds the most recent [`TrackMetadata`] and nothing else. Text
//! messages replace it; binary messages are handed, together with it, to the
//! processor for its media kind. Per-unit failures are logged here and never
//! propagate, so one bad unit cannot stop the stream.

use bytes::Bytes;
use tracing::{debug, trace, warn};
use wsmedia_core::{InboundMessage, MediaKind, TrackMetadata};
use wsmedia_media::{
    AudioEvent, AudioProcessor, DecodedVideoFrame, FrameDisposition, MediaError, VideoProcessor,
};

/// What the router did with one message
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// A text message replaced the current metadata
    MetadataUpdated,
    /// A text message could not be parsed; the previous metadata is kept
    InvalidMetadata,
    /// A binary unit arrived before any metadata
    NoMetadata,
    /// A binary unit was accepted by its processor
    Submitted(MediaKind),
    /// A binary unit was refused; the stream continues
    Rejected {
        /// Media kind from the current metadata
        media: MediaKind,
        /// Error message
        reason: String,
    },
}

/// Something a processor produced that the pipeline must act on
#[derive(Debug)]
pub enum DecodedOutput {
    /// A decoded video frame awaiting the backpressure check
    Video(DecodedVideoFrame),
    /// An audio decode or playback event
    Audio(AudioEvent),
}

/// Dispatches messages to the video and audio processors
pub struct TrackRouter {
    metadata: Option<TrackMetadata>,
    video: VideoProcessor,
    audio: Option<AudioProcessor>,
}

impl TrackRouter {
    /// Router over a video processor and an optional audio processor
    pub fn new(video: VideoProcessor, audio: Option<AudioProcessor>) -> Self {
        Self {
            metadata: None,
            video,
            audio,
        }
    }

    /// Route one inbound message
    pub async fn on_message(&mut self, message: InboundMessage) -> RouteOutcome {
        match message {
            InboundMessage::Text(text) => self.on_text(&text),
            InboundMessage::Binary(payload) => self.on_binary(payload).await,
        }
    }

    fn on_text(&mut self, text: &str) -> RouteOutcome {
        match TrackMetadata::parse(text) {
            Ok(metadata) => {
                trace!(
                    media = %metadata.media,
                    codec = %metadata.codec,
                    ts = metadata.ts,
                    "Metadata"
                );
                self.metadata = Some(metadata);
                RouteOutcome::MetadataUpdated
            }
            Err(e) => {
                warn!("Ignoring malformed metadata: {}", e);
                RouteOutcome::InvalidMetadata
            }
        }
    }

    async fn on_binary(&mut self, payload: Bytes) -> RouteOutcome {
        let Some(metadata) = self.metadata.clone() else {
            debug!(len = payload.len(), "Dropping binary unit received before metadata");
            return RouteOutcome::NoMetadata;
        };

        let result = match metadata.media {
            MediaKind::Video => self.video.on_video_frame(&metadata, payload).await,
            MediaKind::Audio => match self.audio.as_mut() {
                Some(audio) => audio.on_audio_frame(&metadata, payload).await,
                None => {
                    trace!("Audio disabled, dropping unit");
                    return RouteOutcome::Rejected {
                        media: MediaKind::Audio,
                        reason: "audio disabled".to_string(),
                    };
                }
            },
            MediaKind::Unknown => self.video.on_unknown_format(&metadata).await,
        };

        match result {
            Ok(()) => RouteOutcome::Submitted(metadata.media),
            Err(e) => {
                match &e {
                    MediaError::DecoderNotConfigured { .. } => {
                        debug!(media = %metadata.media, ts = metadata.ts, "Dropping unit: {}", e)
                    }
                    _ => warn!(media = %metadata.media, ts = metadata.ts, "Dropping unit: {}", e),
                }
                RouteOutcome::Rejected {
                    media: metadata.media,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Wait for the next decoded frame or audio event from either processor
    pub async fn next_output(&mut self) -> DecodedOutput {
        match self.audio.as_mut() {
            Some(audio) => tokio::select! {
                frame = self.video.next_decoded() => DecodedOutput::Video(frame),
                event = audio.next_event() => DecodedOutput::Audio(event),
            },
            None => DecodedOutput::Video(self.video.next_decoded().await),
        }
    }

    /// Act on an output from [`Self::next_output`]; returns the video disposition
    pub async fn handle_output(&mut self, output: DecodedOutput) -> Option<FrameDisposition> {
        match output {
            DecodedOutput::Video(frame) => Some(self.video.on_decoded_frame(frame).await),
            DecodedOutput::Audio(event) => {
                if let Some(audio) = self.audio.as_mut() {
                    audio.handle_event(event);
                }
                None
            }
        }
    }

    /// Current metadata
    pub fn metadata(&self) -> Option<&TrackMetadata> {
        self.metadata.as_ref()
    }

    /// Video processor
    pub fn video(&self) -> &VideoProcessor {
        &self.video
    }

    /// Audio processor, if audio is enabled
    pub fn audio(&self) -> Option<&AudioProcessor> {
        self.audio.as_ref()
    }

    /// Set playback volume; no-op without audio
    pub fn set_volume(&mut self, volume: f32) {
        match self.audio.as_mut() {
            Some(audio) => audio.set_volume(volume),
            None => debug!("Volume change ignored, audio disabled"),
        }
    }

    /// Forget metadata, blank the surface, stop audio and start fresh decoders
    pub async fn reset(&mut self) {
        self.metadata = None;
        if let Err(e) = self.video.reset().await {
            warn!("Failed to reset video decoder: {}", e);
        }
        if let Some(audio) = self.audio.as_mut() {
            if let Err(e) = audio.reset() {
                warn!("Failed to reset audio decoder: {}", e);
            }
        }
    }

    /// Release both decoders and stop audio
    pub async fn close(&mut self) {
        self.metadata = None;
        self.video.close().await;
        if let Some(audio) = self.audio.as_mut() {
            audio.close();
        }
    }
}
