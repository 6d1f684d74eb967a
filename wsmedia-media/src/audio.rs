//! Audio track processing

use crate::codecs::{is_known_audio_codec, DecoderProvider};
use crate::decoder::{ConfigureGate, DecoderState, FrameDecoder};
use crate::error::{MediaError, MediaResult};
use crate::frames::DecodedAudioFrame;
use crate::playback::{AudioPlaybackScheduler, AudioStats, BufferId, OutputGraph, ScheduledBuffer};
use bytes::Bytes;
use std::sync::Arc;
use tracing::warn;
use wsmedia_core::TrackMetadata;

/// Audio pipeline configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AudioConfig {
    /// Gain applied before the first `set_volume`
    pub initial_volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            initial_volume: 1.0,
        }
    }
}

/// Something the audio processor must react to
#[derive(Debug)]
pub enum AudioEvent {
    /// The decoder produced a frame
    Decoded(DecodedAudioFrame),
    /// The output graph finished a buffer
    Ended(BufferId),
}

/// Decodes the audio track and schedules it for gapless playback
pub struct AudioProcessor {
    decoder: FrameDecoder<DecodedAudioFrame>,
    scheduler: AudioPlaybackScheduler,
}

impl AudioProcessor {
    /// Create a processor playing through `graph`
    pub fn new(
        provider: Arc<dyn DecoderProvider<Output = DecodedAudioFrame>>,
        graph: Box<dyn OutputGraph>,
        config: &AudioConfig,
    ) -> MediaResult<Self> {
        Ok(Self {
            decoder: FrameDecoder::new(provider, ConfigureGate::EveryFrame)?,
            scheduler: AudioPlaybackScheduler::new(graph, config.initial_volume),
        })
    }

    /// Entry point for one audio unit
    pub async fn on_audio_frame(
        &mut self,
        metadata: &TrackMetadata,
        payload: Bytes,
    ) -> MediaResult<()> {
        if !is_known_audio_codec(&metadata.codec) {
            return Err(MediaError::UnknownFormat {
                media: metadata.media.to_string(),
                codec: metadata.codec.clone(),
            });
        }
        self.decoder.submit(metadata, payload).await
    }

    /// Wait for the next decoded frame or buffer completion
    pub async fn next_event(&mut self) -> AudioEvent {
        tokio::select! {
            frame = self.decoder.next_output() => AudioEvent::Decoded(frame),
            id = self.scheduler.next_completion() => AudioEvent::Ended(id),
        }
    }

    /// React to an event from [`Self::next_event`]
    pub fn handle_event(&mut self, event: AudioEvent) {
        match event {
            AudioEvent::Decoded(frame) => {
                if let Err(e) = self.on_decoded_frame(&frame) {
                    warn!("Dropping undecodable audio frame: {}", e);
                }
            }
            AudioEvent::Ended(id) => {
                self.on_buffer_ended(id);
            }
        }
    }

    /// Schedule a decoded frame
    pub fn on_decoded_frame(&mut self, frame: &DecodedAudioFrame) -> MediaResult<ScheduledBuffer> {
        self.scheduler.schedule_frame(frame)
    }

    /// Forget a finished buffer
    pub fn on_buffer_ended(&mut self, id: BufferId) -> bool {
        self.scheduler.on_buffer_ended(id)
    }

    /// Set playback volume
    pub fn set_volume(&mut self, volume: f32) {
        self.scheduler.set_volume(volume);
    }

    /// Current volume
    pub fn volume(&self) -> f32 {
        self.scheduler.volume()
    }

    /// Release the decoder and stop everything still playing
    pub fn close(&mut self) {
        self.decoder.close();
        self.scheduler.close();
    }

    /// Stop playback and start over with a fresh decoder
    pub fn reset(&mut self) -> MediaResult<()> {
        self.scheduler.close();
        self.decoder.reset()
    }

    /// Decoder state
    pub fn decoder_state(&self) -> DecoderState {
        self.decoder.state()
    }

    /// Scheduler, for inspecting queue state
    pub fn scheduler(&self) -> &AudioPlaybackScheduler {
        &self.scheduler
    }

    /// Statistics
    pub fn stats(&self) -> &AudioStats {
        self.scheduler.stats()
    }
}
