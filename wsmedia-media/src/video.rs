//! Video track processing
//!
//! [`VideoProcessor`] classifies each video unit by codec. H.26x units go
//! through the frame decoder and come back out through [`VideoProcessor::next_decoded`],
//! where the backpressure policy decides whether they are rendered. JPEG units
//! are decoded as standalone images and rendered directly. Unknown or
//! unsupported codecs put a diagnostic on the surface instead.

use crate::backpressure::{BackpressurePolicy, FrameDisposition, DEFAULT_MAX_PENDING_FRAMES};
use crate::codecs::{DecoderProvider, StillImageDecoder, VideoCodecFamily};
use crate::decoder::{ConfigureGate, DecoderState, FrameDecoder};
use crate::error::{MediaError, MediaResult};
use crate::frames::DecodedVideoFrame;
use crate::render::{log_render_error, RenderBackend, Renderer, DEFAULT_FONT_PX};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};
use wsmedia_core::TrackMetadata;

/// Video pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoConfig {
    /// Decoder depth above which decoded frames are dropped
    pub max_pending_frames: usize,
    /// Font size for diagnostic text
    pub diagnostic_font_px: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            diagnostic_font_px: DEFAULT_FONT_PX,
        }
    }
}

/// Video statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoStats {
    /// Units received from the router
    pub frames_received: u64,
    /// Frames produced by decoders
    pub frames_decoded: u64,
    /// Frames handed to the renderer
    pub frames_rendered: u64,
    /// Frames dropped by backpressure
    pub frames_dropped: u64,
    /// Units that failed to decode
    pub decode_errors: u64,
}

/// Decodes and presents the video track
pub struct VideoProcessor {
    decoder: FrameDecoder<DecodedVideoFrame>,
    renderer: Renderer,
    image_decoder: Option<Arc<dyn StillImageDecoder>>,
    backpressure: BackpressurePolicy,
    ready: watch::Sender<bool>,
    stats: VideoStats,
}

impl VideoProcessor {
    /// Create a processor drawing to `renderer`
    pub fn new(
        provider: Arc<dyn DecoderProvider<Output = DecodedVideoFrame>>,
        renderer: Renderer,
        config: &VideoConfig,
    ) -> MediaResult<Self> {
        let (ready, _) = watch::channel(false);
        Ok(Self {
            decoder: FrameDecoder::new(provider, ConfigureGate::Keyframe)?,
            renderer,
            image_decoder: None,
            backpressure: BackpressurePolicy::new(config.max_pending_frames),
            ready,
            stats: VideoStats::default(),
        })
    }

    /// Decode `jpeg` units with `decoder`
    pub fn with_image_decoder(mut self, decoder: Arc<dyn StillImageDecoder>) -> Self {
        self.image_decoder = Some(decoder);
        self
    }

    /// Entry point for one video unit
    pub async fn on_video_frame(
        &mut self,
        metadata: &TrackMetadata,
        payload: Bytes,
    ) -> MediaResult<()> {
        self.stats.frames_received += 1;
        match VideoCodecFamily::classify(&metadata.codec) {
            Some(family) if family.uses_decoder() => self.on_h26x_frame(metadata, payload).await,
            Some(_) => self.on_jpeg_frame(metadata, payload).await,
            None => self.on_unknown_format(metadata).await,
        }
    }

    /// Show "Codec <codec> unknown" on the surface for a unit nothing can
    /// handle, whatever its media kind
    pub async fn on_unknown_format(&mut self, metadata: &TrackMetadata) -> MediaResult<()> {
        self.show_diagnostic(&format!("Codec {} unknown", metadata.codec))
            .await;
        Err(MediaError::UnknownFormat {
            media: metadata.media.to_string(),
            codec: metadata.codec.clone(),
        })
    }

    async fn on_h26x_frame(&mut self, metadata: &TrackMetadata, payload: Bytes) -> MediaResult<()> {
        if let Err(e) = self.decoder.configure_if_needed(metadata).await {
            if let MediaError::CodecUnsupported { codec } = &e {
                self.show_diagnostic(&format!("Codec {} not supported", codec))
                    .await;
            }
            return Err(e);
        }

        let result = self.decoder.decode(metadata, payload);
        if matches!(result, Err(MediaError::DecodingFailed { .. })) {
            self.stats.decode_errors += 1;
        }
        result
    }

    async fn on_jpeg_frame(&mut self, metadata: &TrackMetadata, payload: Bytes) -> MediaResult<()> {
        let Some(image_decoder) = self.image_decoder.clone() else {
            self.show_diagnostic(&format!("Codec {} not supported", metadata.codec))
                .await;
            return Err(MediaError::CodecUnsupported {
                codec: metadata.codec.clone(),
            });
        };

        match image_decoder.decode_image(payload, metadata.ts).await {
            Ok(frame) => {
                self.stats.frames_decoded += 1;
                self.display(frame).await;
                Ok(())
            }
            Err(e) => {
                self.stats.decode_errors += 1;
                Err(e)
            }
        }
    }

    /// Wait for the next frame out of the decoder
    pub async fn next_decoded(&mut self) -> DecodedVideoFrame {
        self.decoder.next_output().await
    }

    /// Take an already-decoded frame without waiting
    pub fn try_next_decoded(&mut self) -> Option<DecodedVideoFrame> {
        self.decoder.try_next_output()
    }

    /// Apply backpressure to a decoded frame and render it if admitted
    pub async fn on_decoded_frame(&mut self, frame: DecodedVideoFrame) -> FrameDisposition {
        self.stats.frames_decoded += 1;
        let disposition = self.backpressure.evaluate(self.decoder.decode_queue_size());
        match disposition {
            FrameDisposition::Drop { pending } => {
                warn!(pending, timestamp = frame.timestamp, "Decoder backlog, dropping frame");
                self.stats.frames_dropped += 1;
                drop(frame);
            }
            FrameDisposition::Render => self.display(frame).await,
        }
        disposition
    }

    async fn display(&mut self, frame: DecodedVideoFrame) {
        match self.renderer.draw(frame).await {
            Ok(()) => {
                self.stats.frames_rendered += 1;
                self.set_ready(true);
            }
            Err(e) => warn!("Failed to draw frame: {}", e),
        }
    }

    async fn show_diagnostic(&mut self, text: &str) {
        debug!(text, "Showing diagnostic");
        log_render_error("draw_text", self.renderer.draw_text(text).await);
        self.set_ready(false);
    }

    fn set_ready(&self, loaded: bool) {
        self.ready.send_if_modified(|current| {
            if *current == loaded {
                false
            } else {
                *current = loaded;
                true
            }
        });
    }

    /// Whether a frame has been shown since the last reset or diagnostic
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Watch the ready flag
    pub fn subscribe_ready(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    /// Blank the surface and release the decoder
    pub async fn close(&mut self) {
        log_render_error("clear", self.renderer.clear().await);
        self.decoder.close();
        self.set_ready(false);
    }

    /// Blank the surface and start over with a fresh decoder
    pub async fn reset(&mut self) -> MediaResult<()> {
        log_render_error("clear", self.renderer.clear().await);
        self.set_ready(false);
        self.decoder.reset()
    }

    /// Decoder state
    pub fn decoder_state(&self) -> DecoderState {
        self.decoder.state()
    }

    /// Renderer variant in use
    pub fn render_backend(&self) -> RenderBackend {
        self.renderer.backend()
    }

    /// Statistics
    pub fn stats(&self) -> &VideoStats {
        &self.stats
    }
}
