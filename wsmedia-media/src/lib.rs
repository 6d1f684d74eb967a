//! # wsmedia media
//!
//! Decoding, pacing and presentation for live video and audio tracks.
//! Encoded units enter through [`VideoProcessor`] and [`AudioProcessor`];
//! video leaves through a [`Renderer`] after a backpressure check, audio
//! leaves through an [`OutputGraph`] scheduled for gapless playback.

#![warn(clippy::all)]

pub mod audio;
pub mod backpressure;
pub mod codecs;
pub mod decoder;
pub mod decoders;
pub mod error;
pub mod frames;
pub mod mixer;
pub mod playback;
pub mod render;
pub mod video;

// Re-export main types
pub use audio::{AudioConfig, AudioEvent, AudioProcessor};
pub use backpressure::{BackpressurePolicy, FrameDisposition, DEFAULT_MAX_PENDING_FRAMES};
pub use codecs::{
    is_known_audio_codec, CodecSupportCache, DecoderBackend, DecoderConfig, DecoderProvider,
    StillImageDecoder, VideoCodecFamily,
};
pub use decoder::{ConfigureGate, DecoderState, FrameDecoder};
pub use decoders::{PcmDecoderProvider, PCM_S16_CODEC};
pub use error::{ErrorCategory, MediaError, MediaResult};
pub use frames::{
    AudioBuffer, ChunkType, DecodedAudioFrame, DecodedVideoFrame, EncodedChunk, SampleLayout,
};
#[cfg(feature = "cpal-output")]
pub use mixer::CpalOutput;
pub use mixer::{MixerConfig, MixerGraph};
pub use playback::{
    deinterleave, plan_start, AudioPlaybackScheduler, AudioScheduleState, AudioStats, BufferId,
    CompletionSender, OutputGraph, ScheduledBuffer, StartAt,
};
pub use render::{
    AcceleratedRenderer, DisplaySurface, FallbackRenderer, FramebufferContext, FramebufferSurface,
    GpuPresenter, RenderBackend, Renderer, SurfaceContext, DEFAULT_FONT_PX,
};
pub use video::{VideoConfig, VideoProcessor, VideoStats};
