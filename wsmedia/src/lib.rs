//! # wsmedia - Live Media Playback over WebSocket
//!
//! wsmedia connects to a WebSocket that interleaves JSON metadata text
//! messages with binary media units, decodes H.264, H.265, JPEG and audio
//! units as they arrive, and presents them: video on a display surface,
//! audio scheduled back to back on an output graph.
//!
//! ## Key Features
//!
//! - **Self-healing transport**: unexpected closes reconnect after a fixed delay
//! - **Keyframe-gated decoding**: decoders are configured on the first keyframe
//!   and reconfigured when the codec changes
//! - **Backpressure**: decoded frames are dropped while the decoder is behind
//! - **Gapless audio**: each buffer starts exactly where the previous one ends
//! - **Diagnostics on screen**: unknown or unsupported codecs are shown as text
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wsmedia::{FramebufferSurface, MediaStream, MixerConfig, MixerGraph, PipelineConfig};
//! # use wsmedia::{DecodedVideoFrame, DecoderProvider};
//!
//! # async fn example(
//! #     provider: Arc<dyn DecoderProvider<Output = DecodedVideoFrame>>,
//! # ) -> Result<(), wsmedia::StreamError> {
//! let surface = FramebufferSurface::new(1280, 720);
//! let stream = MediaStream::builder()
//!     .config(PipelineConfig::default())
//!     .surface(surface.clone())
//!     .video_decoder(provider)
//!     .output_graph(MixerGraph::new(MixerConfig::default()))
//!     .build()?;
//!
//! let mut events = stream.subscribe();
//! stream.connect("http://camera.local:8080/stream").await?;
//! while let Ok(event) = events.recv().await {
//!     println!("Stream event: {}", event.event_type());
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use wsmedia_core::{
    normalize_url, ConnectionManager, ConnectionState, Connector, FrameType, InboundMessage,
    MediaKind, TrackMetadata, Transport, TransportConfig, WsMediaError, WsMediaResult,
};

pub use wsmedia_media::{
    AudioConfig, AudioProcessor, AudioStats, DecodedAudioFrame, DecodedVideoFrame, DecoderBackend,
    DecoderConfig, DecoderProvider, DisplaySurface, EncodedChunk, FrameDisposition,
    FramebufferSurface, GpuPresenter, MediaError, MixerConfig, MixerGraph, OutputGraph,
    PcmDecoderProvider, RenderBackend, Renderer, StillImageDecoder, SurfaceContext, VideoConfig,
    VideoProcessor, VideoStats, PCM_S16_CODEC,
};

/// Software decoder providers
pub use wsmedia_media::decoders;

#[cfg(feature = "cpal-output")]
pub use wsmedia_media::CpalOutput;

#[cfg(feature = "relay")]
pub use wsmedia_relay::{
    split_annex_b, AccessUnit, H264Packetizer, H265Packetizer, Packetizer, RelayConfig,
    RelayServer,
};

#[cfg(feature = "diagnostics")]
pub use wsmedia_diagnostics::{DebugLogger, LoggingConfig, StreamReport};

// Public API modules
pub mod config;
pub mod error;
pub mod event;
pub mod router;
pub mod stream;

// Re-export main API types
pub use config::PipelineConfig;
pub use error::{StreamError, StreamResult};
pub use event::PipelineEvent;
pub use router::{DecodedOutput, RouteOutcome, TrackRouter};
pub use stream::{MediaStream, MediaStreamBuilder, StreamStats};
