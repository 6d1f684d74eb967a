//! Codec classification, decoder configuration and decoder interfaces
//!
//! Decoding is split in two seams. A [`DecoderProvider`] answers capability
//! probes and creates decoder instances; a [`DecoderBackend`] is one such
//! instance, fed encoded chunks and delivering output through the channel it
//! was created with. The frame decoder state machine sits on top of both.

use crate::error::{MediaError, MediaResult};
use crate::frames::{DecodedVideoFrame, EncodedChunk};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;
use wsmedia_core::{MediaKind, TrackMetadata};

/// Video codec families recognised by the video pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodecFamily {
    /// H.264 (`avc1.*`)
    Avc,
    /// H.265 (`hev1.*`)
    Hevc,
    /// Motion JPEG, one still image per unit
    Jpeg,
}

impl VideoCodecFamily {
    /// Classify a codec string; `None` means the codec is unknown
    pub fn classify(codec: &str) -> Option<Self> {
        if codec.starts_with("avc1") {
            Some(VideoCodecFamily::Avc)
        } else if codec.starts_with("hev1") {
            Some(VideoCodecFamily::Hevc)
        } else if codec.eq_ignore_ascii_case("jpeg") {
            Some(VideoCodecFamily::Jpeg)
        } else {
            None
        }
    }

    /// Whether units of this family go through a stateful decoder
    pub fn uses_decoder(&self) -> bool {
        !matches!(self, VideoCodecFamily::Jpeg)
    }
}

/// Whether an audio codec string belongs to a known family
pub fn is_known_audio_codec(codec: &str) -> bool {
    matches!(codec, "opus" | "mp3" | "flac" | "vorbis" | "alaw" | "ulaw")
        || codec.starts_with("mp4a.")
        || codec.starts_with("pcm-")
}

/// Configuration descriptor passed to capability probes and `configure`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DecoderConfig {
    /// Video decoder configuration
    Video {
        /// Codec string
        codec: String,
    },
    /// Audio decoder configuration
    Audio {
        /// Codec string
        codec: String,
        /// Sample rate in Hz
        sample_rate: u32,
        /// Number of channels
        channels: u32,
    },
}

impl DecoderConfig {
    /// Build a configuration from track metadata
    ///
    /// Audio configurations need both `freq` and `channels`; metadata lacking
    /// either cannot describe a decodable stream and is reported as unsupported.
    pub fn from_metadata(metadata: &TrackMetadata) -> MediaResult<Self> {
        match metadata.media {
            MediaKind::Video => Ok(DecoderConfig::Video {
                codec: metadata.codec.clone(),
            }),
            MediaKind::Audio => match (metadata.sample_rate, metadata.channels) {
                (Some(sample_rate), Some(channels)) if sample_rate > 0 && channels > 0 => {
                    Ok(DecoderConfig::Audio {
                        codec: metadata.codec.clone(),
                        sample_rate,
                        channels,
                    })
                }
                _ => Err(MediaError::CodecUnsupported {
                    codec: metadata.codec.clone(),
                }),
            },
            MediaKind::Unknown => Err(MediaError::UnknownFormat {
                media: metadata.media.to_string(),
                codec: metadata.codec.clone(),
            }),
        }
    }

    /// Codec string
    pub fn codec(&self) -> &str {
        match self {
            DecoderConfig::Video { codec } | DecoderConfig::Audio { codec, .. } => codec,
        }
    }
}

/// One decoder instance
///
/// Output is delivered asynchronously through the sender handed to
/// [`DecoderProvider::create_decoder`].
pub trait DecoderBackend: Send {
    /// Configure the instance; may be called again to reconfigure
    fn configure(&mut self, config: &DecoderConfig) -> MediaResult<()>;

    /// Submit one encoded chunk
    fn decode(&mut self, chunk: EncodedChunk) -> MediaResult<()>;

    /// Number of submitted chunks not yet output
    fn decode_queue_size(&self) -> usize;

    /// Release the instance; no output is delivered afterwards
    fn close(&mut self);
}

/// Creates decoder instances and answers capability probes
#[async_trait]
pub trait DecoderProvider: Send + Sync {
    /// Decoded output type
    type Output: Send + 'static;

    /// Whether a decoder can be configured with `config`
    async fn is_config_supported(&self, config: &DecoderConfig) -> bool;

    /// Create an unconfigured decoder instance
    fn create_decoder(
        &self,
        output: mpsc::UnboundedSender<Self::Output>,
    ) -> MediaResult<Box<dyn DecoderBackend>>;
}

/// Decodes a single self-contained image
#[async_trait]
pub trait StillImageDecoder: Send + Sync {
    /// Decode `data` into a frame stamped with `timestamp`
    async fn decode_image(&self, data: Bytes, timestamp: u64) -> MediaResult<DecodedVideoFrame>;
}

/// Memoized capability probe results for one session
#[derive(Debug, Default)]
pub struct CodecSupportCache {
    entries: HashMap<DecoderConfig, bool>,
}

impl CodecSupportCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe `config` through `provider` unless the answer is already known
    pub async fn probe<O>(
        &mut self,
        provider: &dyn DecoderProvider<Output = O>,
        config: &DecoderConfig,
    ) -> bool
    where
        O: Send + 'static,
    {
        if let Some(supported) = self.entries.get(config) {
            return *supported;
        }
        let supported = provider.is_config_supported(config).await;
        debug!(codec = config.codec(), supported, "Probed decoder configuration");
        self.entries.insert(config.clone(), supported);
        supported
    }

    /// Cached answer for `config`
    pub fn get(&self, config: &DecoderConfig) -> Option<bool> {
        self.entries.get(config).copied()
    }

    /// Number of cached answers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget all answers
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
