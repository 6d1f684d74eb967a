//! Linear PCM (`pcm-s16`, big-endian L16) decoding

use crate::codecs::{DecoderBackend, DecoderConfig, DecoderProvider};
use crate::error::{MediaError, MediaResult};
use crate::frames::{DecodedAudioFrame, EncodedChunk, SampleLayout};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

/// Codec string handled by [`PcmDecoderProvider`]
pub const PCM_S16_CODEC: &str = "pcm-s16";

/// Provider for signed 16-bit big-endian PCM, always available
#[derive(Debug, Clone, Default)]
pub struct PcmDecoderProvider;

impl PcmDecoderProvider {
    /// Create the provider
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DecoderProvider for PcmDecoderProvider {
    type Output = DecodedAudioFrame;

    async fn is_config_supported(&self, config: &DecoderConfig) -> bool {
        match config {
            DecoderConfig::Audio {
                codec,
                sample_rate,
                channels,
            } => {
                codec == PCM_S16_CODEC
                    && (8000..=192_000).contains(sample_rate)
                    && (1..=8).contains(channels)
            }
            DecoderConfig::Video { .. } => false,
        }
    }

    fn create_decoder(
        &self,
        output: mpsc::UnboundedSender<DecodedAudioFrame>,
    ) -> MediaResult<Box<dyn DecoderBackend>> {
        Ok(Box::new(PcmDecoder {
            output,
            format: None,
        }))
    }
}

struct PcmDecoder {
    output: mpsc::UnboundedSender<DecodedAudioFrame>,
    format: Option<(u32, u16)>,
}

impl DecoderBackend for PcmDecoder {
    fn configure(&mut self, config: &DecoderConfig) -> MediaResult<()> {
        match config {
            DecoderConfig::Audio {
                sample_rate,
                channels,
                ..
            } => {
                let channels = u16::try_from(*channels).map_err(|_| {
                    MediaError::InvalidConfiguration {
                        message: format!("too many channels: {}", channels),
                    }
                })?;
                self.format = Some((*sample_rate, channels));
                Ok(())
            }
            DecoderConfig::Video { codec } => Err(MediaError::InvalidConfiguration {
                message: format!("PCM decoder cannot decode video codec {}", codec),
            }),
        }
    }

    fn decode(&mut self, chunk: EncodedChunk) -> MediaResult<()> {
        let (sample_rate, channels) = self.format.ok_or_else(|| MediaError::DecoderNotConfigured {
            codec: PCM_S16_CODEC.to_string(),
        })?;

        let frame_bytes = 2 * channels as usize;
        if chunk.data.len() % frame_bytes != 0 {
            let expected = (chunk.data.len() / frame_bytes + 1) * frame_bytes;
            return Err(MediaError::InvalidFrameData {
                expected,
                actual: chunk.data.len(),
            });
        }

        let samples: Vec<f32> = chunk
            .data
            .chunks_exact(2)
            .map(|pair| i16::from_be_bytes([pair[0], pair[1]]) as f32 / 32768.0)
            .collect();

        let frame = DecodedAudioFrame {
            sample_rate,
            channels,
            frames: samples.len() / channels as usize,
            timestamp: chunk.timestamp,
            layout: SampleLayout::Interleaved,
            samples,
        };
        if self.output.send(frame).is_err() {
            debug!("PCM output receiver dropped");
        }
        Ok(())
    }

    fn decode_queue_size(&self) -> usize {
        0
    }

    fn close(&mut self) {
        self.format = None;
    }
}
