//! Opus decoding through libopus

use crate::codecs::{DecoderBackend, DecoderConfig, DecoderProvider};
use crate::error::{MediaError, MediaResult};
use crate::frames::{DecodedAudioFrame, EncodedChunk, SampleLayout};
use async_trait::async_trait;
use audiopus::{coder::Decoder as OpusDecoder, Channels, SampleRate};
use tokio::sync::mpsc;
use tracing::debug;

/// Largest Opus frame: 120 ms at 48 kHz
const MAX_FRAME_SAMPLES: usize = 5760;

fn opus_sample_rate(sample_rate: u32) -> Option<SampleRate> {
    match sample_rate {
        8000 => Some(SampleRate::Hz8000),
        12000 => Some(SampleRate::Hz12000),
        16000 => Some(SampleRate::Hz16000),
        24000 => Some(SampleRate::Hz24000),
        48000 => Some(SampleRate::Hz48000),
        _ => None,
    }
}

/// Provider for `opus` audio
#[derive(Debug, Clone, Default)]
pub struct OpusDecoderProvider;

impl OpusDecoderProvider {
    /// Create the provider
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DecoderProvider for OpusDecoderProvider {
    type Output = DecodedAudioFrame;

    async fn is_config_supported(&self, config: &DecoderConfig) -> bool {
        match config {
            DecoderConfig::Audio {
                codec,
                sample_rate,
                channels,
            } => {
                codec == "opus"
                    && opus_sample_rate(*sample_rate).is_some()
                    && matches!(channels, 1 | 2)
            }
            DecoderConfig::Video { .. } => false,
        }
    }

    fn create_decoder(
        &self,
        output: mpsc::UnboundedSender<DecodedAudioFrame>,
    ) -> MediaResult<Box<dyn DecoderBackend>> {
        Ok(Box::new(OpusBackend {
            output,
            state: None,
        }))
    }
}

struct OpusState {
    decoder: OpusDecoder,
    sample_rate: u32,
    channels: u16,
}

struct OpusBackend {
    output: mpsc::UnboundedSender<DecodedAudioFrame>,
    state: Option<OpusState>,
}

impl DecoderBackend for OpusBackend {
    fn configure(&mut self, config: &DecoderConfig) -> MediaResult<()> {
        match config {
            DecoderConfig::Audio {
                sample_rate,
                channels,
                ..
            } if matches!(channels, 1 | 2) => {
                let rate = opus_sample_rate(*sample_rate).ok_or_else(|| {
                    MediaError::InvalidConfiguration {
                        message: format!("unsupported Opus sample rate {}", sample_rate),
                    }
                })?;
                let layout = if *channels == 1 {
                    Channels::Mono
                } else {
                    Channels::Stereo
                };
                let decoder = OpusDecoder::new(rate, layout).map_err(|e| {
                    MediaError::CodecInitializationFailed {
                        codec: "opus".to_string(),
                        reason: format!("{:?}", e),
                    }
                })?;
                self.state = Some(OpusState {
                    decoder,
                    sample_rate: *sample_rate,
                    channels: *channels as u16,
                });
                Ok(())
            }
            other => Err(MediaError::InvalidConfiguration {
                message: format!("unsupported Opus configuration: {:?}", other),
            }),
        }
    }

    fn decode(&mut self, chunk: EncodedChunk) -> MediaResult<()> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| MediaError::DecoderNotConfigured {
                codec: "opus".to_string(),
            })?;
        let (sample_rate, channels) = (state.sample_rate, state.channels);

        let mut pcm = vec![0i16; MAX_FRAME_SAMPLES * channels as usize];
        let decoded = state
            .decoder
            .decode(Some(&chunk.data[..]), &mut pcm[..], false)
            .map_err(|e| MediaError::DecodingFailed {
                codec: "opus".to_string(),
                reason: format!("{:?}", e),
            })?;

        let samples: Vec<f32> = pcm[..decoded * channels as usize]
            .iter()
            .map(|&s| s as f32 / 32768.0)
            .collect();

        let frame = DecodedAudioFrame {
            sample_rate,
            channels,
            frames: decoded,
            timestamp: chunk.timestamp,
            layout: SampleLayout::Interleaved,
            samples,
        };
        if self.output.send(frame).is_err() {
            debug!("Opus output receiver dropped");
        }
        Ok(())
    }

    fn decode_queue_size(&self) -> usize {
        0
    }

    fn close(&mut self) {
        self.state = None;
    }
}
