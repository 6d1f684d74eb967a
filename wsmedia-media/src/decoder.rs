//! Per-track frame decoder state machine
//!
//! A [`FrameDecoder`] owns exactly one decoder instance at a time and tracks it
//! as `Unconfigured`, `Configured(codec)` or `Closed`. Configuration only
//! happens on an eligible unit (a keyframe for video, any unit for audio),
//! after a capability probe that is memoized per session. Every submitted
//! chunk is tagged as a key chunk so the decoder resynchronizes on its own
//! after loss; the configure gate is the only dependency tracking done here.
//!
//! Each instance gets its own output channel. Closing or resetting the decoder
//! drops that channel, so output still in flight from a torn-down instance is
//! discarded rather than delivered.

use crate::codecs::{CodecSupportCache, DecoderBackend, DecoderConfig, DecoderProvider};
use crate::error::{MediaError, MediaResult};
use crate::frames::{ChunkType, EncodedChunk};
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wsmedia_core::TrackMetadata;

/// Observable decoder state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderState {
    /// Instance exists but has not been configured
    Unconfigured,
    /// Instance configured for a codec
    Configured(String),
    /// Instance released
    Closed,
}

/// Which units may trigger configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureGate {
    /// Only keyframe-flagged units (video)
    Keyframe,
    /// Any unit (audio)
    EveryFrame,
}

enum DecoderHandle {
    Unconfigured(Box<dyn DecoderBackend>),
    Configured {
        codec: String,
        backend: Box<dyn DecoderBackend>,
    },
    Closed,
}

/// Decoder state machine for one track
pub struct FrameDecoder<O: Send + 'static> {
    provider: Arc<dyn DecoderProvider<Output = O>>,
    gate: ConfigureGate,
    handle: DecoderHandle,
    outputs: Option<mpsc::UnboundedReceiver<O>>,
    support: CodecSupportCache,
}

impl<O: Send + 'static> fmt::Debug for FrameDecoder<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameDecoder")
            .field("gate", &self.gate)
            .field("state", &self.state())
            .field("cached_probes", &self.support.len())
            .finish()
    }
}

impl<O: Send + 'static> FrameDecoder<O> {
    /// Create a decoder with a fresh, unconfigured instance
    pub fn new(
        provider: Arc<dyn DecoderProvider<Output = O>>,
        gate: ConfigureGate,
    ) -> MediaResult<Self> {
        let mut decoder = Self {
            provider,
            gate,
            handle: DecoderHandle::Closed,
            outputs: None,
            support: CodecSupportCache::new(),
        };
        decoder.open_handle()?;
        Ok(decoder)
    }

    fn open_handle(&mut self) -> MediaResult<()> {
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let backend = self.provider.create_decoder(output_tx)?;
        self.handle = DecoderHandle::Unconfigured(backend);
        self.outputs = Some(output_rx);
        Ok(())
    }

    /// Current state
    pub fn state(&self) -> DecoderState {
        match &self.handle {
            DecoderHandle::Unconfigured(_) => DecoderState::Unconfigured,
            DecoderHandle::Configured { codec, .. } => DecoderState::Configured(codec.clone()),
            DecoderHandle::Closed => DecoderState::Closed,
        }
    }

    /// Configure the decoder for `metadata` if this unit is eligible and the
    /// decoder is not already configured for the same codec.
    pub async fn configure_if_needed(&mut self, metadata: &TrackMetadata) -> MediaResult<()> {
        if matches!(self.handle, DecoderHandle::Closed) {
            self.open_handle()?;
        }

        let eligible = match self.gate {
            ConfigureGate::Keyframe => metadata.is_keyframe(),
            ConfigureGate::EveryFrame => true,
        };
        if !eligible {
            return Ok(());
        }

        if let DecoderHandle::Configured { codec, .. } = &self.handle {
            if *codec == metadata.codec {
                return Ok(());
            }
            info!(from = %codec, to = %metadata.codec, "Codec changed, reconfiguring");
        }

        let config = DecoderConfig::from_metadata(metadata)?;
        if !self.support.probe(self.provider.as_ref(), &config).await {
            if matches!(self.handle, DecoderHandle::Configured { .. }) {
                // Later delta units must not be decoded against the previous codec
                self.close();
                self.open_handle()?;
            }
            return Err(MediaError::CodecUnsupported {
                codec: metadata.codec.clone(),
            });
        }

        let mut backend = match std::mem::replace(&mut self.handle, DecoderHandle::Closed) {
            DecoderHandle::Unconfigured(backend) | DecoderHandle::Configured { backend, .. } => {
                backend
            }
            DecoderHandle::Closed => return Err(MediaError::Closed),
        };

        match backend.configure(&config) {
            Ok(()) => {
                info!(codec = %metadata.codec, "Decoder configured");
                self.handle = DecoderHandle::Configured {
                    codec: metadata.codec.clone(),
                    backend,
                };
                Ok(())
            }
            Err(e) => {
                self.handle = DecoderHandle::Unconfigured(backend);
                Err(e)
            }
        }
    }

    /// Submit a unit; requires the `Configured` state
    pub fn decode(&mut self, metadata: &TrackMetadata, payload: Bytes) -> MediaResult<()> {
        let result = match &mut self.handle {
            DecoderHandle::Configured { backend, .. } => backend.decode(EncodedChunk {
                timestamp: metadata.ts,
                chunk_type: ChunkType::Key,
                data: payload,
            }),
            _ => {
                return Err(MediaError::DecoderNotConfigured {
                    codec: metadata.codec.clone(),
                })
            }
        };

        if let Err(MediaError::DecodingFailed { codec, reason }) = &result {
            // A failed instance is not reused; the next unit gets a fresh one
            warn!(%codec, %reason, "Decoder failed, closing instance");
            self.close();
        }
        result
    }

    /// Configure if needed, then decode
    pub async fn submit(&mut self, metadata: &TrackMetadata, payload: Bytes) -> MediaResult<()> {
        self.configure_if_needed(metadata).await?;
        self.decode(metadata, payload)
    }

    /// Submitted units not yet output by the current instance
    pub fn decode_queue_size(&self) -> usize {
        match &self.handle {
            DecoderHandle::Unconfigured(backend) | DecoderHandle::Configured { backend, .. } => {
                backend.decode_queue_size()
            }
            DecoderHandle::Closed => 0,
        }
    }

    /// Wait for the next output of the current instance.
    ///
    /// Pends forever while there is no live instance, which makes it suitable
    /// as a `select!` branch.
    pub async fn next_output(&mut self) -> O {
        if let Some(outputs) = self.outputs.as_mut() {
            if let Some(output) = outputs.recv().await {
                return output;
            }
            self.outputs = None;
        }
        std::future::pending().await
    }

    /// Take an already-delivered output without waiting
    pub fn try_next_output(&mut self) -> Option<O> {
        self.outputs.as_mut()?.try_recv().ok()
    }

    /// Release the instance; idempotent
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.handle, DecoderHandle::Closed) {
            DecoderHandle::Unconfigured(mut backend)
            | DecoderHandle::Configured {
                mut backend,
                ..
            } => {
                backend.close();
                debug!("Decoder instance closed");
            }
            DecoderHandle::Closed => {}
        }
        self.outputs = None;
    }

    /// Close, forget probe results and start over with a fresh instance
    pub fn reset(&mut self) -> MediaResult<()> {
        self.close();
        self.support.clear();
        self.open_handle()
    }

    /// Probe results gathered in this session
    pub fn support_cache(&self) -> &CodecSupportCache {
        &self.support
    }
}
