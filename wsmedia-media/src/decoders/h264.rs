//! H.264 decoding through OpenH264
//!
//! Each decoder instance owns a worker thread holding the OpenH264 context.
//! Chunks are queued to the worker; the queue depth seen by the backpressure
//! policy is the number of chunks submitted and not yet finished.

use crate::codecs::{DecoderBackend, DecoderConfig, DecoderProvider};
use crate::error::{MediaError, MediaResult};
use crate::frames::{DecodedVideoFrame, EncodedChunk};
use async_trait::async_trait;
use bytes::Bytes;
use openh264::decoder::Decoder as H264Decoder;
use openh264::formats::YUVSource;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Provider for `avc1.*` video
#[derive(Debug, Clone, Default)]
pub struct H264DecoderProvider;

impl H264DecoderProvider {
    /// Create the provider
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DecoderProvider for H264DecoderProvider {
    type Output = DecodedVideoFrame;

    async fn is_config_supported(&self, config: &DecoderConfig) -> bool {
        matches!(config, DecoderConfig::Video { codec } if codec.starts_with("avc1"))
    }

    fn create_decoder(
        &self,
        output: mpsc::UnboundedSender<DecodedVideoFrame>,
    ) -> MediaResult<Box<dyn DecoderBackend>> {
        let (jobs_tx, jobs_rx) = std_mpsc::channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = pending.clone();

        thread::Builder::new()
            .name("wsmedia-h264".to_string())
            .spawn(move || run_worker(jobs_rx, output, worker_pending))
            .map_err(|e| MediaError::CodecInitializationFailed {
                codec: "avc1".to_string(),
                reason: format!("failed to spawn decoder thread: {}", e),
            })?;

        Ok(Box::new(H264Backend {
            jobs: Some(jobs_tx),
            pending,
            configured: false,
        }))
    }
}

struct H264Backend {
    jobs: Option<std_mpsc::Sender<EncodedChunk>>,
    pending: Arc<AtomicUsize>,
    configured: bool,
}

impl DecoderBackend for H264Backend {
    fn configure(&mut self, config: &DecoderConfig) -> MediaResult<()> {
        match config {
            DecoderConfig::Video { codec } if codec.starts_with("avc1") => {
                self.configured = true;
                Ok(())
            }
            other => Err(MediaError::InvalidConfiguration {
                message: format!("H.264 decoder cannot handle {}", other.codec()),
            }),
        }
    }

    fn decode(&mut self, chunk: EncodedChunk) -> MediaResult<()> {
        if !self.configured {
            return Err(MediaError::DecoderNotConfigured {
                codec: "avc1".to_string(),
            });
        }
        let jobs = self.jobs.as_ref().ok_or(MediaError::Closed)?;

        self.pending.fetch_add(1, Ordering::SeqCst);
        jobs.send(chunk).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            MediaError::DecodingFailed {
                codec: "avc1".to_string(),
                reason: "decoder thread stopped".to_string(),
            }
        })
    }

    fn decode_queue_size(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        // Dropping the sender lets the worker drain and exit
        self.jobs = None;
        self.configured = false;
    }
}

fn run_worker(
    jobs: std_mpsc::Receiver<EncodedChunk>,
    output: mpsc::UnboundedSender<DecodedVideoFrame>,
    pending: Arc<AtomicUsize>,
) {
    let mut decoder = match H264Decoder::new() {
        Ok(decoder) => decoder,
        Err(e) => {
            warn!("Failed to create H.264 decoder: {}", e);
            for _ in jobs {
                pending.fetch_sub(1, Ordering::SeqCst);
            }
            return;
        }
    };

    for chunk in jobs {
        let frame = match decoder.decode(&chunk.data) {
            Ok(Some(yuv)) => {
                let (width, height) = yuv.dimensions();
                let mut rgba = vec![0u8; width * height * 4];
                yuv.write_rgba8(&mut rgba);
                Some(DecodedVideoFrame {
                    display_width: width as u32,
                    display_height: height as u32,
                    timestamp: chunk.timestamp,
                    pixels: Bytes::from(rgba),
                })
            }
            Ok(None) => None,
            Err(e) => {
                debug!("H.264 decode error: {}", e);
                None
            }
        };

        pending.fetch_sub(1, Ordering::SeqCst);
        if let Some(frame) = frame {
            if output.send(frame).is_err() {
                break;
            }
        }
    }
    debug!("H.264 decoder thread exiting");
}
