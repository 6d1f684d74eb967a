//! Mock decoders shared by the media integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use wsmedia_media::*;

/// State shared between a mock provider and every backend it created
#[derive(Default)]
pub struct MockShared {
    /// Queue depth reported by every backend
    pub pending: AtomicUsize,
    /// Emit a frame for every decoded chunk
    pub auto_output: AtomicBool,
    /// Codecs passed to `configure`, in order
    pub configured: Mutex<Vec<String>>,
    /// Timestamps of decoded chunks, in order
    pub decoded: Mutex<Vec<u64>>,
    /// Number of `close` calls
    pub closed: AtomicUsize,
    /// Output senders of every backend, in creation order
    pub senders: Mutex<Vec<mpsc::UnboundedSender<DecodedVideoFrame>>>,
}

/// Video decoder provider supporting a fixed set of codec strings
pub struct MockVideoProvider {
    pub supported: Vec<String>,
    pub probes: AtomicUsize,
    pub created: AtomicUsize,
    pub shared: Arc<MockShared>,
}

impl MockVideoProvider {
    pub fn supporting(codecs: &[&str]) -> Arc<Self> {
        let shared = MockShared::default();
        shared.auto_output.store(true, Ordering::SeqCst);
        Arc::new(Self {
            supported: codecs.iter().map(|c| c.to_string()).collect(),
            probes: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
            shared: Arc::new(shared),
        })
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn set_pending(&self, depth: usize) {
        self.shared.pending.store(depth, Ordering::SeqCst);
    }

    pub fn set_auto_output(&self, enabled: bool) {
        self.shared.auto_output.store(enabled, Ordering::SeqCst);
    }

    /// Push a frame through the output channel of the `index`th backend
    pub fn emit_from(&self, index: usize, timestamp: u64) -> bool {
        let senders = self.shared.senders.lock();
        senders
            .get(index)
            .map(|tx| tx.send(test_frame(timestamp)).is_ok())
            .unwrap_or(false)
    }
}

pub fn test_frame(timestamp: u64) -> DecodedVideoFrame {
    DecodedVideoFrame::solid(4, 4, [10, 20, 30, 255], timestamp)
}

#[async_trait]
impl DecoderProvider for MockVideoProvider {
    type Output = DecodedVideoFrame;

    async fn is_config_supported(&self, config: &DecoderConfig) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.supported.iter().any(|codec| codec == config.codec())
    }

    fn create_decoder(
        &self,
        output: mpsc::UnboundedSender<DecodedVideoFrame>,
    ) -> MediaResult<Box<dyn DecoderBackend>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.shared.senders.lock().push(output.clone());
        Ok(Box::new(MockVideoBackend {
            shared: self.shared.clone(),
            output,
        }))
    }
}

struct MockVideoBackend {
    shared: Arc<MockShared>,
    output: mpsc::UnboundedSender<DecodedVideoFrame>,
}

impl DecoderBackend for MockVideoBackend {
    fn configure(&mut self, config: &DecoderConfig) -> MediaResult<()> {
        self.shared.configured.lock().push(config.codec().to_string());
        Ok(())
    }

    fn decode(&mut self, chunk: EncodedChunk) -> MediaResult<()> {
        if chunk.data.is_empty() {
            return Err(MediaError::DecodingFailed {
                codec: "mock".to_string(),
                reason: "empty chunk".to_string(),
            });
        }
        assert_eq!(chunk.chunk_type, ChunkType::Key);
        self.shared.decoded.lock().push(chunk.timestamp);
        if self.shared.auto_output.load(Ordering::SeqCst) {
            let _ = self.output.send(test_frame(chunk.timestamp));
        }
        Ok(())
    }

    fn decode_queue_size(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        self.shared.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Still image decoder returning a solid frame
pub struct MockImageDecoder;

#[async_trait]
impl StillImageDecoder for MockImageDecoder {
    async fn decode_image(&self, data: Bytes, timestamp: u64) -> MediaResult<DecodedVideoFrame> {
        if data.is_empty() {
            return Err(MediaError::DecodingFailed {
                codec: "jpeg".to_string(),
                reason: "empty image".to_string(),
            });
        }
        Ok(DecodedVideoFrame::solid(6, 2, [1, 2, 3, 255], timestamp))
    }
}

pub fn payload() -> Bytes {
    Bytes::from_static(&[0, 0, 0, 1, 0x65, 0x88])
}
