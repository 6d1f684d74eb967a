//! Mock video decoder shared by the facade integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use wsmedia::*;

/// Decodes every chunk of a supported codec into a small solid frame
#[derive(Default)]
pub struct FakeVideoDecoder {
    supported: Vec<String>,
    created: AtomicUsize,
    decoded: Arc<Mutex<Vec<u64>>>,
}

impl FakeVideoDecoder {
    pub fn supporting(codecs: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            supported: codecs.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        })
    }

    /// Decoder instances created so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Timestamps of every decoded chunk, in order
    pub fn decoded(&self) -> Vec<u64> {
        self.decoded.lock().clone()
    }
}

#[async_trait]
impl DecoderProvider for FakeVideoDecoder {
    type Output = DecodedVideoFrame;

    async fn is_config_supported(&self, config: &DecoderConfig) -> bool {
        self.supported.iter().any(|codec| codec == config.codec())
    }

    fn create_decoder(
        &self,
        output: mpsc::UnboundedSender<DecodedVideoFrame>,
    ) -> Result<Box<dyn DecoderBackend>, MediaError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeBackend {
            output,
            decoded: self.decoded.clone(),
        }))
    }
}

struct FakeBackend {
    output: mpsc::UnboundedSender<DecodedVideoFrame>,
    decoded: Arc<Mutex<Vec<u64>>>,
}

impl DecoderBackend for FakeBackend {
    fn configure(&mut self, _config: &DecoderConfig) -> Result<(), MediaError> {
        Ok(())
    }

    fn decode(&mut self, chunk: EncodedChunk) -> Result<(), MediaError> {
        self.decoded.lock().push(chunk.timestamp);
        let _ = self
            .output
            .send(DecodedVideoFrame::solid(4, 4, [200, 100, 50, 255], chunk.timestamp));
        Ok(())
    }

    fn decode_queue_size(&self) -> usize {
        0
    }

    fn close(&mut self) {}
}

/// Poll `condition` until it holds or five seconds pass
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never held");
}
