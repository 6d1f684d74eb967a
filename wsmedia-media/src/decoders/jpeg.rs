//! JPEG still image decoding

use crate::codecs::StillImageDecoder;
use crate::error::{MediaError, MediaResult};
use crate::frames::DecodedVideoFrame;
use async_trait::async_trait;
use bytes::Bytes;

/// Decodes each unit as a standalone JPEG image on the blocking pool
#[derive(Debug, Clone, Default)]
pub struct JpegImageDecoder;

impl JpegImageDecoder {
    /// Create the decoder
    pub fn new() -> Self {
        Self
    }

    fn decode_blocking(data: &[u8], timestamp: u64) -> MediaResult<DecodedVideoFrame> {
        let image = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
            .map_err(|e| MediaError::DecodingFailed {
                codec: "jpeg".to_string(),
                reason: e.to_string(),
            })?
            .to_rgba8();
        let (width, height) = image.dimensions();
        DecodedVideoFrame::new(width, height, timestamp, Bytes::from(image.into_raw()))
    }
}

#[async_trait]
impl StillImageDecoder for JpegImageDecoder {
    async fn decode_image(&self, data: Bytes, timestamp: u64) -> MediaResult<DecodedVideoFrame> {
        tokio::task::spawn_blocking(move || Self::decode_blocking(&data, timestamp))
            .await
            .map_err(|e| MediaError::DecodingFailed {
                codec: "jpeg".to_string(),
                reason: format!("decode task failed: {}", e),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;

    fn encode_jpeg(width: u32, height: u32) -> Bytes {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(width, height, Rgb([200, 30, 30]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Jpeg).unwrap();
        Bytes::from(out.into_inner())
    }

    #[tokio::test]
    async fn test_decodes_dimensions_and_timestamp() {
        let frame = JpegImageDecoder::new()
            .decode_image(encode_jpeg(8, 6), 1234)
            .await
            .unwrap();
        assert_eq!((frame.display_width, frame.display_height), (8, 6));
        assert_eq!(frame.timestamp, 1234);
        assert_eq!(frame.pixels.len(), 8 * 6 * 4);
    }

    #[tokio::test]
    async fn test_garbage_is_a_decoding_error() {
        let result = JpegImageDecoder::new()
            .decode_image(Bytes::from_static(b"not a jpeg"), 0)
            .await;
        assert!(matches!(result, Err(MediaError::DecodingFailed { .. })));
    }
}
