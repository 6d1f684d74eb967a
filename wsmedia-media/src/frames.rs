//! Encoded and decoded media frame types

use bytes::Bytes;

/// Chunk type passed to a decoder backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    /// Independently decodable
    Key,
    /// Depends on earlier chunks
    Delta,
}

/// One encoded unit handed to a decoder backend
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    /// Presentation timestamp in microseconds
    pub timestamp: u64,
    /// Chunk type
    pub chunk_type: ChunkType,
    /// Encoded payload
    pub data: Bytes,
}

/// Decoded video frame in RGBA8 layout
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedVideoFrame {
    /// Display width in pixels
    pub display_width: u32,
    /// Display height in pixels
    pub display_height: u32,
    /// Presentation timestamp in microseconds
    pub timestamp: u64,
    /// RGBA8 pixels, row-major, `display_width * display_height * 4` bytes
    pub pixels: Bytes,
}

impl DecodedVideoFrame {
    /// Build a frame, validating the pixel buffer size
    pub fn new(
        display_width: u32,
        display_height: u32,
        timestamp: u64,
        pixels: Bytes,
    ) -> crate::MediaResult<Self> {
        let expected = display_width as usize * display_height as usize * 4;
        if pixels.len() != expected {
            return Err(crate::MediaError::InvalidFrameData {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            display_width,
            display_height,
            timestamp,
            pixels,
        })
    }

    /// A frame filled with one colour
    pub fn solid(width: u32, height: u32, rgba: [u8; 4], timestamp: u64) -> Self {
        let pixels: Vec<u8> = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            display_width: width,
            display_height: height,
            timestamp,
            pixels: Bytes::from(pixels),
        }
    }

    /// RGBA value at (x, y), if inside the frame
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.display_width || y >= self.display_height {
            return None;
        }
        let offset = (y as usize * self.display_width as usize + x as usize) * 4;
        let px = self.pixels.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// Sample layout of a decoded audio frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLayout {
    /// One contiguous plane per channel
    Planar,
    /// Channels interleaved frame by frame
    Interleaved,
}

/// Decoded audio in f32 samples
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudioFrame {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Number of sample frames per channel
    pub frames: usize,
    /// Presentation timestamp in microseconds
    pub timestamp: u64,
    /// Sample layout of `samples`
    pub layout: SampleLayout,
    /// `frames * channels` samples
    pub samples: Vec<f32>,
}

impl DecodedAudioFrame {
    /// Duration of the frame in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }
}

/// Per-channel planar buffer ready for the output graph
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// One plane per channel, all of equal length
    pub channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Number of sample frames
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    /// Number of channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_frame_size_validation() {
        assert!(DecodedVideoFrame::new(2, 2, 0, Bytes::from(vec![0u8; 16])).is_ok());
        assert!(DecodedVideoFrame::new(2, 2, 0, Bytes::from(vec![0u8; 15])).is_err());
    }

    #[test]
    fn test_solid_frame_pixels() {
        let frame = DecodedVideoFrame::solid(3, 2, [1, 2, 3, 255], 7);
        assert_eq!(frame.pixel(2, 1), Some([1, 2, 3, 255]));
        assert_eq!(frame.pixel(3, 0), None);
    }

    #[test]
    fn test_audio_buffer_duration() {
        let buffer = AudioBuffer {
            sample_rate: 48000,
            channels: vec![vec![0.0; 960], vec![0.0; 960]],
        };
        assert_eq!(buffer.frames(), 960);
        assert!((buffer.duration() - 0.02).abs() < 1e-9);
    }
}
