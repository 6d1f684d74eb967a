//! Software decoder providers
//!
//! `pcm` is always built. `jpeg`, `opus` and `h264` follow the crate features
//! of the same names, since they pull in external codec libraries.

#[cfg(feature = "h264")]
pub mod h264;
#[cfg(feature = "jpeg")]
pub mod jpeg;
#[cfg(feature = "opus")]
pub mod opus;
pub mod pcm;

#[cfg(feature = "h264")]
pub use h264::H264DecoderProvider;
#[cfg(feature = "jpeg")]
pub use jpeg::JpegImageDecoder;
#[cfg(feature = "opus")]
pub use opus::OpusDecoderProvider;
pub use pcm::{PcmDecoderProvider, PCM_S16_CODEC};
