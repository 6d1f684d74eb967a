//! # wsmedia relay
//!
//! WebSocket fan-out publisher for live media tracks. Each unit goes out as a
//! JSON metadata text frame followed by its binary payload, the format
//! consumed by the `wsmedia` client. H.264 and H.265 packetizers turn raw
//! NAL units into keyframe-tagged, self-contained access units.
//!
//! ```
//! use bytes::Bytes;
//! use wsmedia_core::TrackMetadata;
//! use wsmedia_relay::{RelayConfig, RelayServer};
//!
//! # tokio_test::block_on(async {
//! let relay = RelayServer::bind(RelayConfig::local()).await.unwrap();
//! assert!(relay.url().starts_with("ws://127.0.0.1:"));
//!
//! // Nobody is subscribed yet, so the unit reaches zero clients
//! let metadata = TrackMetadata::video("jpeg", 0, true);
//! let sent = relay.publish(&metadata, Bytes::from_static(b"\xff\xd8")).unwrap();
//! assert_eq!(sent, 0);
//! relay.shutdown();
//! # });
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod packetizer;
pub mod server;

// Re-export main types
pub use packetizer::{
    presentation_timestamp, split_annex_b, strip_start_code, AccessUnit, H264Packetizer,
    H265Packetizer, Packetizer, HEVC_CODEC,
};
pub use server::{ClientInfo, RelayConfig, RelayServer, DEFAULT_CHANNEL_CAPACITY};
