//! # wsmedia core
//!
//! Wire protocol and reconnecting WebSocket transport for live media streams.
//! A stream interleaves JSON metadata text messages with binary media units;
//! this crate turns a URL into an ordered sequence of those messages and keeps
//! the connection alive across network failures.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod protocol;
pub mod transport;

// Re-export main types
pub use error::{WsMediaError, WsMediaResult};
pub use protocol::{FrameType, InboundMessage, MediaKind, TrackMetadata};
pub use transport::{
    normalize_url, ConnectionManager, ConnectionState, ConnectionUpdate, Connector, Transport,
    TransportConfig, TransportEvent, WebSocketConnector, WebSocketTransport,
    DEFAULT_RECONNECT_DELAY,
};
