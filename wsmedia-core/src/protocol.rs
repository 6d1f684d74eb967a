//! Stream wire protocol
//!
//! A stream is a sequence of WebSocket messages. A text message carries a JSON
//! [`TrackMetadata`] record describing the binary messages that follow it; a
//! binary message carries one encoded media unit (an Annex-B access unit, a
//! JPEG image, or an audio packet). The most recent metadata applies to every
//! following binary message until it is replaced wholesale.

use crate::error::{WsMediaError, WsMediaResult};
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Media kind of a binary unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Video unit
    Video,
    /// Audio unit
    Audio,
    /// Anything else; such units are ignored by the router
    #[serde(other)]
    Unknown,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Frame type hint sent with video units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    /// Independently decodable frame
    Keyframe,
    /// Any other frame type string
    #[serde(other)]
    Delta,
}

/// Metadata describing the binary units that follow it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    /// Media kind
    pub media: MediaKind,
    /// Codec string, e.g. `avc1.42e01e`, `hev1.1.6.L93.B0`, `jpeg`, `opus`
    pub codec: String,
    /// Presentation timestamp in microseconds
    #[serde(default, deserialize_with = "de_wire_u64")]
    pub ts: u64,
    /// Frame type; absent means "not a keyframe"
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub frame_type: Option<FrameType>,
    /// Sample rate (audio) or clock rate (video)
    #[serde(
        rename = "freq",
        default,
        deserialize_with = "de_wire_opt_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub sample_rate: Option<u32>,
    /// Channel count for audio
    #[serde(
        default,
        deserialize_with = "de_wire_opt_u32",
        skip_serializing_if = "Option::is_none"
    )]
    pub channels: Option<u32>,
}

/// Integer value of a JSON number; fractions are truncated toward zero
fn number_to_u64(number: &serde_json::Number) -> Option<u64> {
    if let Some(value) = number.as_u64() {
        return Some(value);
    }
    number
        .as_f64()
        .filter(|value| value.is_finite() && *value >= 0.0 && *value < u64::MAX as f64)
        .map(|value| value.trunc() as u64)
}

fn de_wire_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;
    number_to_u64(&number).ok_or_else(|| {
        serde::de::Error::custom(format!("expected a non-negative number, got {}", number))
    })
}

fn de_wire_opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(number) = Option::<serde_json::Number>::deserialize(deserializer)? else {
        return Ok(None);
    };
    number_to_u64(&number)
        .and_then(|value| u32::try_from(value).ok())
        .map(Some)
        .ok_or_else(|| {
            serde::de::Error::custom(format!("expected a non-negative number, got {}", number))
        })
}

impl TrackMetadata {
    /// Metadata for a video unit
    pub fn video(codec: impl Into<String>, ts: u64, keyframe: bool) -> Self {
        Self {
            media: MediaKind::Video,
            codec: codec.into(),
            ts,
            frame_type: keyframe.then_some(FrameType::Keyframe),
            sample_rate: None,
            channels: None,
        }
    }

    /// Metadata for an audio unit
    pub fn audio(codec: impl Into<String>, ts: u64, sample_rate: u32, channels: u32) -> Self {
        Self {
            media: MediaKind::Audio,
            codec: codec.into(),
            ts,
            frame_type: None,
            sample_rate: Some(sample_rate),
            channels: Some(channels),
        }
    }

    /// Parse a metadata record from a text message
    pub fn parse(text: &str) -> WsMediaResult<Self> {
        serde_json::from_str(text).map_err(|e| WsMediaError::InvalidMessage {
            message: text.chars().take(128).collect(),
            source: Box::new(e),
        })
    }

    /// Serialize the record into the JSON text form
    pub fn to_json(&self) -> WsMediaResult<String> {
        serde_json::to_string(self).map_err(|e| WsMediaError::InvalidMessage {
            message: format!("{:?}", self),
            source: Box::new(e),
        })
    }

    /// Whether the following units are keyframes
    pub fn is_keyframe(&self) -> bool {
        self.frame_type == Some(FrameType::Keyframe)
    }
}

/// A message received from the stream transport
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Text message, expected to hold a metadata record
    Text(String),
    /// Binary message holding one encoded unit
    Binary(Bytes),
}

impl InboundMessage {
    /// Payload size in bytes
    pub fn len(&self) -> usize {
        match self {
            InboundMessage::Text(text) => text.len(),
            InboundMessage::Binary(data) => data.len(),
        }
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
