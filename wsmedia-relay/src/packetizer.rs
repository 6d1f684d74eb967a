//! H.264 / H.265 access unit handling
//!
//! Packetizers turn a sequence of NAL units into publishable access units.
//! Parameter sets are cached and prepended to every random access unit so a
//! subscriber joining mid-stream can configure its decoder from the first
//! keyframe it sees. Every emitted payload is Annex-B framed with 4-byte
//! start codes.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use std::fmt::Write;
use wsmedia_core::TrackMetadata;

const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// Codec string advertised for H.265 streams
pub const HEVC_CODEC: &str = "hev1.1.6.L93.B0";

/// One unit ready for [`crate::RelayServer::publish`]
#[derive(Debug, Clone, PartialEq)]
pub struct AccessUnit {
    /// Control record sent ahead of the payload
    pub metadata: TrackMetadata,
    /// Annex-B payload
    pub payload: Bytes,
}

/// Turns NAL units into access units
pub trait Packetizer: Send {
    /// Feed one NAL unit, with or without a start code.
    ///
    /// Returns an access unit for slices; parameter sets and other NAL types
    /// are absorbed.
    fn on_nal(&mut self, nal: &[u8], timestamp: u64) -> Option<AccessUnit>;
}

/// Microseconds since the Unix epoch, the wire timestamp unit
pub fn presentation_timestamp(at: DateTime<Utc>) -> u64 {
    u64::try_from(at.timestamp_micros()).unwrap_or(0)
}

/// Strip a leading 3- or 4-byte start code
pub fn strip_start_code(nal: &[u8]) -> &[u8] {
    if nal.starts_with(&START_CODE) {
        &nal[4..]
    } else if nal.starts_with(&START_CODE[1..]) {
        &nal[3..]
    } else {
        nal
    }
}

/// Split an Annex-B byte stream into NAL units, start codes removed
pub fn split_annex_b(stream: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= stream.len() {
        if stream[i] == 0 && stream[i + 1] == 0 && stream[i + 2] == 1 {
            starts.push((i, i + 3));
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut nals = Vec::with_capacity(starts.len());
    for (index, &(_, payload_start)) in starts.iter().enumerate() {
        let mut end = starts
            .get(index + 1)
            .map(|&(code_start, _)| code_start)
            .unwrap_or(stream.len());
        // A 4-byte start code leaves one zero byte behind the previous unit
        if index + 1 < starts.len() && end > payload_start && stream[end - 1] == 0 {
            end -= 1;
        }
        if end > payload_start {
            nals.push(&stream[payload_start..end]);
        }
    }
    nals
}

fn with_start_code(buf: &mut BytesMut, nal: &[u8]) {
    buf.put_slice(&START_CODE);
    buf.put_slice(nal);
}

/// H.264 packetizer
#[derive(Debug, Default)]
pub struct H264Packetizer {
    sps: Option<Bytes>,
    pps: Option<Bytes>,
}

impl H264Packetizer {
    const SLICE: u8 = 1;
    const IDR: u8 = 5;
    const SPS: u8 = 7;
    const PPS: u8 = 8;

    /// Packetizer with an empty parameter set cache
    pub fn new() -> Self {
        Self::default()
    }

    /// `avc1.` followed by profile, constraint flags and level from the SPS
    pub fn codec(&self) -> String {
        let mut codec = String::from("avc1.");
        if let Some(sps) = &self.sps {
            for byte in sps.iter().skip(1).take(3) {
                let _ = write!(codec, "{:02x}", byte);
            }
        }
        codec
    }

    fn metadata(&self, timestamp: u64, keyframe: bool) -> TrackMetadata {
        TrackMetadata::video(self.codec(), timestamp, keyframe)
    }
}

impl Packetizer for H264Packetizer {
    fn on_nal(&mut self, nal: &[u8], timestamp: u64) -> Option<AccessUnit> {
        let nal = strip_start_code(nal);
        let nal_type = nal.first()? & 0x1f;
        match nal_type {
            Self::SPS => {
                self.sps = Some(Bytes::copy_from_slice(nal));
                None
            }
            Self::PPS => {
                self.pps = Some(Bytes::copy_from_slice(nal));
                None
            }
            Self::IDR => {
                let mut payload = BytesMut::new();
                for parameter_set in [&self.sps, &self.pps].into_iter().flatten() {
                    with_start_code(&mut payload, parameter_set);
                }
                with_start_code(&mut payload, nal);
                Some(AccessUnit {
                    metadata: self.metadata(timestamp, true),
                    payload: payload.freeze(),
                })
            }
            Self::SLICE => {
                let mut payload = BytesMut::with_capacity(nal.len() + 4);
                with_start_code(&mut payload, nal);
                Some(AccessUnit {
                    metadata: self.metadata(timestamp, false),
                    payload: payload.freeze(),
                })
            }
            _ => None,
        }
    }
}

/// H.265 packetizer
#[derive(Debug, Default)]
pub struct H265Packetizer {
    vps: Option<Bytes>,
    sps: Option<Bytes>,
    pps: Option<Bytes>,
}

impl H265Packetizer {
    const TRAIL_R: u8 = 1;
    const IDR_W_RADL: u8 = 19;
    const IDR_N_LP: u8 = 20;
    const VPS: u8 = 32;
    const SPS: u8 = 33;
    const PPS: u8 = 34;

    /// Packetizer with an empty parameter set cache
    pub fn new() -> Self {
        Self::default()
    }
}

impl Packetizer for H265Packetizer {
    fn on_nal(&mut self, nal: &[u8], timestamp: u64) -> Option<AccessUnit> {
        let nal = strip_start_code(nal);
        let nal_type = (nal.first()? & 0x7e) >> 1;
        match nal_type {
            Self::VPS => {
                self.vps = Some(Bytes::copy_from_slice(nal));
                None
            }
            Self::SPS => {
                self.sps = Some(Bytes::copy_from_slice(nal));
                None
            }
            Self::PPS => {
                self.pps = Some(Bytes::copy_from_slice(nal));
                None
            }
            Self::IDR_W_RADL | Self::IDR_N_LP => {
                let mut payload = BytesMut::new();
                for parameter_set in [&self.vps, &self.sps, &self.pps].into_iter().flatten() {
                    with_start_code(&mut payload, parameter_set);
                }
                with_start_code(&mut payload, nal);
                Some(AccessUnit {
                    metadata: TrackMetadata::video(HEVC_CODEC, timestamp, true),
                    payload: payload.freeze(),
                })
            }
            Self::TRAIL_R => {
                let mut payload = BytesMut::with_capacity(nal.len() + 4);
                with_start_code(&mut payload, nal);
                Some(AccessUnit {
                    metadata: TrackMetadata::video(HEVC_CODEC, timestamp, false),
                    payload: payload.freeze(),
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPS: [u8; 6] = [0x67, 0x42, 0xe0, 0x1e, 0xab, 0xcd];
    const PPS: [u8; 3] = [0x68, 0xce, 0x38];
    const IDR: [u8; 3] = [0x65, 0x88, 0x84];
    const SLICE: [u8; 3] = [0x41, 0x9a, 0x02];

    #[test]
    fn test_h264_idr_carries_parameter_sets() {
        let mut packetizer = H264Packetizer::new();
        assert!(packetizer.on_nal(&SPS, 0).is_none());
        assert!(packetizer.on_nal(&PPS, 0).is_none());

        let unit = packetizer.on_nal(&IDR, 1_000).unwrap();
        assert_eq!(unit.metadata.codec, "avc1.42e01e");
        assert!(unit.metadata.is_keyframe());
        assert_eq!(unit.metadata.ts, 1_000);

        let mut expected = Vec::new();
        for nal in [&SPS[..], &PPS[..], &IDR[..]] {
            expected.extend_from_slice(&START_CODE);
            expected.extend_from_slice(nal);
        }
        assert_eq!(unit.payload.as_ref(), expected.as_slice());
    }

    #[test]
    fn test_h264_slice_is_delta() {
        let mut packetizer = H264Packetizer::new();
        packetizer.on_nal(&SPS, 0);
        let unit = packetizer.on_nal(&[0, 0, 1, 0x41, 0x9a, 0x02], 2_000).unwrap();
        assert!(!unit.metadata.is_keyframe());
        assert_eq!(&unit.payload[4..], &SLICE[..]);
    }

    #[test]
    fn test_h264_other_nal_types_absorbed() {
        let mut packetizer = H264Packetizer::new();
        // SEI and access unit delimiter
        assert!(packetizer.on_nal(&[0x06, 0x05], 0).is_none());
        assert!(packetizer.on_nal(&[0x09, 0xf0], 0).is_none());
        assert!(packetizer.on_nal(&[], 0).is_none());
    }

    #[test]
    fn test_h264_codec_before_sps() {
        assert_eq!(H264Packetizer::new().codec(), "avc1.");
    }

    #[test]
    fn test_h265_irap_is_keyframe() {
        let mut packetizer = H265Packetizer::new();
        packetizer.on_nal(&[0x40, 0x01, 0x0c], 0); // VPS
        packetizer.on_nal(&[0x42, 0x01, 0x01], 0); // SPS
        packetizer.on_nal(&[0x44, 0x01, 0xc1], 0); // PPS

        let unit = packetizer.on_nal(&[0x26, 0x01, 0xaf], 5).unwrap(); // IDR_W_RADL
        assert_eq!(unit.metadata.codec, HEVC_CODEC);
        assert!(unit.metadata.is_keyframe());
        assert_eq!(split_annex_b(&unit.payload).len(), 4);

        let unit = packetizer.on_nal(&[0x02, 0x01, 0xd0], 6).unwrap(); // TRAIL_R
        assert!(!unit.metadata.is_keyframe());
        assert_eq!(split_annex_b(&unit.payload).len(), 1);
    }

    #[test]
    fn test_split_annex_b_mixed_start_codes() {
        let stream: [u8; 17] = [0, 0, 0, 1, 0x67, 0x42, 0, 0, 1, 0x68, 0xce, 0, 0, 0, 1, 0x65, 0x88];
        let expected: Vec<&[u8]> = vec![&[0x67, 0x42], &[0x68, 0xce], &[0x65, 0x88]];
        assert_eq!(split_annex_b(&stream), expected);
    }

    #[test]
    fn test_presentation_timestamp_is_micros() {
        let at = DateTime::<Utc>::from_timestamp(2, 500_000_000).unwrap();
        assert_eq!(presentation_timestamp(at), 2_500_000);
    }
}
