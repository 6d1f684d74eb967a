//! Track router tests: metadata handling and dispatch to the processors

mod common;

use bytes::Bytes;
use common::*;
use std::sync::Arc;
use wsmedia::*;

const AVC: &str = "avc1.64001f";

fn router(
    provider: &Arc<FakeVideoDecoder>,
    audio: bool,
) -> (TrackRouter, FramebufferSurface, MixerGraph) {
    let surface = FramebufferSurface::new(640, 480);
    let renderer = Renderer::new(Box::new(surface.clone()), 16).unwrap();
    let video = VideoProcessor::new(provider.clone(), renderer, &VideoConfig::default()).unwrap();

    let mixer = MixerGraph::new(MixerConfig {
        sample_rate: 8000,
        channels: 1,
    });
    let audio = audio.then(|| {
        AudioProcessor::new(
            Arc::new(PcmDecoderProvider::new()),
            Box::new(mixer.clone()),
            &AudioConfig::default(),
        )
        .unwrap()
    });
    (TrackRouter::new(video, audio), surface, mixer)
}

fn text(metadata: &TrackMetadata) -> InboundMessage {
    InboundMessage::Text(metadata.to_json().unwrap())
}

fn binary(data: &'static [u8]) -> InboundMessage {
    InboundMessage::Binary(Bytes::from_static(data))
}

// ============================================================================
// Metadata
// ============================================================================

#[tokio::test]
async fn test_binary_before_metadata_is_dropped() {
    let provider = FakeVideoDecoder::supporting(&[AVC]);
    let (mut router, surface, _) = router(&provider, true);

    assert_eq!(router.on_message(binary(b"\x00\x00\x00\x01\x65")).await, RouteOutcome::NoMetadata);
    assert!(provider.decoded().is_empty());
    assert_eq!(surface.contents().frames_drawn(), 0);
}

#[tokio::test]
async fn test_malformed_metadata_keeps_previous() {
    let provider = FakeVideoDecoder::supporting(&[AVC]);
    let (mut router, _, _) = router(&provider, true);

    let meta = TrackMetadata::video(AVC, 1_000, true);
    assert_eq!(router.on_message(text(&meta)).await, RouteOutcome::MetadataUpdated);
    assert_eq!(
        router.on_message(InboundMessage::Text("{not json".to_string())).await,
        RouteOutcome::InvalidMetadata
    );
    assert_eq!(router.metadata(), Some(&meta));
}

#[tokio::test]
async fn test_metadata_replaced_wholesale() {
    let provider = FakeVideoDecoder::supporting(&[AVC]);
    let (mut router, _, _) = router(&provider, true);

    router.on_message(text(&TrackMetadata::video(AVC, 0, true))).await;
    router
        .on_message(InboundMessage::Text(
            r#"{"media":"video","codec":"avc1.64001f","ts":40}"#.to_string(),
        ))
        .await;

    let current = router.metadata().unwrap();
    assert_eq!(current.ts, 40);
    assert!(!current.is_keyframe());
}

#[tokio::test]
async fn test_fractional_timestamp_replaces_metadata() {
    let provider = FakeVideoDecoder::supporting(&[AVC]);
    let (mut router, _, _) = router(&provider, true);

    router.on_message(text(&TrackMetadata::video("jpeg", 0, false))).await;
    assert_eq!(
        router
            .on_message(InboundMessage::Text(
                r#"{"media":"video","codec":"avc1.64001f","ts":1.5,"type":"keyframe"}"#
                    .to_string(),
            ))
            .await,
        RouteOutcome::MetadataUpdated
    );

    let current = router.metadata().unwrap();
    assert_eq!(current.codec, AVC);
    assert_eq!(current.ts, 1);
    assert!(current.is_keyframe());
}

// ============================================================================
// Video dispatch
// ============================================================================

#[tokio::test]
async fn test_keyframe_decoded_and_rendered() {
    let provider = FakeVideoDecoder::supporting(&[AVC]);
    let (mut router, surface, _) = router(&provider, true);

    router.on_message(text(&TrackMetadata::video(AVC, 0, true))).await;
    assert_eq!(
        router.on_message(binary(b"\x00\x00\x00\x01\x65\x88")).await,
        RouteOutcome::Submitted(MediaKind::Video)
    );

    let output = router.next_output().await;
    assert!(matches!(output, DecodedOutput::Video(_)));
    assert_eq!(router.handle_output(output).await, Some(FrameDisposition::Render));

    assert_eq!(surface.contents().frames_drawn(), 1);
    assert!(router.video().is_ready());
    assert_eq!(provider.decoded(), vec![0]);
}

#[tokio::test]
async fn test_delta_before_keyframe_rejected() {
    let provider = FakeVideoDecoder::supporting(&[AVC]);
    let (mut router, _, _) = router(&provider, true);

    router.on_message(text(&TrackMetadata::video(AVC, 0, false))).await;
    match router.on_message(binary(b"\x00\x00\x00\x01\x41")).await {
        RouteOutcome::Rejected { media, .. } => assert_eq!(media, MediaKind::Video),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert!(provider.decoded().is_empty());
}

#[tokio::test]
async fn test_unknown_video_codec_shows_diagnostic() {
    let provider = FakeVideoDecoder::supporting(&[AVC]);
    let (mut router, surface, _) = router(&provider, true);

    router.on_message(text(&TrackMetadata::video("xyz", 0, true))).await;
    assert!(matches!(
        router.on_message(binary(b"\x01\x02")).await,
        RouteOutcome::Rejected { media: MediaKind::Video, .. }
    ));

    let contents = surface.contents();
    assert_eq!(contents.overlay(), Some("Codec xyz unknown"));
    assert_eq!(contents.frames_drawn(), 0);
    assert!(!router.video().is_ready());
}

#[tokio::test]
async fn test_unknown_media_kind_shows_diagnostic() {
    let provider = FakeVideoDecoder::supporting(&[AVC]);
    let (mut router, surface, _) = router(&provider, true);

    router
        .on_message(InboundMessage::Text(
            r#"{"media":"subtitle","codec":"webvtt","ts":0}"#.to_string(),
        ))
        .await;
    assert!(matches!(
        router.on_message(binary(b"text")).await,
        RouteOutcome::Rejected { media: MediaKind::Unknown, .. }
    ));
    assert_eq!(surface.contents().overlay(), Some("Codec webvtt unknown"));
    assert!(provider.decoded().is_empty());
}

// ============================================================================
// Audio dispatch
// ============================================================================

#[tokio::test]
async fn test_audio_unit_scheduled() {
    let provider = FakeVideoDecoder::supporting(&[AVC]);
    let (mut router, _, mixer) = router(&provider, true);

    router
        .on_message(text(&TrackMetadata::audio(PCM_S16_CODEC, 0, 8000, 1)))
        .await;
    let block: Vec<u8> = std::iter::repeat([0x40, 0x00]).take(80).flatten().collect();
    assert_eq!(
        router.on_message(InboundMessage::Binary(Bytes::from(block))).await,
        RouteOutcome::Submitted(MediaKind::Audio)
    );

    let output = router.next_output().await;
    assert!(matches!(output, DecodedOutput::Audio(_)));
    assert_eq!(router.handle_output(output).await, None);
    assert_eq!(mixer.active_voices(), 1);
}

#[tokio::test]
async fn test_audio_disabled_rejects_audio_units() {
    let provider = FakeVideoDecoder::supporting(&[AVC]);
    let (mut router, _, mixer) = router(&provider, false);

    router
        .on_message(text(&TrackMetadata::audio(PCM_S16_CODEC, 0, 8000, 1)))
        .await;
    assert!(matches!(
        router.on_message(binary(b"\x00\x01")).await,
        RouteOutcome::Rejected { media: MediaKind::Audio, .. }
    ));
    assert_eq!(mixer.active_voices(), 0);
    router.set_volume(0.3);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_reset_forgets_metadata_and_blanks_surface() {
    let provider = FakeVideoDecoder::supporting(&[AVC]);
    let (mut router, surface, _) = router(&provider, true);

    router.on_message(text(&TrackMetadata::video(AVC, 0, true))).await;
    router.on_message(binary(b"\x00\x00\x00\x01\x65")).await;
    let output = router.next_output().await;
    router.handle_output(output).await;
    assert!(router.video().is_ready());

    router.reset().await;
    assert!(router.metadata().is_none());
    assert!(!router.video().is_ready());
    assert!(surface.contents().is_blank());
    assert_eq!(provider.created(), 2);

    assert_eq!(router.on_message(binary(b"\x00\x00\x00\x01\x41")).await, RouteOutcome::NoMetadata);
}
