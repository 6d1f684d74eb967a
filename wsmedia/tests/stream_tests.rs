//! End-to-end tests: a MediaStream playing from a local relay server

mod common;

use bytes::Bytes;
use common::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use wsmedia::*;
use wsmedia_relay::{RelayConfig, RelayServer};

const AVC: &str = "avc1.64001f";

async fn start_relay() -> RelayServer {
    let server = RelayServer::bind(RelayConfig::local()).await.unwrap();
    let running = server.clone();
    tokio::spawn(async move { running.serve().await });
    server
}

fn video_stream(
    provider: &Arc<FakeVideoDecoder>,
    config: PipelineConfig,
) -> (MediaStream, FramebufferSurface) {
    let surface = FramebufferSurface::new(320, 240);
    let stream = MediaStream::builder()
        .config(config)
        .surface(surface.clone())
        .video_decoder(provider.clone())
        .build()
        .unwrap();
    (stream, surface)
}

async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<PipelineEvent>,
    mut matches: F,
) -> PipelineEvent
where
    F: FnMut(&PipelineEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("expected event never arrived")
}

fn is_state(state: ConnectionState) -> impl FnMut(&PipelineEvent) -> bool {
    move |event: &PipelineEvent| *event == PipelineEvent::ConnectionStateChanged { state }
}

// ============================================================================
// Builder
// ============================================================================

#[tokio::test]
async fn test_builder_requires_surface_and_decoder() {
    let result = MediaStream::builder()
        .video_decoder(FakeVideoDecoder::supporting(&[AVC]))
        .build();
    match result {
        Err(StreamError::MissingConfiguration { field }) => assert_eq!(field, "surface"),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("build succeeded without a surface"),
    }

    let result = MediaStream::builder()
        .surface(FramebufferSurface::new(16, 16))
        .build();
    assert!(matches!(
        result,
        Err(StreamError::MissingConfiguration { ref field }) if field == "video_decoder"
    ));
}

#[tokio::test]
async fn test_audio_requires_output_graph() {
    let result = MediaStream::builder()
        .config(PipelineConfig::default())
        .surface(FramebufferSurface::new(16, 16))
        .video_decoder(FakeVideoDecoder::supporting(&[AVC]))
        .build();
    match result {
        Err(e) => assert_eq!(e.error_code(), "MISSING_CONFIGURATION"),
        Ok(_) => panic!("audio enabled without an output graph"),
    }
}

#[tokio::test]
async fn test_invalid_url_rejected() {
    let provider = FakeVideoDecoder::supporting(&[AVC]);
    let (stream, _) = video_stream(&provider, PipelineConfig::video_only());
    let result = stream.connect("ftp://example.com/stream").await;
    assert!(matches!(
        result,
        Err(StreamError::Transport(WsMediaError::InvalidUrl { .. }))
    ));
    stream.shutdown().await;
}

// ============================================================================
// Playback
// ============================================================================

#[tokio::test]
async fn test_plays_video_from_relay() {
    let relay = start_relay().await;
    let provider = FakeVideoDecoder::supporting(&[AVC]);
    let (stream, surface) = video_stream(&provider, PipelineConfig::video_only());
    let mut events = stream.subscribe();

    // http URLs are rewritten to ws
    let url = relay.url().replacen("ws://", "http://", 1);
    stream.connect(&url).await.unwrap();
    wait_for_event(&mut events, is_state(ConnectionState::Connected)).await;
    eventually(|| relay.connection_count() == 1).await;

    let keyframe = Bytes::from_static(b"\x00\x00\x00\x01\x65");
    let delta = Bytes::from_static(b"\x00\x00\x00\x01\x41");
    relay.publish(&TrackMetadata::video(AVC, 0, true), keyframe).unwrap();
    relay.publish(&TrackMetadata::video(AVC, 33_000, false), delta).unwrap();

    wait_for_event(&mut events, |e| *e == PipelineEvent::ReadyStateChanged { loaded: true }).await;
    eventually(|| surface.contents().frames_drawn() == 2).await;
    assert_eq!(provider.decoded(), vec![0, 33_000]);

    let stats = stream.stats().await.unwrap();
    assert_eq!(stats.connection, ConnectionState::Connected);
    assert!(stats.ready);
    assert_eq!(stats.render_backend, RenderBackend::Fallback);
    assert_eq!(stats.video.frames_rendered, 2);
    assert!(stats.url.unwrap().starts_with("ws://127.0.0.1:"));
    assert!(stats.audio.is_none());

    stream.close().await.unwrap();
    wait_for_event(&mut events, |e| *e == PipelineEvent::ReadyStateChanged { loaded: false }).await;
    assert!(surface.contents().is_blank());
    assert_eq!(
        stream.stats().await.unwrap().connection,
        ConnectionState::Disconnected
    );

    stream.shutdown().await;
    relay.shutdown();
}

#[tokio::test]
async fn test_unsupported_codec_shows_diagnostic() {
    let relay = start_relay().await;
    let provider = FakeVideoDecoder::supporting(&[AVC]);
    let (stream, surface) = video_stream(&provider, PipelineConfig::video_only());
    let mut events = stream.subscribe();

    stream.connect(&relay.url()).await.unwrap();
    wait_for_event(&mut events, is_state(ConnectionState::Connected)).await;
    eventually(|| relay.connection_count() == 1).await;

    let meta = TrackMetadata::video("hev1.1.6.L93.B0", 0, true);
    relay
        .publish(&meta, Bytes::from_static(b"\x00\x00\x00\x01\x40"))
        .unwrap();

    eventually(|| {
        surface.contents().overlay() == Some("Codec hev1.1.6.L93.B0 not supported")
    })
    .await;
    assert_eq!(surface.contents().frames_drawn(), 0);
    assert!(provider.decoded().is_empty());

    stream.shutdown().await;
    relay.shutdown();
}

// ============================================================================
// Reconnection
// ============================================================================

#[tokio::test]
async fn test_reconnects_after_server_loss() {
    let relay = start_relay().await;
    let provider = FakeVideoDecoder::supporting(&[AVC]);
    let config = PipelineConfig::video_only().with_reconnect_delay(Duration::from_millis(50));
    let (stream, _) = video_stream(&provider, config);
    let mut events = stream.subscribe();

    stream.connect(&relay.url()).await.unwrap();
    wait_for_event(&mut events, is_state(ConnectionState::Connected)).await;
    eventually(|| relay.connection_count() == 1).await;

    relay.shutdown();

    let scheduled = wait_for_event(&mut events, |e| {
        matches!(e, PipelineEvent::ReconnectScheduled { .. })
    })
    .await;
    assert_eq!(
        scheduled,
        PipelineEvent::ReconnectScheduled {
            delay: Duration::from_millis(50)
        }
    );

    // The listener is gone, so every attempt fails and another is scheduled
    tokio::time::timeout(Duration::from_secs(5), async {
        while stream.stats().await.unwrap().reconnect_attempts < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("stream never retried");

    // An explicit close cancels the retry loop
    stream.close().await.unwrap();
    let attempts = stream.stats().await.unwrap().reconnect_attempts;
    tokio::time::sleep(Duration::from_millis(300)).await;
    let stats = stream.stats().await.unwrap();
    assert_eq!(stats.reconnect_attempts, attempts);
    assert_eq!(stats.connection, ConnectionState::Disconnected);

    stream.shutdown().await;
}

#[tokio::test]
async fn test_connect_replaces_current_stream() {
    let first = start_relay().await;
    let second = start_relay().await;
    let provider = FakeVideoDecoder::supporting(&[AVC]);
    let (stream, surface) = video_stream(&provider, PipelineConfig::video_only());
    let mut events = stream.subscribe();

    stream.connect(&first.url()).await.unwrap();
    wait_for_event(&mut events, is_state(ConnectionState::Connected)).await;
    eventually(|| first.connection_count() == 1).await;

    stream.connect(&second.url()).await.unwrap();
    wait_for_event(&mut events, is_state(ConnectionState::Connected)).await;
    eventually(|| second.connection_count() == 1).await;
    eventually(|| first.connection_count() == 0).await;

    let keyframe = Bytes::from_static(b"\x00\x00\x00\x01\x65");
    second.publish(&TrackMetadata::video(AVC, 7, true), keyframe).unwrap();
    eventually(|| surface.contents().frames_drawn() == 1).await;
    // One decoder at build, one per connect
    assert_eq!(provider.created(), 3);

    stream.shutdown().await;
    first.shutdown();
    second.shutdown();
}

#[tokio::test]
async fn test_ready_events_only_report_changes() {
    let first = start_relay().await;
    let second = start_relay().await;
    let provider = FakeVideoDecoder::supporting(&[AVC]);
    let (stream, surface) = video_stream(&provider, PipelineConfig::video_only());
    let mut events = stream.subscribe();
    let mut log = stream.subscribe();
    let keyframe = Bytes::from_static(b"\x00\x00\x00\x01\x65");

    stream.connect(&first.url()).await.unwrap();
    wait_for_event(&mut events, is_state(ConnectionState::Connected)).await;
    eventually(|| first.connection_count() == 1).await;
    first.publish(&TrackMetadata::video(AVC, 0, true), keyframe.clone()).unwrap();
    wait_for_event(&mut events, |e| *e == PipelineEvent::ReadyStateChanged { loaded: true }).await;

    // Switching streams blanks the surface, then the next keyframe restores it
    stream.connect(&second.url()).await.unwrap();
    wait_for_event(&mut events, is_state(ConnectionState::Connected)).await;
    eventually(|| second.connection_count() == 1).await;
    second.publish(&TrackMetadata::video(AVC, 0, true), keyframe).unwrap();
    eventually(|| surface.contents().frames_drawn() == 2).await;
    assert!(stream.stats().await.unwrap().ready);

    stream.shutdown().await;
    let mut reported = Vec::new();
    loop {
        match log.recv().await {
            Ok(PipelineEvent::ReadyStateChanged { loaded }) => reported.push(loaded),
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    assert_eq!(reported.first(), Some(&true));
    assert!(
        reported.windows(2).all(|pair| pair[0] != pair[1]),
        "repeated ready value in {:?}",
        reported
    );
    first.shutdown();
    second.shutdown();
}

#[cfg(feature = "diagnostics")]
#[tokio::test]
async fn test_stats_report() {
    let provider = FakeVideoDecoder::supporting(&[AVC]);
    let (stream, _) = video_stream(&provider, PipelineConfig::video_only());
    let report = stream.stats().await.unwrap().report();
    assert_eq!(report.connection, ConnectionState::Disconnected);
    assert_eq!(report.render_backend, Some(RenderBackend::Fallback));
    assert!(report.url.is_none());
    assert!(report.to_json().is_ok());
    stream.shutdown().await;
}
