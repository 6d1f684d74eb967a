//! Play a live stream into an in-memory surface
//!
//! Usage: `cargo run --example play_stream --features h264 -- http://host:8080/stream`
//!
//! Decoded frames land in a framebuffer; with `cpal-output` enabled audio is
//! played on the default output device. Stats are logged every five seconds.

use std::sync::Arc;
use std::time::Duration;
use wsmedia::decoders::H264DecoderProvider;
use wsmedia::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    DebugLogger::init_logging(&LoggingConfig::default())?;

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:8080".to_string());

    let mixer = MixerGraph::new(MixerConfig::default());
    #[cfg(feature = "cpal-output")]
    let _output = CpalOutput::start(mixer.clone())?;

    let surface = FramebufferSurface::new(1280, 720);
    let stream = MediaStream::builder()
        .config(PipelineConfig::low_latency())
        .surface(surface.clone())
        .video_decoder(Arc::new(H264DecoderProvider::new()))
        .output_graph(mixer)
        .build()?;

    let mut events = stream.subscribe();
    stream.connect(&url).await?;
    println!("Playing {}", url);

    let mut report = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(PipelineEvent::FrameDropped { .. }) => {}
                Ok(event) => println!("{}: {:?}", event.event_type(), event),
                Err(e) => println!("Event stream: {}", e),
            },
            _ = report.tick() => {
                stream.stats().await?.report().log();
                if let Some(text) = surface.contents().overlay() {
                    println!("Surface shows: {}", text);
                }
            }
        }
    }

    stream.close().await?;
    stream.shutdown().await;
    Ok(())
}
