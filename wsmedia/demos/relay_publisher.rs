//! Publish an Annex-B H.264 file on a local relay
//!
//! Usage: `cargo run --example relay_publisher -- clip.h264 [fps]`
//!
//! The file is looped forever. Point `play_stream` at the printed URL.

use std::time::Duration;
use wsmedia::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    DebugLogger::init_logging(&LoggingConfig::default())?;

    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: relay_publisher <file.h264> [fps]"))?;
    let fps: u64 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(30);
    let data = std::fs::read(&path)?;

    let relay = RelayServer::bind(RelayConfig::default()).await?;
    println!("Serving {} on {}", path, relay.url());
    let server = relay.clone();
    tokio::spawn(async move { server.serve().await });

    let frame_interval = Duration::from_micros(1_000_000 / fps.max(1));
    let mut ticker = tokio::time::interval(frame_interval);
    let mut packetizer = H264Packetizer::new();
    let mut ts = 0u64;
    loop {
        for nal in split_annex_b(&data) {
            if let Some(unit) = packetizer.on_nal(nal, ts) {
                ticker.tick().await;
                relay.publish_unit(&unit)?;
                ts += frame_interval.as_micros() as u64;
            }
        }
    }
}
