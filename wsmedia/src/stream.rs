//! Stream handle and pipeline driver
//!
//! [`MediaStream`] is a cheap handle to a driver task that owns the whole
//! pipeline: connection manager, track router, both processors and the
//! renderer. The driver runs a single `select!` loop over handle commands,
//! transport events, decoder outputs, the ready flag and the reconnect
//! deadline, so pipeline state is only ever touched from one task.

use crate::config::PipelineConfig;
use crate::error::{StreamError, StreamResult};
use crate::event::PipelineEvent;
use crate::router::TrackRouter;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;
use wsmedia_core::{
    normalize_url, ConnectionManager, ConnectionState, ConnectionUpdate, Connector,
    TransportEvent, WebSocketConnector, WsMediaError,
};
use wsmedia_media::{
    AudioProcessor, AudioStats, DecodedAudioFrame, DecodedVideoFrame, DecoderProvider,
    DisplaySurface, FrameDisposition, OutputGraph, PcmDecoderProvider, RenderBackend, Renderer,
    StillImageDecoder, VideoProcessor, VideoStats,
};

const EVENT_CAPACITY: usize = 64;

/// Snapshot of a running stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamStats {
    /// Connection state
    pub connection: ConnectionState,
    /// Current stream URL
    pub url: Option<String>,
    /// Reconnects performed so far
    pub reconnect_attempts: u64,
    /// Whether a decoded frame is on screen
    pub ready: bool,
    /// Renderer variant in use
    pub render_backend: RenderBackend,
    /// Video counters
    pub video: VideoStats,
    /// Audio counters, absent without audio
    pub audio: Option<AudioStats>,
}

#[cfg(feature = "diagnostics")]
impl StreamStats {
    /// Serialisable report for logs
    pub fn report(&self) -> wsmedia_diagnostics::StreamReport {
        let mut report = wsmedia_diagnostics::StreamReport::new(
            self.connection,
            self.video.clone(),
            self.audio.clone(),
        )
        .with_reconnect_attempts(self.reconnect_attempts)
        .with_presentation(self.ready, self.render_backend);
        if let Some(url) = &self.url {
            report = report.with_url(url.clone());
        }
        report
    }
}

enum Command {
    Connect {
        url: Url,
        ack: oneshot::Sender<()>,
    },
    Close {
        ack: oneshot::Sender<()>,
    },
    SetVolume(f32),
    Stats(oneshot::Sender<StreamStats>),
    Shutdown,
}

/// Fluent builder for a [`MediaStream`]
pub struct MediaStreamBuilder {
    config: PipelineConfig,
    surface: Option<Box<dyn DisplaySurface>>,
    video_decoder: Option<Arc<dyn DecoderProvider<Output = DecodedVideoFrame>>>,
    image_decoder: Option<Arc<dyn StillImageDecoder>>,
    audio_decoder: Option<Arc<dyn DecoderProvider<Output = DecodedAudioFrame>>>,
    output_graph: Option<Box<dyn OutputGraph>>,
    connector: Option<Arc<dyn Connector>>,
}

impl Default for MediaStreamBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaStreamBuilder {
    /// Builder with the default configuration
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            surface: None,
            video_decoder: None,
            image_decoder: None,
            audio_decoder: None,
            output_graph: None,
            connector: None,
        }
    }

    /// Pipeline configuration
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Display surface for video (required)
    pub fn surface(mut self, surface: impl DisplaySurface + 'static) -> Self {
        self.surface = Some(Box::new(surface));
        self
    }

    /// Video decode capability for H.264/H.265 (required)
    pub fn video_decoder(
        mut self,
        provider: Arc<dyn DecoderProvider<Output = DecodedVideoFrame>>,
    ) -> Self {
        self.video_decoder = Some(provider);
        self
    }

    /// Still image decoder for `jpeg` units
    pub fn image_decoder(mut self, decoder: Arc<dyn StillImageDecoder>) -> Self {
        self.image_decoder = Some(decoder);
        self
    }

    /// Audio decode capability; defaults to PCM
    pub fn audio_decoder(
        mut self,
        provider: Arc<dyn DecoderProvider<Output = DecodedAudioFrame>>,
    ) -> Self {
        self.audio_decoder = Some(provider);
        self
    }

    /// Audio output graph (required when audio is enabled)
    pub fn output_graph(mut self, graph: impl OutputGraph + 'static) -> Self {
        self.output_graph = Some(Box::new(graph));
        self
    }

    /// Connection factory; defaults to WebSocket
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Build the pipeline and start its driver task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> StreamResult<MediaStream> {
        let surface = self.surface.ok_or_else(|| missing("surface"))?;
        let video_decoder = self.video_decoder.ok_or_else(|| missing("video_decoder"))?;

        let renderer = Renderer::new(surface, self.config.video.diagnostic_font_px)?;
        let mut video = VideoProcessor::new(video_decoder, renderer, &self.config.video)?;
        if let Some(image_decoder) = self.image_decoder.or_else(default_image_decoder) {
            video = video.with_image_decoder(image_decoder);
        }

        let audio = match &self.config.audio {
            Some(audio_config) => {
                let graph = self.output_graph.ok_or_else(|| missing("output_graph"))?;
                let provider = self
                    .audio_decoder
                    .unwrap_or_else(|| Arc::new(PcmDecoderProvider::new()));
                Some(AudioProcessor::new(provider, graph, audio_config)?)
            }
            None => None,
        };

        let connector = self.connector.unwrap_or_else(|| {
            Arc::new(WebSocketConnector::new(
                self.config.transport.connect_timeout,
            ))
        });
        let (manager, transport_events) =
            ConnectionManager::new(connector, self.config.transport.clone());

        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let ready = video.subscribe_ready();
        let last_ready = *ready.borrow();
        let driver = Driver {
            last_ready,
            ready,
            router: TrackRouter::new(video, audio),
            manager,
            transport_events,
            commands,
            events: events.clone(),
            last_state: ConnectionState::Disconnected,
        };
        let task = tokio::spawn(driver.run());

        Ok(MediaStream {
            commands: commands_tx,
            events,
            task: Some(task),
        })
    }
}

fn missing(field: &str) -> StreamError {
    StreamError::MissingConfiguration {
        field: field.to_string(),
    }
}

#[cfg(feature = "jpeg")]
fn default_image_decoder() -> Option<Arc<dyn StillImageDecoder>> {
    Some(Arc::new(wsmedia_media::decoders::JpegImageDecoder::new()))
}

#[cfg(not(feature = "jpeg"))]
fn default_image_decoder() -> Option<Arc<dyn StillImageDecoder>> {
    None
}

/// Handle to a running decode and playback pipeline
pub struct MediaStream {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<PipelineEvent>,
    task: Option<JoinHandle<()>>,
}

impl MediaStream {
    /// Start building a stream
    pub fn builder() -> MediaStreamBuilder {
        MediaStreamBuilder::new()
    }

    /// Connect to `url`, replacing any current connection.
    ///
    /// `http`/`https` URLs are rewritten to `ws`/`wss`. Resolves once the
    /// pipeline has been reset and the connection attempt started.
    pub async fn connect(&self, url: &str) -> StreamResult<()> {
        let url = normalize_url(url)?;
        let (ack, done) = oneshot::channel();
        self.send(Command::Connect { url, ack })?;
        done.await.map_err(|_| closed())
    }

    /// Close the connection without reconnecting and blank the pipeline
    pub async fn close(&self) -> StreamResult<()> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Close { ack })?;
        done.await.map_err(|_| closed())
    }

    /// Set playback volume in `0.0..=1.0`
    pub fn set_volume(&self, volume: f32) -> StreamResult<()> {
        self.send(Command::SetVolume(volume))
    }

    /// Current counters and state
    pub async fn stats(&self) -> StreamResult<StreamStats> {
        let (reply, stats) = oneshot::channel();
        self.send(Command::Stats(reply))?;
        stats.await.map_err(|_| closed())
    }

    /// Receive pipeline events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Stop the driver task and release everything it owns
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn send(&self, command: Command) -> StreamResult<()> {
        self.commands.send(command).map_err(|_| closed())
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

fn closed() -> StreamError {
    StreamError::Transport(WsMediaError::PipelineClosed)
}

struct Driver {
    manager: ConnectionManager,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    router: TrackRouter,
    ready: watch::Receiver<bool>,
    /// Last value reported through `ReadyStateChanged`
    last_ready: bool,
    commands: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<PipelineEvent>,
    last_state: ConnectionState,
}

impl Driver {
    async fn run(mut self) {
        debug!("Pipeline driver started");
        loop {
            let deadline = self.manager.reconnect_deadline();
            let reconnect_due = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command).await,
                },
                Some(event) = self.transport_events.recv() => {
                    self.on_transport_event(event).await;
                }
                output = self.router.next_output() => {
                    if let Some(FrameDisposition::Drop { pending }) =
                        self.router.handle_output(output).await
                    {
                        self.emit(PipelineEvent::FrameDropped { pending });
                    }
                }
                changed = self.ready.changed() => {
                    if changed.is_ok() {
                        let loaded = *self.ready.borrow_and_update();
                        self.publish_ready(loaded);
                    }
                }
                _ = reconnect_due => {
                    if let Some(url) = self.manager.take_due_reconnect(Instant::now()) {
                        info!(%url, attempt = self.manager.reconnect_attempts(), "Reconnecting");
                        self.router.reset().await;
                        self.manager.connect(url);
                    }
                }
            }

            self.publish_state();
        }

        self.manager.close();
        self.router.close().await;
        self.publish_state();
        debug!("Pipeline driver stopped");
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect { url, ack } => {
                self.router.reset().await;
                self.manager.connect(url);
                self.publish_state();
                let _ = ack.send(());
            }
            Command::Close { ack } => {
                self.manager.close();
                self.router.reset().await;
                info!("Stream closed");
                self.publish_state();
                let _ = ack.send(());
            }
            Command::SetVolume(volume) => self.router.set_volume(volume),
            Command::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            Command::Shutdown => {}
        }
    }

    async fn on_transport_event(&mut self, event: TransportEvent) {
        match self.manager.handle_event(event) {
            ConnectionUpdate::Message(message) => {
                self.router.on_message(message).await;
            }
            ConnectionUpdate::Lost { reconnect_in, .. } => {
                self.publish_state();
                self.emit(PipelineEvent::ReconnectScheduled {
                    delay: reconnect_in,
                });
            }
            ConnectionUpdate::Opened | ConnectionUpdate::Ignored => {}
        }
    }

    fn stats(&self) -> StreamStats {
        let video = self.router.video();
        StreamStats {
            connection: self.manager.state(),
            url: self.manager.url().map(Url::to_string),
            reconnect_attempts: self.manager.reconnect_attempts(),
            ready: video.is_ready(),
            render_backend: video.render_backend(),
            video: video.stats().clone(),
            audio: self.router.audio().map(|audio| audio.stats().clone()),
        }
    }

    fn publish_state(&mut self) {
        let state = self.manager.state();
        if state != self.last_state {
            self.last_state = state;
            self.emit(PipelineEvent::ConnectionStateChanged { state });
        }
    }

    fn publish_ready(&mut self, loaded: bool) {
        if loaded != self.last_ready {
            self.last_ready = loaded;
            self.emit(PipelineEvent::ReadyStateChanged { loaded });
        }
    }

    fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
