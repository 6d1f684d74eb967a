//! WebSocket transport with automatic reconnection
//!
//! [`ConnectionManager`] owns at most one live connection. Each connection runs
//! in its own reader task and reports back over an mpsc channel tagged with a
//! generation number, so events from a connection that has since been replaced
//! or intentionally closed are recognised and dropped. Reconnection is a single
//! optional deadline rather than a timer task: an unexpected close sets it, and
//! `connect`/`close` clear it, so at most one reconnect is ever pending.

use crate::error::{WsMediaError, WsMediaResult};
use crate::protocol::InboundMessage;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use tungstenite::Message;
use url::Url;

/// Delay between an unexpected close and the reconnect attempt
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Delay before reconnecting after an unexpected close
    pub reconnect_delay: Duration,
    /// Timeout for the WebSocket handshake
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl TransportConfig {
    /// Configuration for local, low-latency deployments
    pub fn low_latency() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(250),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection and no attempt in flight
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Connection established
    Connected,
}

/// Normalise a stream URL: `http` becomes `ws` and `https` becomes `wss`.
pub fn normalize_url(raw: &str) -> WsMediaResult<Url> {
    let mut url = Url::parse(raw).map_err(|e| WsMediaError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(WsMediaError::InvalidUrl {
                url: raw.to_string(),
                reason: format!("unsupported scheme '{}'", other),
            })
        }
    };

    if url.scheme() != scheme {
        url.set_scheme(scheme).map_err(|_| WsMediaError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("cannot rewrite scheme to '{}'", scheme),
        })?;
    }

    Ok(url)
}

/// Trait for transport implementations
#[async_trait]
pub trait Transport: Send {
    /// Receive the next message; `Ok(None)` means the peer closed the connection
    async fn recv(&mut self) -> WsMediaResult<Option<InboundMessage>>;

    /// Close the transport
    async fn close(&mut self) -> WsMediaResult<()>;
}

/// Opens transports for a URL
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new transport
    async fn open(&self, url: &Url) -> WsMediaResult<Box<dyn Transport>>;
}

/// WebSocket transport wrapper
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    endpoint: String,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn recv(&mut self) -> WsMediaResult<Option<InboundMessage>> {
        loop {
            match self.stream.next().await {
                None => return Ok(None),
                Some(Err(e)) => {
                    return Err(WsMediaError::Transport {
                        reason: format!("WebSocket receive failed: {}", e),
                    })
                }
                Some(Ok(Message::Text(text))) => return Ok(Some(InboundMessage::Text(text))),
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(InboundMessage::Binary(Bytes::from(data))))
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(endpoint = %self.endpoint, ?frame, "WebSocket closed by peer");
                    return Ok(None);
                }
                // Ping, pong and raw frames carry nothing for the pipeline
                Some(Ok(_)) => continue,
            }
        }
    }

    async fn close(&mut self) -> WsMediaResult<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| WsMediaError::Transport {
                reason: format!("WebSocket close failed: {}", e),
            })
    }
}

/// Connector producing [`WebSocketTransport`]s
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl WebSocketConnector {
    /// Create a connector with the given handshake timeout
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(TransportConfig::default().connect_timeout)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &Url) -> WsMediaResult<Box<dyn Transport>> {
        let (stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| WsMediaError::Timeout {
                operation: format!("WebSocket connect to {}", url),
                duration: self.connect_timeout,
            })?
            .map_err(|e| WsMediaError::Transport {
                reason: format!("WebSocket connection failed: {}", e),
            })?;

        debug!(%url, "WebSocket connection established");

        Ok(Box::new(WebSocketTransport {
            stream,
            endpoint: url.to_string(),
        }))
    }
}

/// Event reported by a connection's reader task
#[derive(Debug)]
pub enum TransportEvent {
    /// The connection opened
    Opened {
        /// Connection generation
        generation: u64,
    },
    /// A message arrived
    Message {
        /// Connection generation
        generation: u64,
        /// Received message
        message: InboundMessage,
    },
    /// The connection closed or failed to open
    Closed {
        /// Connection generation
        generation: u64,
        /// Failure reason, if any
        reason: Option<String>,
    },
}

impl TransportEvent {
    /// Generation of the connection that produced this event
    pub fn generation(&self) -> u64 {
        match self {
            TransportEvent::Opened { generation }
            | TransportEvent::Message { generation, .. }
            | TransportEvent::Closed { generation, .. } => *generation,
        }
    }
}

/// Result of applying a [`TransportEvent`] to the manager
#[derive(Debug, PartialEq)]
pub enum ConnectionUpdate {
    /// The current connection opened
    Opened,
    /// A message for the pipeline
    Message(InboundMessage),
    /// The current connection closed unexpectedly and a reconnect is scheduled
    Lost {
        /// Failure reason, if any
        reason: Option<String>,
        /// Delay until the reconnect attempt
        reconnect_in: Duration,
    },
    /// The event belonged to a stale connection
    Ignored,
}

struct Session {
    generation: u64,
    shutdown: Option<oneshot::Sender<()>>,
    _task: JoinHandle<()>,
}

/// Owns the current connection and its reconnection deadline
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    config: TransportConfig,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    state: ConnectionState,
    url: Option<Url>,
    generation: u64,
    session: Option<Session>,
    reconnect_at: Option<Instant>,
    reconnect_attempts: u64,
}

impl ConnectionManager {
    /// Create a manager; the returned receiver yields events for [`Self::handle_event`]
    pub fn new(
        connector: Arc<dyn Connector>,
        config: TransportConfig,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                connector,
                config,
                events_tx,
                state: ConnectionState::Disconnected,
                url: None,
                generation: 0,
                session: None,
                reconnect_at: None,
                reconnect_attempts: 0,
            },
            events_rx,
        )
    }

    /// Open a connection to `url`, tearing down any existing one first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&mut self, url: Url) {
        self.close();

        self.generation += 1;
        let generation = self.generation;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_session(
            self.connector.clone(),
            url.clone(),
            generation,
            self.events_tx.clone(),
            shutdown_rx,
        ));

        info!(%url, generation, "Connecting to stream");
        self.url = Some(url);
        self.state = ConnectionState::Connecting;
        self.session = Some(Session {
            generation,
            shutdown: Some(shutdown_tx),
            _task: task,
        });
    }

    /// Close the current connection and cancel any pending reconnect
    pub fn close(&mut self) {
        self.reconnect_at = None;
        if let Some(mut session) = self.session.take() {
            if let Some(shutdown) = session.shutdown.take() {
                let _ = shutdown.send(());
            }
            debug!(generation = session.generation, "Connection closed intentionally");
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Apply an event from a reader task
    pub fn handle_event(&mut self, event: TransportEvent) -> ConnectionUpdate {
        let current = self.session.as_ref().map(|session| session.generation);
        if current != Some(event.generation()) {
            debug!(
                generation = event.generation(),
                "Ignoring event from stale connection"
            );
            return ConnectionUpdate::Ignored;
        }

        match event {
            TransportEvent::Opened { .. } => {
                self.state = ConnectionState::Connected;
                self.reconnect_at = None;
                info!("Stream connection opened");
                ConnectionUpdate::Opened
            }
            TransportEvent::Message { message, .. } => ConnectionUpdate::Message(message),
            TransportEvent::Closed { reason, .. } => {
                self.session = None;
                self.state = ConnectionState::Disconnected;
                let delay = self.config.reconnect_delay;
                self.reconnect_at = Some(Instant::now() + delay);
                warn!(?reason, ?delay, "Stream connection lost, scheduling reconnect");
                ConnectionUpdate::Lost {
                    reason,
                    reconnect_in: delay,
                }
            }
        }
    }

    /// When the pending reconnect is due, if one is pending
    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Consume the pending reconnect if it is due at `now`, returning the URL to reopen
    pub fn take_due_reconnect(&mut self, now: Instant) -> Option<Url> {
        match self.reconnect_at {
            Some(deadline) if deadline <= now => {
                self.reconnect_at = None;
                self.reconnect_attempts += 1;
                self.url.clone()
            }
            _ => None,
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Last URL passed to [`Self::connect`]
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Number of reconnects performed so far
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts
    }

    /// Transport configuration
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_session(
    connector: Arc<dyn Connector>,
    url: Url,
    generation: u64,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let opened = tokio::select! {
        _ = &mut shutdown => return,
        result = connector.open(&url) => result,
    };

    let mut transport = match opened {
        Ok(transport) => transport,
        Err(e) => {
            warn!(%url, "Connection attempt failed: {}", e);
            let _ = events.send(TransportEvent::Closed {
                generation,
                reason: Some(e.to_string()),
            });
            return;
        }
    };

    if events.send(TransportEvent::Opened { generation }).is_err() {
        let _ = transport.close().await;
        return;
    }

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                if let Err(e) = transport.close().await {
                    debug!("Error closing transport: {}", e);
                }
                return;
            }
            received = transport.recv() => match received {
                Ok(Some(message)) => {
                    if events.send(TransportEvent::Message { generation, message }).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    let _ = events.send(TransportEvent::Closed { generation, reason: None });
                    return;
                }
                Err(e) => {
                    let _ = events.send(TransportEvent::Closed {
                        generation,
                        reason: Some(e.to_string()),
                    });
                    return;
                }
            }
        }
    }

    let _ = transport.close().await;
}
