//! WebSocket fan-out server
//!
//! Every subscriber gets each published unit as a text frame carrying the
//! track metadata immediately followed by a binary frame carrying the
//! payload. Units go through one broadcast channel; a subscriber that falls
//! behind skips whole units, so the text/binary pairing is never broken.

use crate::packetizer::AccessUnit;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use uuid::Uuid;
use wsmedia_core::{TrackMetadata, WsMediaError, WsMediaResult};

/// Default per-server unit buffer
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Relay server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Address to listen on; port 0 picks a free port
    pub bind_addr: SocketAddr,
    /// Units buffered per subscriber before it starts skipping
    pub channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 8080),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl RelayConfig {
    /// Loopback on an ephemeral port
    pub fn local() -> Self {
        Self {
            bind_addr: SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0),
            ..Default::default()
        }
    }
}

/// A connected subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Connection id
    pub id: Uuid,
    /// Remote address
    pub peer_addr: SocketAddr,
    /// When the handshake completed
    pub connected_at: DateTime<Utc>,
}

#[derive(Clone)]
struct RelayFrame {
    metadata: Arc<str>,
    payload: Bytes,
}

struct RelayInner {
    local_addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    clients: DashMap<Uuid, ClientInfo>,
    frames: broadcast::Sender<RelayFrame>,
    shutdown: watch::Sender<bool>,
}

/// Publishes media units to every connected WebSocket client
#[derive(Clone)]
pub struct RelayServer {
    inner: Arc<RelayInner>,
}

impl std::fmt::Debug for RelayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayServer")
            .field("local_addr", &self.inner.local_addr)
            .field("clients", &self.inner.clients.len())
            .finish()
    }
}

impl RelayServer {
    /// Bind the listening socket
    pub async fn bind(config: RelayConfig) -> WsMediaResult<Self> {
        let listener = TcpListener::bind(config.bind_addr).await.map_err(|e| {
            WsMediaError::ServerStartFailed {
                address: config.bind_addr,
                source: e.into(),
            }
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| WsMediaError::ServerStartFailed {
                address: config.bind_addr,
                source: e.into(),
            })?;

        let (frames, _) = broadcast::channel(config.channel_capacity.max(1));
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(RelayInner {
                local_addr,
                listener: Mutex::new(Some(listener)),
                clients: DashMap::new(),
                frames,
                shutdown,
            }),
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// WebSocket URL subscribers connect to
    pub fn url(&self) -> String {
        format!("ws://{}", self.inner.local_addr)
    }

    /// Accept clients until [`Self::shutdown`]
    pub async fn serve(&self) -> WsMediaResult<()> {
        let listener = self
            .inner
            .listener
            .lock()
            .take()
            .ok_or_else(|| WsMediaError::InvalidState {
                expected: "bound listener".to_string(),
                actual: "already serving".to_string(),
            })?;
        let mut shutdown = self.inner.shutdown.subscribe();

        tracing::info!("Relay server listening on {}", self.inner.local_addr);

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => {}
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        tracing::debug!("New connection from {}", addr);
                        let inner = self.inner.clone();
                        tokio::spawn(async move {
                            handle_connection(inner, stream, addr).await;
                        });
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept connection: {}", e);
                    }
                },
            }
        }

        tracing::info!("Relay server stopped");
        Ok(())
    }

    /// Send one unit to every subscriber; returns how many will receive it
    pub fn publish(&self, metadata: &TrackMetadata, payload: Bytes) -> WsMediaResult<usize> {
        let frame = RelayFrame {
            metadata: Arc::from(metadata.to_json()?),
            payload,
        };
        match self.inner.frames.send(frame) {
            Ok(receivers) => Ok(receivers),
            Err(_) => {
                tracing::trace!("No subscribers, unit discarded");
                Ok(0)
            }
        }
    }

    /// Publish a packetized access unit
    pub fn publish_unit(&self, unit: &AccessUnit) -> WsMediaResult<usize> {
        self.publish(&unit.metadata, unit.payload.clone())
    }

    /// Connected subscribers
    pub fn connection_count(&self) -> usize {
        self.inner.clients.len()
    }

    /// Snapshot of connected subscribers
    pub fn clients(&self) -> Vec<ClientInfo> {
        self.inner
            .clients
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Stop accepting and close every subscriber
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
    }
}

async fn handle_connection(inner: Arc<RelayInner>, stream: TcpStream, addr: SocketAddr) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::error!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let id = Uuid::new_v4();
    // Subscribe before registering so a visible client never misses a unit
    let mut frames = inner.frames.subscribe();
    let mut shutdown = inner.shutdown.subscribe();
    inner.clients.insert(
        id,
        ClientInfo {
            id,
            peer_addr: addr,
            connected_at: Utc::now(),
        },
    );
    tracing::info!("Subscriber {} connected from {}", id, addr);

    let (mut sink, mut incoming) = ws_stream.split();
    loop {
        if *shutdown.borrow_and_update() {
            let _ = sink.send(Message::Close(None)).await;
            break;
        }
        tokio::select! {
            _ = shutdown.changed() => {}
            frame = frames.recv() => match frame {
                Ok(frame) => {
                    let sent = async {
                        sink.send(Message::Text(frame.metadata.to_string())).await?;
                        sink.send(Message::Binary(frame.payload.to_vec())).await
                    }
                    .await;
                    if let Err(e) = sent {
                        tracing::debug!("Subscriber {} send failed: {}", id, e);
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Subscriber {} lagging, skipped {} units", id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            message = incoming.next() => match message {
                Some(Ok(Message::Close(_))) | None => {
                    tracing::debug!("Subscriber {} closed", id);
                    break;
                }
                Some(Err(e)) => {
                    tracing::warn!("WebSocket error on subscriber {}: {}", id, e);
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    inner.clients.remove(&id);
    tracing::info!("Subscriber {} disconnected", id);
}
