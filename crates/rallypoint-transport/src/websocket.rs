//! WebSocket listener over `tokio-tungstenite`.
//!
//! Frames go out as text when they are valid UTF-8 (the relay speaks JSON)
//! and as binary otherwise. Either kind is accepted inbound. Each socket is
//! split so the write half has its own lock and never waits on a reader.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::{Connection, ConnectionId, Transport, TransportError};

/// How long a freshly accepted socket gets to finish the upgrade.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type Socket = WebSocketStream<TcpStream>;

pub struct WebSocketTransport {
    listener: TcpListener,
    handshake_timeout: Duration,
    next_id: u64,
}

impl WebSocketTransport {
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        tracing::info!(addr, "listening for relay clients");
        Ok(Self {
            listener,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            next_id: 0,
        })
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    async fn upgrade(
        &mut self,
        tcp: TcpStream,
        peer: SocketAddr,
    ) -> Result<WebSocketConnection, TransportError> {
        let limit = self.handshake_timeout;
        let ws = tokio::time::timeout(limit, tokio_tungstenite::accept_async(tcp))
            .await
            .map_err(|_| TransportError::Handshake {
                peer,
                reason: format!("no upgrade within {limit:?}"),
            })?
            .map_err(|e| TransportError::Handshake {
                peer,
                reason: e.to_string(),
            })?;

        self.next_id += 1;
        let (sink, stream) = ws.split();
        Ok(WebSocketConnection {
            id: ConnectionId::new(self.next_id),
            peer,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<WebSocketConnection, TransportError> {
        loop {
            let (tcp, peer) = self.listener.accept().await.map_err(TransportError::Accept)?;
            match self.upgrade(tcp, peer).await {
                Ok(conn) => {
                    tracing::debug!(conn_id = %conn.id, %peer, "client connected");
                    return Ok(conn);
                }
                Err(e) => tracing::warn!(error = %e, "dropping client"),
            }
        }
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

pub struct WebSocketConnection {
    id: ConnectionId,
    peer: SocketAddr,
    sink: Mutex<SplitSink<Socket, Message>>,
    stream: Mutex<SplitStream<Socket>>,
}

impl WebSocketConnection {
    fn frame_error(&self, e: impl std::fmt::Display) -> TransportError {
        TransportError::Frame {
            conn: self.id,
            reason: e.to_string(),
        }
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        let msg = match std::str::from_utf8(frame) {
            Ok(text) => Message::text(text.to_owned()),
            Err(_) => Message::binary(frame.to_vec()),
        };
        self.sink
            .lock()
            .await
            .send(msg)
            .await
            .map_err(|e| self.frame_error(e))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut stream = self.stream.lock().await;
        while let Some(msg) = stream.next().await {
            match msg.map_err(|e| self.frame_error(e))? {
                Message::Text(text) => return Ok(Some(text.as_str().as_bytes().to_vec())),
                Message::Binary(data) => return Ok(Some(data.to_vec())),
                Message::Close(_) => return Ok(None),
                // tungstenite answers pings itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(None)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| TransportError::ConnectionClosed(format!("{}: {e}", self.id)))
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}
