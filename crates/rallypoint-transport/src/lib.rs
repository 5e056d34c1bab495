//! Connection plumbing for the Rallypoint relay.
//!
//! Game clients hold one long-lived socket to the relay. This crate owns
//! accepting those sockets and moving whole frames over them; it knows
//! nothing about rooms or events. Everything above it sees a
//! [`Connection`] that yields and takes byte frames.
//!
//! Cargo feature `websocket` (on by default) provides
//! [`WebSocketTransport`] over `tokio-tungstenite`.

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{HANDSHAKE_TIMEOUT, WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::net::SocketAddr;

/// Identifies one accepted connection for as long as its listener lives.
///
/// The session registry keys its reverse index on this, so two live
/// connections never share an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A listener handing out established connections.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Next connection that completed its handshake. Clients that fail the
    /// handshake are logged and skipped, so an error here means the
    /// listener is broken.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

/// One client socket carrying whole frames.
///
/// `recv` and `send` take `&self` and don't contend: the handler parks in
/// `recv` while events pushed by other members go out through `send`.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    async fn send(&self, frame: &[u8]) -> Result<(), Self::Error>;

    /// `Ok(None)` once the client has closed its side.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    async fn close(&self) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;

    fn peer_addr(&self) -> SocketAddr;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display_has_conn_prefix() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
        assert_eq!(ConnectionId::new(7).into_inner(), 7);
    }

    #[test]
    fn test_transport_error_frame_names_connection() {
        let err = TransportError::Frame {
            conn: ConnectionId::new(3),
            reason: "reset by peer".into(),
        };
        assert_eq!(err.to_string(), "conn-3: frame i/o failed: reset by peer");
    }
}
