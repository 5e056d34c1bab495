use std::io;
use std::net::SocketAddr;

use crate::ConnectionId;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("could not listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The listener itself failed. Individual bad clients never produce this.
    #[error("listener accept failed: {0}")]
    Accept(#[source] io::Error),

    #[error("handshake with {peer} failed: {reason}")]
    Handshake { peer: SocketAddr, reason: String },

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Reading or writing a frame on an established connection failed.
    #[error("{conn}: frame i/o failed: {reason}")]
    Frame { conn: ConnectionId, reason: String },
}
