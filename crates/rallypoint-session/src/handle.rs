//! The push side of a live connection.

use rallypoint_protocol::ServerEvent;
use rallypoint_transport::ConnectionId;
use tokio::sync::mpsc;

use crate::SessionError;

/// Something the relay wants a connection's handler to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Encode and write this event to the client.
    Event(ServerEvent),
    /// Flush, then close the transport.
    Close { reason: String },
}

/// Cheap, cloneable handle used to push events to one connection.
///
/// The connection's handler task owns the receiving end and writes to the
/// transport; pushing here never blocks the caller.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, sender: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { id, sender }
    }

    /// Creates a handle along with the receiver its handler drains.
    pub fn channel(id: ConnectionId) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(id, tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues an event for delivery.
    ///
    /// # Errors
    /// Returns [`SessionError::ConnectionGone`] if the handler has exited.
    pub fn push(&self, event: ServerEvent) -> Result<(), SessionError> {
        self.sender
            .send(Outbound::Event(event))
            .map_err(|_| SessionError::ConnectionGone(self.id))
    }

    /// Asks the handler to close the connection. Best effort.
    pub fn close(&self, reason: impl Into<String>) {
        let _ = self.sender.send(Outbound::Close {
            reason: reason.into(),
        });
    }

    /// `false` once the handler has dropped its receiver.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}
