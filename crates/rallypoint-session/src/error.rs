//! Error types for the session layer.

use rallypoint_transport::ConnectionId;

/// Errors that can occur during session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The [`Authorizer`](crate::Authorizer) rejected the caller.
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// The connection's outbound channel is closed; its handler is gone.
    #[error("connection {0} is closed")]
    ConnectionGone(ConnectionId),
}
