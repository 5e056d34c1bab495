//! Unified error type for Rallypoint.

use rallypoint_protocol::{ErrorCode, ProtocolError};
use rallypoint_room::StoreError;
use rallypoint_session::SessionError;
use rallypoint_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` variants let `?` lift sub-crate errors; the rest are
/// relay-level refusals. [`code()`](Self::code) maps any of them to the
/// [`ErrorCode`] a client sees in an `error` event.
#[derive(Debug, thiserror::Error)]
pub enum RallyError {
    /// A transport-level error (connection, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid field).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (authorization, dead connection).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room store or command log error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The caller's role doesn't allow the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The connection hasn't joined a room yet.
    #[error("join a room first")]
    NotJoined,

    /// Target resolution found nobody live to deliver to.
    #[error("no reachable targets")]
    NoReachableTargets,

    #[error("invalid request: {0}")]
    Validation(String),

    /// Bad server configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A blocking store task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl RallyError {
    /// The wire code reported to clients.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Store(e) => match e {
                StoreError::DuplicateActiveRoom(_) => ErrorCode::DuplicateActiveRoom,
                StoreError::RoomNotFound(_) => ErrorCode::RoomNotFound,
                StoreError::RoomClosed(_) => ErrorCode::RoomClosed,
                StoreError::RoomFull { .. } => ErrorCode::RoomFull,
                StoreError::CannotRemoveHost(_) => ErrorCode::CannotRemoveHost,
                StoreError::HostRoleImmutable => ErrorCode::HostRoleImmutable,
                StoreError::NotController { .. } => ErrorCode::NotController,
                StoreError::NotMember { .. } => ErrorCode::NotMember,
                StoreError::Validation(_) => ErrorCode::Validation,
                StoreError::CodeGenerationExhausted(_)
                | StoreError::Database(_)
                | StoreError::Encoding(_) => ErrorCode::Internal,
            },
            Self::Session(e) => match e {
                SessionError::Unauthorized(_) => ErrorCode::Unauthorized,
                SessionError::ConnectionGone(_) => ErrorCode::Internal,
            },
            Self::Protocol(e) => match e {
                ProtocolError::Invalid(_) | ProtocolError::Decode(_) => ErrorCode::Validation,
                ProtocolError::Encode(_) => ErrorCode::Internal,
            },
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::NotJoined => ErrorCode::NotJoined,
            Self::NoReachableTargets => ErrorCode::NoReachableTargets,
            Self::Validation(_) => ErrorCode::Validation,
            Self::Transport(_) | Self::Config(_) | Self::Join(_) => ErrorCode::Internal,
        }
    }

    /// Infrastructure failures, as opposed to refusals the caller caused.
    pub fn is_internal(&self) -> bool {
        self.code() == ErrorCode::Internal
    }

    /// The message a client sees. Internal details stay in the logs.
    pub fn client_message(&self) -> String {
        if self.is_internal() {
            "internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rallypoint_protocol::{MemberId, RoomCode};

    #[test]
    fn test_from_transport_error() {
        let err: RallyError = TransportError::ConnectionClosed("gone".into()).into();
        assert!(matches!(err, RallyError::Transport(_)));
        assert!(err.to_string().contains("gone"));
        assert_eq!(err.code(), ErrorCode::Internal);
    }

    #[test]
    fn test_from_protocol_error_is_validation() {
        let err: RallyError = ProtocolError::Invalid("bad code".into()).into();
        assert_eq!(err.code(), ErrorCode::Validation);
    }

    #[test]
    fn test_from_session_error_unauthorized() {
        let err: RallyError = SessionError::Unauthorized("nope".into()).into();
        assert_eq!(err.code(), ErrorCode::Unauthorized);
        assert!(!err.is_internal());
    }

    #[test]
    fn test_store_errors_map_one_to_one() {
        let code = RoomCode::parse("ABCDEF").unwrap();
        let full: RallyError = StoreError::RoomFull { code, max: 2 }.into();
        assert_eq!(full.code(), ErrorCode::RoomFull);

        let dup: RallyError = StoreError::DuplicateActiveRoom(MemberId::new("h")).into();
        assert_eq!(dup.code(), ErrorCode::DuplicateActiveRoom);
    }

    #[test]
    fn test_code_exhaustion_is_internal_and_hidden() {
        let err: RallyError = StoreError::CodeGenerationExhausted(16).into();
        assert!(err.is_internal());
        assert_eq!(err.client_message(), "internal server error");
    }

    #[test]
    fn test_relay_refusals_keep_their_message() {
        let err = RallyError::PermissionDenied("Member cannot dispatch commands".into());
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
        assert!(err.client_message().contains("cannot dispatch"));
    }
}
