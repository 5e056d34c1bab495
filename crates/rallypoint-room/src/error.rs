//! Error types for the room store.

use rallypoint_protocol::{MemberId, RoomCode, RoomId};

/// Errors that can occur in room store and command log operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The controller already owns an active room.
    #[error("{0} already controls an active room")]
    DuplicateActiveRoom(MemberId),

    /// Every sampled join code collided with an active room. Operational
    /// fault, not a user error.
    #[error("no free room code after {0} attempts")]
    CodeGenerationExhausted(u32),

    /// No room matches the given id or code.
    #[error("room {0} not found")]
    RoomNotFound(String),

    /// The room exists but is closed or past its expiry.
    #[error("room {0} is closed")]
    RoomClosed(RoomCode),

    /// The room has no free seat.
    #[error("room {code} is full ({max} members)")]
    RoomFull { code: RoomCode, max: u32 },

    /// The controller can only leave by closing the room.
    #[error("the host of room {0} cannot be removed")]
    CannotRemoveHost(RoomCode),

    /// The host role is never granted or taken away.
    #[error("the host role cannot be reassigned")]
    HostRoleImmutable,

    /// The caller is not the room's controller.
    #[error("{caller} is not the controller of room {code}")]
    NotController { caller: MemberId, code: RoomCode },

    /// The member is not part of the room.
    #[error("{member} is not a member of room {room}")]
    NotMember { member: MemberId, room: RoomId },

    /// A field was missing or out of range.
    #[error("invalid input: {0}")]
    Validation(String),

    /// SQLite failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Command parameters could not be encoded for storage.
    #[error("params encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}
