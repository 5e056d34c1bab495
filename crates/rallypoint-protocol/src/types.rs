//! Identity types shared by every layer.
//!
//! These are "newtype wrappers": a `RoomId` and a `CommandId` are both
//! `i64` underneath, but the compiler will not let one stand in for the
//! other. `#[serde(transparent)]` keeps the wire form a plain value, so
//! `MemberId("Alpha@Tonberry")` travels as `"Alpha@Tonberry"`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// MemberId
// ---------------------------------------------------------------------------

/// The identity of a game-client instance (a character, usually).
///
/// Identities are issued by the external whitelist layer; Rallypoint
/// treats them as opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub String);

impl MemberId {
    /// Creates a member id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the raw identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for an empty or whitespace-only identity.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// RoomId / CommandId
// ---------------------------------------------------------------------------

/// Row identifier of a room in the room store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub i64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

/// Row identifier of a dispatched command in the command log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub i64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RoomCode
// ---------------------------------------------------------------------------

/// The short, human-typable code players use to join a room.
///
/// Always [`RoomCode::LEN`] symbols drawn from [`RoomCode::ALPHABET`],
/// which leaves out `I`, `O`, `0` and `1` so a code read aloud over voice
/// chat can't be mistyped. Parsing is case-insensitive; the stored form is
/// upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Number of symbols in a join code.
    pub const LEN: usize = 6;

    /// The 32 symbols a join code may contain.
    pub const ALPHABET: &'static [u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

    /// Parses and normalizes a user-supplied code.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Invalid`] if the code has the wrong length
    /// or contains a symbol outside the alphabet.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let code = raw.trim().to_ascii_uppercase();
        if code.len() != Self::LEN {
            return Err(ProtocolError::Invalid(format!(
                "room code must be {} characters, got {}",
                Self::LEN,
                code.len()
            )));
        }
        if let Some(bad) = code.bytes().find(|b| !Self::ALPHABET.contains(b)) {
            return Err(ProtocolError::Invalid(format!(
                "room code contains invalid symbol `{}`",
                bad as char
            )));
        }
        Ok(Self(code))
    }

    /// Builds a code from alphabet indices. Each index is taken modulo 32.
    pub fn from_indices(indices: [usize; Self::LEN]) -> Self {
        let code = indices
            .iter()
            .map(|i| Self::ALPHABET[i % Self::ALPHABET.len()] as char)
            .collect();
        Self(code)
    }

    /// Borrows the normalized code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomCode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable reason carried by an `error` event.
///
/// Clients switch on this; the accompanying message is for humans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// A field was missing or malformed.
    Validation,
    /// The authorization predicate rejected the caller.
    Unauthorized,
    /// The caller's role does not allow the operation.
    PermissionDenied,
    /// The operation needs a joined room and the connection has none.
    NotJoined,
    RoomNotFound,
    RoomClosed,
    RoomFull,
    /// The referenced member is not part of the room.
    NotMember,
    /// Target resolution found no live recipient.
    NoReachableTargets,
    DuplicateActiveRoom,
    /// Only the room's controller may do this.
    NotController,
    CannotRemoveHost,
    HostRoleImmutable,
    /// A newer connection for the same identity replaced this one.
    Superseded,
    /// Persistence or another infrastructure dependency failed.
    Internal,
}
