//! The room/member/command data model.
//!
//! These records are what the room store persists and what the relay
//! embeds in events, so they live here where both sides can see them.
//! Every enum has an `as_str`/`FromStr` pair used as its storage form.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CommandId, MemberId, ParseEnumError, RoomCode, RoomId};

/// Structured key/value parameters attached to a command.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Normalizes whatever a client sent as command parameters.
///
/// Objects pass through. A string holding a JSON object is unpacked.
/// Anything else (null, numbers, arrays, garbage strings) becomes an
/// empty object; a bad payload is never a reason to reject a command.
pub fn normalize_params(value: serde_json::Value) -> Params {
    match value {
        serde_json::Value::Object(map) => map,
        serde_json::Value::String(raw) => {
            match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(serde_json::Value::Object(map)) => map,
                _ => Params::new(),
            }
        }
        _ => Params::new(),
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Permission role of a member within a room.
///
/// Exactly one `Host` per room: the controller who created it. The host
/// role is never granted or taken away after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Host,
    Leader,
    Member,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Host => "Host",
            Self::Leader => "Leader",
            Self::Member => "Member",
        }
    }

    /// Whether this role may dispatch commands.
    pub fn can_dispatch(self) -> bool {
        matches!(self, Self::Host | Self::Leader)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Host" => Ok(Self::Host),
            "Leader" => Ok(Self::Leader),
            "Member" => Ok(Self::Member),
            other => Err(ParseEnumError::new("role", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// RoomStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Active,
    Closed,
}

impl RoomStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

impl FromStr for RoomStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            other => Err(ParseEnumError::new("room status", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// CommandStatus / CommandKind
// ---------------------------------------------------------------------------

/// Delivery status of a command log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Sent,
    Failed,
}

impl CommandStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            other => Err(ParseEnumError::new("command status", other)),
        }
    }
}

/// The fixed vocabulary of commands a controller can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandKind {
    Move,
    Jump,
    SetPosition,
    SlideTeleport,
    LockPosition,
    Chat,
    Echo,
    Stop,
}

impl CommandKind {
    pub const ALL: [CommandKind; 8] = [
        Self::Move,
        Self::Jump,
        Self::SetPosition,
        Self::SlideTeleport,
        Self::LockPosition,
        Self::Chat,
        Self::Echo,
        Self::Stop,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Jump => "jump",
            Self::SetPosition => "set-position",
            Self::SlideTeleport => "slide-teleport",
            Self::LockPosition => "lock-position",
            Self::Chat => "chat",
            Self::Echo => "echo",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("command kind", s))
    }
}

// ---------------------------------------------------------------------------
// JobTag
// ---------------------------------------------------------------------------

/// A member's party function (tank, healer, damage slots).
///
/// The known tags form a closed set; `Other` keeps tags this build does
/// not know about so newer clients don't break older relays. Tags compare
/// case-insensitively and are stored upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum JobTag {
    MT,
    ST,
    H1,
    H2,
    D1,
    D2,
    D3,
    D4,
    Other(String),
}

impl JobTag {
    pub const KNOWN: [JobTag; 8] = [
        Self::MT,
        Self::ST,
        Self::H1,
        Self::H2,
        Self::D1,
        Self::D2,
        Self::D3,
        Self::D4,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::MT => "MT",
            Self::ST => "ST",
            Self::H1 => "H1",
            Self::H2 => "H2",
            Self::D1 => "D1",
            Self::D2 => "D2",
            Self::D3 => "D3",
            Self::D4 => "D4",
            Self::Other(tag) => tag,
        }
    }

    /// Parses an optional raw tag. Blank input means "no tag".
    pub fn parse_optional(raw: Option<&str>) -> Option<JobTag> {
        raw.and_then(|s| s.parse().ok())
    }
}

impl fmt::Display for JobTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobTag {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        if upper.is_empty() {
            return Err(ParseEnumError::new("job tag", s));
        }
        Ok(Self::KNOWN
            .into_iter()
            .find(|t| t.as_str() == upper)
            .unwrap_or(Self::Other(upper)))
    }
}

impl TryFrom<String> for JobTag {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<JobTag> for String {
    fn from(tag: JobTag) -> Self {
        tag.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// Who a command was addressed to, as requested by the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum Target {
    /// Every live member except the sender.
    All,
    /// One specific member.
    Member(MemberId),
    /// Live members whose job tag matches a `|`-separated pattern.
    Pattern(String),
}

impl Target {
    /// Storage discriminator.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Member(_) => "member",
            Self::Pattern(_) => "pattern",
        }
    }

    /// Storage value (member id or pattern text).
    pub fn value_str(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Member(id) => Some(id.as_str()),
            Self::Pattern(p) => Some(p),
        }
    }

    /// Rebuilds a target from its storage columns.
    pub fn from_parts(kind: &str, value: Option<String>) -> Result<Self, ParseEnumError> {
        match (kind, value) {
            ("all", _) => Ok(Self::All),
            ("member", Some(id)) => Ok(Self::Member(MemberId(id))),
            ("pattern", Some(p)) => Ok(Self::Pattern(p)),
            (other, _) => Err(ParseEnumError::new("target", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A room: one ad-hoc group with a controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub code: RoomCode,
    pub controller_id: MemberId,
    pub name: Option<String>,
    pub max_members: u32,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// End of the public discovery window, if the room was ever published.
    pub published_until: Option<DateTime<Utc>>,
}

impl Room {
    /// Active and not yet past its absolute expiry.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.status == RoomStatus::Active && self.expires_at > now
    }
}

/// A member of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub room_id: RoomId,
    pub member_id: MemberId,
    pub display_name: Option<String>,
    /// Origin-world label shown next to the name.
    pub world: Option<String>,
    pub role: Role,
    pub job_tag: Option<JobTag>,
    pub online: bool,
    pub joined_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

/// Display information a member supplies when joining.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub display_name: Option<String>,
    pub world: Option<String>,
}

/// A room together with its member list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomDetails {
    pub room: Room,
    pub members: Vec<Member>,
}

/// One row of the public discovery listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicRoom {
    pub room: Room,
    pub controller_name: Option<String>,
    pub member_count: u32,
}

/// One dispatched command and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: CommandId,
    pub room_id: RoomId,
    pub sender_id: MemberId,
    pub target: Target,
    pub kind: CommandKind,
    pub params: Params,
    pub status: CommandStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

/// A command log row joined with human-readable labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub record: CommandRecord,
    pub sender_name: Option<String>,
    pub target_label: String,
}
