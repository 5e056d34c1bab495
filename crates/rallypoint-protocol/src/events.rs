//! Real-time event vocabulary exchanged over the persistent transport.
//!
//! Both directions use internally tagged JSON with kebab-case tags, so a
//! join request looks like:
//!
//! ```text
//! { "type": "join-room", "room_code": "K7PQ2M", "member_id": "Alpha@Tonberry" }
//! ```
//!
//! Every frame is wrapped in an [`Envelope`] carrying a per-connection
//! sequence number and a server-relative timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    CommandId, CommandKind, CommandStatus, ErrorCode, Member, MemberId, Params, Room,
    RoomCode,
};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The top-level frame. Every message on the wire is an `Envelope`.
///
/// `seq` and `timestamp` default to 0 so scripted clients may omit them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<P> {
    /// Per-sender sequence number.
    #[serde(default)]
    pub seq: u64,

    /// Milliseconds since the sender's epoch (server start, for the relay).
    #[serde(default)]
    pub timestamp: u64,

    pub payload: P,
}

impl<P> Envelope<P> {
    pub fn new(seq: u64, timestamp: u64, payload: P) -> Self {
        Self {
            seq,
            timestamp,
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Events a game client sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Associate this connection with a room.
    JoinRoom {
        /// Raw join code as typed by the player; validated server-side.
        room_code: String,
        member_id: MemberId,
        /// Opaque credential handed to the authorization predicate.
        #[serde(default)]
        token: Option<String>,
        #[serde(default)]
        display_name: Option<String>,
        #[serde(default)]
        world: Option<String>,
    },

    /// Dispatch a command. Resolution order: `target`, then
    /// `role_pattern`, then broadcast.
    SendCommand {
        #[serde(default)]
        target: Option<MemberId>,
        #[serde(default)]
        role_pattern: Option<String>,
        kind: CommandKind,
        /// Normalized with [`normalize_params`](crate::normalize_params).
        #[serde(default)]
        params: serde_json::Value,
    },

    /// A recipient reports how a command went.
    CommandAck {
        command_id: CommandId,
        status: CommandStatus,
        #[serde(default)]
        error: Option<String>,
    },

    Heartbeat,

    /// Self-service job tag change. `null` or blank clears the tag.
    UpdateJobRole {
        #[serde(default)]
        job_tag: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Events the relay pushes to game clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Join confirmation, with the full member list.
    Joined {
        room: Room,
        member: Member,
        members: Vec<Member>,
    },

    MemberJoined { member: Member },

    /// A command pushed to a recipient.
    Command {
        command_id: CommandId,
        room_code: RoomCode,
        from: MemberId,
        kind: CommandKind,
        params: Params,
        issued_at: DateTime<Utc>,
    },

    /// Dispatch acknowledgment to the sender.
    CommandSent {
        command_id: CommandId,
        reachable: usize,
    },

    /// A recipient's acknowledgment, forwarded to the sender.
    CommandAck {
        command_id: CommandId,
        member_id: MemberId,
        status: CommandStatus,
        error: Option<String>,
    },

    MemberUpdated { member: Member },

    MemberLeft { member_id: MemberId },

    /// The room was closed (expiry or controller/admin action).
    RoomClosed { room_code: RoomCode, reason: String },

    Error { code: ErrorCode, message: String },
}

impl ServerEvent {
    /// Shorthand for an `error` event.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_room_json_shape() {
        let raw = json!({
            "type": "join-room",
            "room_code": "k7pq2m",
            "member_id": "Alpha@Tonberry",
            "display_name": "Alpha"
        });
        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        match event {
            ClientEvent::JoinRoom {
                room_code,
                member_id,
                token,
                display_name,
                world,
            } => {
                assert_eq!(room_code, "k7pq2m");
                assert_eq!(member_id, MemberId::new("Alpha@Tonberry"));
                assert_eq!(token, None);
                assert_eq!(display_name.as_deref(), Some("Alpha"));
                assert_eq!(world, None);
            }
            other => panic!("expected JoinRoom, got {other:?}"),
        }
    }

    #[test]
    fn test_send_command_defaults_optional_fields() {
        let raw = json!({"type": "send-command", "kind": "chat"});
        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(
            event,
            ClientEvent::SendCommand {
                target: None,
                role_pattern: None,
                kind: CommandKind::Chat,
                params: serde_json::Value::Null,
            }
        );
    }

    #[test]
    fn test_heartbeat_is_a_bare_tag() {
        let event: ClientEvent = serde_json::from_str(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(event, ClientEvent::Heartbeat);
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        let result: Result<ClientEvent, _> =
            serde_json::from_str(r#"{"type":"fly-to-moon"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_command_kind_is_rejected() {
        let result: Result<ClientEvent, _> =
            serde_json::from_str(r#"{"type":"send-command","kind":"dance"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_command_sent_json_shape() {
        let json = serde_json::to_value(ServerEvent::CommandSent {
            command_id: CommandId(7),
            reachable: 2,
        })
        .unwrap();
        assert_eq!(
            json,
            json!({"type": "command-sent", "command_id": 7, "reachable": 2})
        );
    }

    #[test]
    fn test_error_event_json_shape() {
        let json = serde_json::to_value(ServerEvent::error(
            ErrorCode::PermissionDenied,
            "members cannot dispatch",
        ))
        .unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "PermissionDenied");
    }

    #[test]
    fn test_envelope_defaults_seq_and_timestamp() {
        let raw = r#"{"payload": {"type": "heartbeat"}}"#;
        let env: Envelope<ClientEvent> = serde_json::from_str(raw).unwrap();
        assert_eq!(env.seq, 0);
        assert_eq!(env.timestamp, 0);
        assert_eq!(env.payload, ClientEvent::Heartbeat);
    }

    #[test]
    fn test_decode_garbage_returns_error() {
        let result: Result<Envelope<ClientEvent>, _> =
            serde_json::from_slice(b"not json at all");
        assert!(result.is_err());
    }
}
