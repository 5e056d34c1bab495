//! Shared fixtures: an in-memory relay on a manual clock, and channel-backed
//! clients that stand in for WebSocket connections.

#![allow(dead_code)]

use std::sync::Arc;

use rallypoint::prelude::*;
use rallypoint::room::{CommandLog, Database, RoomStore};
use rallypoint::session::{ConnectionHandle, Outbound};
use rallypoint_transport::ConnectionId;
use tokio::sync::mpsc::UnboundedReceiver;

pub struct Harness<A: Authorizer = AllowAll> {
    pub relay: Arc<Relay<A>>,
    pub service: RoomService<A>,
    pub clock: Arc<ManualClock>,
    next_conn: u64,
}

pub fn harness() -> Harness {
    harness_with(AllowAll)
}

pub fn harness_with<A: Authorizer>(auth: A) -> Harness<A> {
    let clock = Arc::new(ManualClock::default());
    let db = Arc::new(Database::in_memory(clock.clone()).unwrap());
    let rooms = RoomStore::new(db.clone(), StoreConfig::default());
    let relay = Arc::new(Relay::new(rooms, CommandLog::new(db), auth));
    Harness {
        service: RoomService::new(Arc::clone(&relay)),
        relay,
        clock,
        next_conn: 0,
    }
}

impl<A: Authorizer> Harness<A> {
    pub fn client(&mut self) -> Client {
        self.next_conn += 1;
        let (handle, rx) = ConnectionHandle::channel(ConnectionId::new(self.next_conn));
        Client {
            peer: Peer::new(handle),
            rx,
            closed: false,
        }
    }

    /// Creates a room controlled by `host` with `max_members` seats.
    pub async fn room(&self, host: &str, max_members: u32) -> Room {
        self.service
            .create_room(
                &mid(host),
                NewRoom {
                    max_members: Some(max_members),
                    ..NewRoom::default()
                },
            )
            .await
            .unwrap()
    }

    /// A fresh client joined to `code` as `member`, with the join events
    /// already drained.
    pub async fn joined(&mut self, code: &RoomCode, member: &str) -> Client {
        let mut client = self.client();
        client.send(&self.relay, join(code, member)).await;
        let events = client.drain();
        assert!(
            matches!(events.first(), Some(ServerEvent::Joined { .. })),
            "{member} should join, got {events:?}"
        );
        client
    }
}

/// One fake connection: a peer plus the receiving end of its handle.
pub struct Client {
    pub peer: Peer,
    rx: UnboundedReceiver<Outbound>,
    pub closed: bool,
}

impl Client {
    pub async fn send<A: Authorizer>(&mut self, relay: &Relay<A>, event: ClientEvent) {
        relay.handle_event(&mut self.peer, event).await;
    }

    /// Everything pushed so far, applied to the peer the way the
    /// connection handler would.
    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(out) = self.rx.try_recv() {
            match out {
                Outbound::Event(event) => {
                    self.peer.observe(&event);
                    events.push(event);
                }
                Outbound::Close { .. } => self.closed = true,
            }
        }
        events
    }

    /// Error codes among the drained events.
    pub fn errors(&mut self) -> Vec<ErrorCode> {
        error_codes(&self.drain())
    }
}

pub fn error_codes(events: &[ServerEvent]) -> Vec<ErrorCode> {
    events
        .iter()
        .filter_map(|e| match e {
            ServerEvent::Error { code, .. } => Some(*code),
            _ => None,
        })
        .collect()
}

pub fn mid(id: &str) -> MemberId {
    MemberId::new(id)
}

pub fn join(code: &RoomCode, member: &str) -> ClientEvent {
    ClientEvent::JoinRoom {
        room_code: code.to_string(),
        member_id: mid(member),
        token: None,
        display_name: Some(member.to_uppercase()),
        world: None,
    }
}

pub fn broadcast(kind: CommandKind) -> ClientEvent {
    ClientEvent::SendCommand {
        target: None,
        role_pattern: None,
        kind,
        params: serde_json::json!({"text": "go"}),
    }
}

pub fn to_pattern(pattern: &str) -> ClientEvent {
    ClientEvent::SendCommand {
        target: None,
        role_pattern: Some(pattern.to_string()),
        kind: CommandKind::Move,
        params: serde_json::json!({"x": 1.0, "y": 2.0}),
    }
}

pub fn to_member(member: &str) -> ClientEvent {
    ClientEvent::SendCommand {
        target: Some(mid(member)),
        role_pattern: None,
        kind: CommandKind::Jump,
        params: serde_json::Value::Null,
    }
}
