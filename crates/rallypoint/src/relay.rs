//! The relay engine: per-connection state machine and command routing.
//!
//! A connection moves through three states:
//!
//! ```text
//! Connected ──join-room──→ Joined ──(send-command, command-ack,
//!     ↑                      │       heartbeat, update-job-role)──→ Joined
//!     └──kicked / closed─────┘
//!                 any ──disconnect──→ Disconnected
//! ```
//!
//! The relay never touches sockets. It pushes [`ServerEvent`]s into each
//! connection's [`ConnectionHandle`], and the handler task writes them out.
//! That keeps the whole state machine testable with plain channels.
//!
//! # Locking
//!
//! One `tokio::sync::Mutex` guards the session registry, and every inbound
//! event holds it for its whole handling. Rooms and members are few, so a
//! single global lock is enough to make each event's store writes and
//! notifications atomic with respect to other events.

use std::time::Duration;

use rallypoint_protocol::{
    ClientEvent, CommandId, CommandKind, CommandStatus, ErrorCode, JobTag, Member, MemberId,
    MemberProfile, RoomCode, RoomId, ServerEvent, Target, normalize_params,
};
use rallypoint_room::{CommandLog, NewCommand, RoomStore, StoreError};
use rallypoint_session::{AllowAll, Authorizer, ConnectionHandle, SessionRegistry};
use rallypoint_transport::ConnectionId;
use tokio::sync::{Mutex, MutexGuard};

use crate::RallyError;

/// Runs a store call on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, RallyError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

// =========================================================================
// Peer
// =========================================================================

/// The room a connection is currently associated with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedRoom {
    pub member_id: MemberId,
    pub room_id: RoomId,
    pub room_code: RoomCode,
}

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerState {
    /// Transport open, no room.
    Connected,
    Joined(JoinedRoom),
    /// Terminal.
    Disconnected,
}

/// One connection as the relay sees it.
#[derive(Debug)]
pub struct Peer {
    handle: ConnectionHandle,
    state: PeerState,
}

impl Peer {
    pub fn new(handle: ConnectionHandle) -> Self {
        Self {
            handle,
            state: PeerState::Connected,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub fn state(&self) -> &PeerState {
        &self.state
    }

    pub fn joined(&self) -> Option<&JoinedRoom> {
        match &self.state {
            PeerState::Joined(joined) => Some(joined),
            _ => None,
        }
    }

    /// Updates local state from an event about to be written to this
    /// connection. Being told your room closed, or that you left it, drops
    /// you back to `Connected`.
    pub fn observe(&mut self, event: &ServerEvent) {
        let PeerState::Joined(joined) = &self.state else {
            return;
        };
        let leaves = match event {
            ServerEvent::RoomClosed { room_code, .. } => room_code == &joined.room_code,
            ServerEvent::MemberLeft { member_id } => member_id == &joined.member_id,
            _ => false,
        };
        if leaves {
            self.state = PeerState::Connected;
        }
    }
}

// =========================================================================
// Relay
// =========================================================================

/// Routes real-time events between the members of each room.
///
/// Owns the live [`SessionRegistry`] and consults the [`RoomStore`] for
/// every permission decision. The registry only ever answers "who is
/// reachable", never "who is allowed".
pub struct Relay<A: Authorizer = AllowAll> {
    rooms: RoomStore,
    commands: CommandLog,
    sessions: Mutex<SessionRegistry>,
    auth: A,
}

impl<A: Authorizer> Relay<A> {
    pub fn new(rooms: RoomStore, commands: CommandLog, auth: A) -> Self {
        Self {
            rooms,
            commands,
            sessions: Mutex::new(SessionRegistry::new()),
            auth,
        }
    }

    pub fn rooms(&self) -> &RoomStore {
        &self.rooms
    }

    pub fn commands(&self) -> &CommandLog {
        &self.commands
    }

    /// Locks the session registry. Hold the guard for the whole of any
    /// store mutation whose outcome is then pushed to live sessions.
    pub(crate) async fn sessions(&self) -> MutexGuard<'_, SessionRegistry> {
        self.sessions.lock().await
    }

    /// Number of live sessions in a room.
    pub async fn live_sessions(&self, room_code: &RoomCode) -> usize {
        self.sessions.lock().await.sessions_in_room(room_code).len()
    }

    /// Handles one inbound event. Failures are reported to the peer as an
    /// `error` event; they never close the connection.
    pub async fn handle_event(&self, peer: &mut Peer, event: ClientEvent) {
        let name = event_name(&event);
        let conn_id = peer.id();

        let result = {
            let mut sessions = self.sessions.lock().await;
            self.dispatch(&mut sessions, peer, event).await
        };

        if let Err(e) = result {
            if e.is_internal() {
                tracing::error!(%conn_id, event = name, error = %e, "event failed");
            } else {
                tracing::debug!(%conn_id, event = name, error = %e, "event refused");
            }
            let _ = peer
                .handle
                .push(ServerEvent::error(e.code(), e.client_message()));
        }
    }

    async fn dispatch(
        &self,
        sessions: &mut SessionRegistry,
        peer: &mut Peer,
        event: ClientEvent,
    ) -> Result<(), RallyError> {
        if peer.state == PeerState::Disconnected {
            return Err(RallyError::NotJoined);
        }
        match event {
            ClientEvent::JoinRoom {
                room_code,
                member_id,
                token,
                display_name,
                world,
            } => {
                let profile = MemberProfile {
                    display_name,
                    world,
                };
                self.join(sessions, peer, &room_code, member_id, token, profile)
                    .await
            }
            ClientEvent::SendCommand {
                target,
                role_pattern,
                kind,
                params,
            } => {
                self.send_command(sessions, peer, target, role_pattern, kind, params)
                    .await
            }
            ClientEvent::CommandAck {
                command_id,
                status,
                error,
            } => self.ack(sessions, peer, command_id, status, error).await,
            ClientEvent::Heartbeat => {
                self.heartbeat(sessions, peer).await;
                Ok(())
            }
            ClientEvent::UpdateJobRole { job_tag } => {
                self.update_job_tag(sessions, peer, job_tag).await
            }
        }
    }

    // ---------------------------------------------------------------------
    // join-room
    // ---------------------------------------------------------------------

    async fn join(
        &self,
        sessions: &mut SessionRegistry,
        peer: &mut Peer,
        raw_code: &str,
        member_id: MemberId,
        token: Option<String>,
        profile: MemberProfile,
    ) -> Result<(), RallyError> {
        let code = RoomCode::parse(raw_code)?;
        if member_id.is_blank() {
            return Err(RallyError::Validation("member_id is required".into()));
        }
        self.auth.authorize(&member_id, token.as_deref()).await?;

        let store = self.rooms.clone();
        let (c, m) = (code.clone(), member_id.clone());
        let details = blocking(move || store.join_room(&c, &m, profile)).await?;
        let room = details.room;

        // Moving rooms, or switching identity, leaves the previous room.
        if let Some(previous) = peer.joined().cloned() {
            if previous.room_id != room.id || previous.member_id != member_id {
                if let Some(old) = sessions.unregister_connection(peer.id()) {
                    self.mark_left(sessions, &old.room_code, &old.member_id).await;
                }
            }
        }

        let store = self.rooms.clone();
        let (rid, m) = (room.id, member_id.clone());
        let members = blocking(move || {
            store.set_member_online(rid, &m, true)?;
            store.members(rid)
        })
        .await?;

        if let Some(old) = sessions.register(member_id.clone(), peer.handle.clone(), room.code.clone())
        {
            let _ = old.handle.push(ServerEvent::error(
                ErrorCode::Superseded,
                "signed in from another connection",
            ));
            old.handle.close("superseded");
            if old.room_code != room.code {
                self.mark_left(sessions, &old.room_code, &old.member_id).await;
            }
        }

        let member = members
            .iter()
            .find(|m| m.member_id == member_id)
            .cloned()
            .ok_or_else(|| StoreError::NotMember {
                member: member_id.clone(),
                room: room.id,
            })?;

        peer.state = PeerState::Joined(JoinedRoom {
            member_id: member_id.clone(),
            room_id: room.id,
            room_code: room.code.clone(),
        });
        tracing::info!(conn_id = %peer.id(), %member_id, room_code = %room.code, "member joined");

        let code = room.code.clone();
        peer.handle.push(ServerEvent::Joined {
            room,
            member: member.clone(),
            members,
        })?;
        broadcast(
            sessions,
            &code,
            Some(&member_id),
            &ServerEvent::MemberJoined { member },
        );
        Ok(())
    }

    // ---------------------------------------------------------------------
    // send-command
    // ---------------------------------------------------------------------

    async fn send_command(
        &self,
        sessions: &mut SessionRegistry,
        peer: &mut Peer,
        target: Option<MemberId>,
        role_pattern: Option<String>,
        kind: CommandKind,
        params: serde_json::Value,
    ) -> Result<(), RallyError> {
        let joined = require_joined(sessions, peer)?;
        let room_id = joined.room_id;
        let sender_id = joined.member_id.clone();

        let store = self.rooms.clone();
        let s = sender_id.clone();
        let (room, sender) =
            blocking(move || Ok((store.room(room_id)?, store.member(room_id, &s)?))).await?;
        let room = room.ok_or_else(|| StoreError::RoomNotFound(room_id.to_string()))?;
        if !room.is_open_at(self.rooms.database().now()) {
            return Err(StoreError::RoomClosed(room.code).into());
        }
        let sender = sender.ok_or_else(|| StoreError::NotMember {
            member: sender_id.clone(),
            room: room_id,
        })?;
        if !sender.role.can_dispatch() {
            return Err(RallyError::PermissionDenied(format!(
                "{} cannot dispatch commands",
                sender.role
            )));
        }

        let (target, candidates) = self.resolve_targets(room_id, target, role_pattern).await?;
        let recipients: Vec<ConnectionHandle> = candidates
            .iter()
            .filter(|m| **m != sender_id)
            .filter_map(|m| sessions.in_room(m, &room.code))
            .map(|s| s.handle.clone())
            .collect();
        if recipients.is_empty() {
            return Err(RallyError::NoReachableTargets);
        }

        let log = self.commands.clone();
        let new = NewCommand {
            room_id,
            sender_id: sender_id.clone(),
            target,
            kind,
            params: normalize_params(params),
        };
        let record = blocking(move || log.record(new)).await?;

        let event = ServerEvent::Command {
            command_id: record.id,
            room_code: room.code.clone(),
            from: sender_id.clone(),
            kind: record.kind,
            params: record.params.clone(),
            issued_at: record.created_at,
        };
        let mut delivered = 0usize;
        let mut last_error = None;
        for handle in &recipients {
            match handle.push(event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(command_id = %record.id, conn_id = %handle.id(), error = %e, "push failed");
                    last_error = Some(e.to_string());
                }
            }
        }

        let (status, error) = if delivered > 0 {
            (CommandStatus::Sent, None)
        } else {
            (CommandStatus::Failed, last_error)
        };
        let log = self.commands.clone();
        let id = record.id;
        blocking(move || log.mark_dispatched(id, status, error.as_deref())).await?;

        tracing::info!(
            command_id = %record.id,
            room_code = %room.code,
            sender = %sender_id,
            %kind,
            target = ?record.target,
            reachable = recipients.len(),
            delivered,
            "command dispatched"
        );

        peer.handle.push(ServerEvent::CommandSent {
            command_id: record.id,
            reachable: recipients.len(),
        })?;
        Ok(())
    }

    /// Resolution order: explicit member, then role pattern, then everyone
    /// online. Returns the target as it will be logged, plus the member ids
    /// it selects.
    async fn resolve_targets(
        &self,
        room_id: RoomId,
        target: Option<MemberId>,
        role_pattern: Option<String>,
    ) -> Result<(Target, Vec<MemberId>), RallyError> {
        let store = self.rooms.clone();

        if let Some(member) = target.filter(|m| !m.is_blank()) {
            let m = member.clone();
            let found = blocking(move || store.member(room_id, &m)).await?;
            if found.is_none() {
                return Err(StoreError::NotMember {
                    member,
                    room: room_id,
                }
                .into());
            }
            return Ok((Target::Member(member.clone()), vec![member]));
        }

        let pattern = role_pattern
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        let query = pattern.clone().unwrap_or_default();
        let members = blocking(move || store.select_members_by_role_pattern(room_id, &query)).await?;
        let ids = members.into_iter().map(|m| m.member_id).collect();

        let target = match pattern {
            Some(p) => Target::Pattern(p),
            None => Target::All,
        };
        Ok((target, ids))
    }

    // ---------------------------------------------------------------------
    // command-ack
    // ---------------------------------------------------------------------

    async fn ack(
        &self,
        sessions: &mut SessionRegistry,
        peer: &mut Peer,
        command_id: CommandId,
        status: CommandStatus,
        error: Option<String>,
    ) -> Result<(), RallyError> {
        let joined = require_joined(sessions, peer)?;
        if status == CommandStatus::Pending {
            return Err(RallyError::Validation(
                "an acknowledgment must report sent or failed".into(),
            ));
        }

        let log = self.commands.clone();
        let record = blocking(move || log.get(command_id)).await?;
        let Some(record) = record.filter(|r| r.room_id == joined.room_id) else {
            tracing::debug!(%command_id, member = %joined.member_id, "ack for unknown command ignored");
            return Ok(());
        };

        let log = self.commands.clone();
        let err = error.clone();
        blocking(move || log.update_status(command_id, status, err.as_deref())).await?;
        tracing::debug!(%command_id, member = %joined.member_id, %status, "command acknowledged");

        if let Some(sender) = sessions.in_room(&record.sender_id, &joined.room_code) {
            let _ = sender.handle.push(ServerEvent::CommandAck {
                command_id,
                member_id: joined.member_id.clone(),
                status,
                error,
            });
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // heartbeat / update-job-role
    // ---------------------------------------------------------------------

    async fn heartbeat(&self, sessions: &mut SessionRegistry, peer: &mut Peer) {
        let Ok(joined) = require_joined(sessions, peer) else {
            return;
        };
        let store = self.rooms.clone();
        let member = joined.member_id.clone();
        let room_id = joined.room_id;
        if let Err(e) = blocking(move || store.touch_member(room_id, &member)).await {
            tracing::warn!(member = %joined.member_id, error = %e, "heartbeat not recorded");
        }
    }

    async fn update_job_tag(
        &self,
        sessions: &mut SessionRegistry,
        peer: &mut Peer,
        raw: Option<String>,
    ) -> Result<(), RallyError> {
        let joined = require_joined(sessions, peer)?;
        let tag = JobTag::parse_optional(raw.as_deref());

        let store = self.rooms.clone();
        let (rid, m) = (joined.room_id, joined.member_id.clone());
        let member = blocking(move || {
            store.set_member_job_tag(rid, &m, tag)?;
            store.member(rid, &m)
        })
        .await?
        .ok_or_else(|| StoreError::NotMember {
            member: joined.member_id.clone(),
            room: joined.room_id,
        })?;

        self.notify_member_updated(sessions, &joined.room_code, member);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // disconnect
    // ---------------------------------------------------------------------

    /// Tears down a connection's session. A connection that was superseded
    /// no longer owns a session, so its disconnect leaves the member
    /// online.
    pub async fn disconnect(&self, peer: &mut Peer) {
        let mut sessions = self.sessions.lock().await;
        peer.state = PeerState::Disconnected;
        if let Some(session) = sessions.unregister_connection(peer.id()) {
            tracing::info!(conn_id = %peer.id(), member = %session.member_id, room_code = %session.room_code, "member disconnected");
            self.mark_left(&sessions, &session.room_code, &session.member_id)
                .await;
        }
    }

    // ---------------------------------------------------------------------
    // Notifications used by the service and the sweeper
    // ---------------------------------------------------------------------

    /// Marks `member` offline in the room holding `room_code` and tells
    /// everyone still there. Store failures are logged, not returned: the
    /// session is already gone either way.
    async fn mark_left(&self, sessions: &SessionRegistry, room_code: &RoomCode, member: &MemberId) {
        let store = self.rooms.clone();
        let (c, m) = (room_code.clone(), member.clone());
        let result = blocking(move || {
            if let Some(room) = store.room_by_code(&c)? {
                store.set_member_online(room.id, &m, false)?;
            }
            Ok(())
        })
        .await;
        if let Err(e) = result {
            tracing::warn!(%member, %room_code, error = %e, "could not mark member offline");
        }
        broadcast(
            sessions,
            room_code,
            Some(member),
            &ServerEvent::MemberLeft {
                member_id: member.clone(),
            },
        );
    }

    /// Unregisters every session in a room and tells each one it closed.
    /// Returns how many were live.
    pub(crate) fn close_sessions(
        &self,
        sessions: &mut SessionRegistry,
        room_code: &RoomCode,
        reason: &str,
    ) -> usize {
        let drained = sessions.drain_room(room_code);
        let event = ServerEvent::RoomClosed {
            room_code: room_code.clone(),
            reason: reason.to_string(),
        };
        for session in &drained {
            if let Err(e) = session.handle.push(event.clone()) {
                tracing::debug!(member = %session.member_id, error = %e, "room-closed not delivered");
            }
        }
        drained.len()
    }

    /// Drops a removed member's live session, if any, and tells the room
    /// (and the member) they're gone.
    pub(crate) fn evict_member(
        &self,
        sessions: &mut SessionRegistry,
        room_code: &RoomCode,
        member: &MemberId,
    ) {
        let event = ServerEvent::MemberLeft {
            member_id: member.clone(),
        };
        if sessions.in_room(member, room_code).is_some() {
            if let Some(session) = sessions.unregister(member) {
                let _ = session.handle.push(event.clone());
            }
        }
        broadcast(sessions, room_code, Some(member), &event);
    }

    pub(crate) fn notify_member_updated(
        &self,
        sessions: &SessionRegistry,
        room_code: &RoomCode,
        member: Member,
    ) {
        broadcast(sessions, room_code, None, &ServerEvent::MemberUpdated { member });
    }
}

impl<A: Authorizer> std::fmt::Debug for Relay<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("rooms", &self.rooms)
            .finish_non_exhaustive()
    }
}

/// The peer's room, if the registry still agrees this connection is in
/// it. A peer that was kicked or closed out is put back to `Connected`.
fn require_joined(sessions: &SessionRegistry, peer: &mut Peer) -> Result<JoinedRoom, RallyError> {
    let Some(joined) = peer.joined().cloned() else {
        return Err(RallyError::NotJoined);
    };
    let current = sessions
        .by_connection(peer.id())
        .is_some_and(|s| s.member_id == joined.member_id && s.room_code == joined.room_code);
    if !current {
        peer.state = PeerState::Connected;
        return Err(RallyError::NotJoined);
    }
    Ok(joined)
}

/// Pushes `event` to every live session in a room except `except`.
/// Returns how many pushes succeeded.
fn broadcast(
    sessions: &SessionRegistry,
    room_code: &RoomCode,
    except: Option<&MemberId>,
    event: &ServerEvent,
) -> usize {
    let mut delivered = 0;
    for session in sessions.sessions_in_room(room_code) {
        if except == Some(&session.member_id) {
            continue;
        }
        match session.handle.push(event.clone()) {
            Ok(()) => delivered += 1,
            Err(e) => tracing::debug!(member = %session.member_id, error = %e, "broadcast push failed"),
        }
    }
    delivered
}

fn event_name(event: &ClientEvent) -> &'static str {
    match event {
        ClientEvent::JoinRoom { .. } => "join-room",
        ClientEvent::SendCommand { .. } => "send-command",
        ClientEvent::CommandAck { .. } => "command-ack",
        ClientEvent::Heartbeat => "heartbeat",
        ClientEvent::UpdateJobRole { .. } => "update-job-role",
    }
}

/// Rounds a duration to whole milliseconds for envelope timestamps.
pub(crate) fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
