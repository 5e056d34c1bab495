//! The session registry: who is reachable right now, and through which
//! connection.
//!
//! It is a pure cache. Nothing here is persisted, and losing it on a crash
//! is fine: clients rejoin and the registry refills.
//!
//! # Concurrency note
//!
//! `SessionRegistry` is NOT thread-safe by itself, it uses plain
//! `HashMap`s. The relay owns exactly one instance behind a mutex, and
//! because both indexes live in this one struct, every mutation updates
//! them together under that lock.

use std::collections::HashMap;

use rallypoint_protocol::{MemberId, RoomCode};
use rallypoint_transport::ConnectionId;

use crate::ConnectionHandle;

/// One live session: a member reachable through a connection, in a room.
#[derive(Debug, Clone)]
pub struct Session {
    pub member_id: MemberId,
    pub handle: ConnectionHandle,
    pub room_code: RoomCode,
}

/// Bidirectional index between member identities and live connections.
///
/// ```text
/// register() ──→ [member ↔ connection] ──→ unregister() / unregister_connection()
///      │
///      └─ same member again → previous session returned to the caller
/// ```
///
/// At most one live connection per identity, process-wide.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    /// Sessions keyed by member identity.
    by_member: HashMap<MemberId, Session>,

    /// Reverse index: connection → member. Kept in sync with `by_member`.
    by_connection: HashMap<ConnectionId, MemberId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the session for `member_id`.
    ///
    /// Returns the superseded session, if there was one on a *different*
    /// connection, so the caller can notify and close it. Re-registering
    /// the same connection (e.g. moving it to another room) returns `None`.
    pub fn register(
        &mut self,
        member_id: MemberId,
        handle: ConnectionHandle,
        room_code: RoomCode,
    ) -> Option<Session> {
        // A connection maps to one member; drop any other identity it held.
        if let Some(previous_member) = self.by_connection.get(&handle.id()).cloned() {
            if previous_member != member_id {
                self.by_member.remove(&previous_member);
            }
        }

        let conn_id = handle.id();
        let previous = self.by_member.insert(
            member_id.clone(),
            Session {
                member_id: member_id.clone(),
                handle,
                room_code,
            },
        );
        self.by_connection.insert(conn_id, member_id.clone());

        let superseded = previous.filter(|old| old.handle.id() != conn_id);
        if let Some(old) = &superseded {
            self.by_connection.remove(&old.handle.id());
            tracing::info!(
                %member_id,
                old_conn = %old.handle.id(),
                new_conn = %conn_id,
                "session superseded by new connection"
            );
        } else {
            tracing::debug!(%member_id, %conn_id, "session registered");
        }
        superseded
    }

    /// Removes the session for `member_id`, both directions.
    pub fn unregister(&mut self, member_id: &MemberId) -> Option<Session> {
        let session = self.by_member.remove(member_id)?;
        self.by_connection.remove(&session.handle.id());
        tracing::debug!(%member_id, "session unregistered");
        Some(session)
    }

    /// Removes whichever session is bound to `conn_id`.
    ///
    /// Returns `None` if the connection has no session, which is the case
    /// for a connection that was superseded: its disconnect must not tear
    /// down the newer session.
    pub fn unregister_connection(&mut self, conn_id: ConnectionId) -> Option<Session> {
        let member_id = self.by_connection.remove(&conn_id)?;
        let session = self.by_member.remove(&member_id);
        if session.is_some() {
            tracing::debug!(%member_id, %conn_id, "session unregistered by connection");
        }
        session
    }

    /// Looks up a live session by member identity.
    pub fn get(&self, member_id: &MemberId) -> Option<&Session> {
        self.by_member.get(member_id)
    }

    /// Looks up a live session by connection.
    pub fn by_connection(&self, conn_id: ConnectionId) -> Option<&Session> {
        self.by_connection
            .get(&conn_id)
            .and_then(|member_id| self.by_member.get(member_id))
    }

    /// The session for `member_id`, but only if it is in `room_code`.
    pub fn in_room(&self, member_id: &MemberId, room_code: &RoomCode) -> Option<&Session> {
        self.get(member_id).filter(|s| &s.room_code == room_code)
    }

    /// All live sessions in a room.
    pub fn sessions_in_room(&self, room_code: &RoomCode) -> Vec<&Session> {
        self.by_member
            .values()
            .filter(|s| &s.room_code == room_code)
            .collect()
    }

    /// Removes and returns every session in a room.
    pub fn drain_room(&mut self, room_code: &RoomCode) -> Vec<Session> {
        let members: Vec<MemberId> = self
            .sessions_in_room(room_code)
            .into_iter()
            .map(|s| s.member_id.clone())
            .collect();
        members
            .iter()
            .filter_map(|m| self.unregister(m))
            .collect()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.by_member.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_member.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
