//! Request/response operations for the admin/CRUD layer.
//!
//! The HTTP surface itself lives outside this crate. It authenticates the
//! caller, then calls into [`RoomService`], which checks room-level
//! permissions against the store and pushes the resulting notifications to
//! live sessions through the [`Relay`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rallypoint_protocol::{
    HistoryEntry, JobTag, Member, MemberId, MemberProfile, PublicRoom, Role, Room, RoomCode,
    RoomDetails,
};
use rallypoint_room::{NewRoom, StoreError};
use rallypoint_session::{AllowAll, Authorizer};

use crate::relay::blocking;
use crate::sweep::EXPIRED_REASON;
use crate::{RallyError, Relay};

/// History page size when the caller doesn't ask for one.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Largest history page served.
pub const MAX_HISTORY_LIMIT: u32 = 500;

/// Who is calling, as established by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Member(MemberId),
    /// Operator override. Passes every room-level permission check.
    Admin,
}

impl Caller {
    fn member_id(&self) -> Option<&MemberId> {
        match self {
            Self::Member(id) => Some(id),
            Self::Admin => None,
        }
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Member(id) => write!(f, "{id}"),
            Self::Admin => f.write_str("admin"),
        }
    }
}

/// Room management operations.
///
/// Cheap to clone; every clone shares one [`Relay`].
pub struct RoomService<A: Authorizer = AllowAll> {
    relay: Arc<Relay<A>>,
}

impl<A: Authorizer> Clone for RoomService<A> {
    fn clone(&self) -> Self {
        Self {
            relay: Arc::clone(&self.relay),
        }
    }
}

impl<A: Authorizer> RoomService<A> {
    pub fn new(relay: Arc<Relay<A>>) -> Self {
        Self { relay }
    }

    pub fn relay(&self) -> &Arc<Relay<A>> {
        &self.relay
    }

    // ---------------------------------------------------------------------
    // Room lifecycle
    // ---------------------------------------------------------------------

    /// Creates a room owned by `controller`.
    ///
    /// A previous room of theirs that has expired but not yet been swept is
    /// closed first, and its live sessions are told.
    pub async fn create_room(&self, controller: &MemberId, new: NewRoom) -> Result<Room, RallyError> {
        let mut sessions = self.relay.sessions().await;

        let store = self.relay.rooms().clone();
        let c = controller.clone();
        let previous = blocking(move || store.active_room_for_controller(&c)).await?;
        if let Some(old) = previous {
            let now = self.relay.rooms().database().now();
            if !old.is_open_at(now) {
                let notified = self
                    .relay
                    .close_sessions(&mut sessions, &old.code, EXPIRED_REASON);
                let store = self.relay.rooms().clone();
                let old_id = old.id;
                blocking(move || store.close_room(old_id)).await?;
                tracing::info!(%controller, room_code = %old.code, notified, "closed expired room before create");
            }
        }

        let store = self.relay.rooms().clone();
        let c = controller.clone();
        let room = blocking(move || store.create_room(&c, new)).await?;
        drop(sessions);
        tracing::info!(%controller, room_code = %room.code, "audit: create-room");
        Ok(room)
    }

    /// Registers `member` in a room ahead of their real-time join.
    pub async fn join_room(
        &self,
        member: &MemberId,
        code: &str,
        profile: MemberProfile,
    ) -> Result<RoomDetails, RallyError> {
        let code = RoomCode::parse(code)?;
        let store = self.relay.rooms().clone();
        let m = member.clone();
        let details = blocking(move || store.join_room(&code, &m, profile)).await?;
        tracing::info!(%member, room_code = %details.room.code, "audit: join-room");
        Ok(details)
    }

    /// Removes `member` from a room. The host can't leave; they close the
    /// room instead.
    pub async fn leave_room(&self, member: &MemberId, code: &str) -> Result<(), RallyError> {
        let room = self.find_room(code).await?;
        let mut sessions = self.relay.sessions().await;

        let store = self.relay.rooms().clone();
        let m = member.clone();
        let removed = blocking(move || store.remove_member(room.id, &m)).await?;
        if removed == 0 {
            return Err(not_member(member, &room));
        }
        self.relay.evict_member(&mut sessions, &room.code, member);
        tracing::info!(%member, room_code = %room.code, "audit: leave-room");
        Ok(())
    }

    /// Closes a room and disconnects it from every live session. Returns
    /// `false` if it was already closed.
    pub async fn close_room(&self, caller: &Caller, code: &str) -> Result<bool, RallyError> {
        let room = self.find_room(code).await?;
        if let Caller::Member(id) = caller {
            if id != &room.controller_id {
                return Err(StoreError::NotController {
                    caller: id.clone(),
                    code: room.code,
                }
                .into());
            }
        }

        let mut sessions = self.relay.sessions().await;
        let reason = match caller {
            Caller::Admin => "closed by an administrator",
            Caller::Member(_) => "closed by the host",
        };
        let notified = self.relay.close_sessions(&mut sessions, &room.code, reason);

        let store = self.relay.rooms().clone();
        let changed = blocking(move || store.close_room(room.id)).await?;
        tracing::info!(%caller, room_code = %room.code, notified, changed, "audit: close-room");
        Ok(changed)
    }

    /// Lists a room publicly for `duration`, capped at its expiry. Zero
    /// takes it off the listing.
    pub async fn publish_room(
        &self,
        caller: &Caller,
        code: &str,
        duration: Duration,
    ) -> Result<Room, RallyError> {
        let room = self.find_room(code).await?;
        let acting = caller
            .member_id()
            .cloned()
            .unwrap_or_else(|| room.controller_id.clone());

        let store = self.relay.rooms().clone();
        let c = room.code.clone();
        let published = blocking(move || store.publish_room(&c, &acting, duration)).await?;
        tracing::info!(
            %caller,
            room_code = %published.code,
            until = ?published.published_until,
            "audit: publish-room"
        );
        Ok(published)
    }

    pub async fn list_public_rooms(&self) -> Result<Vec<PublicRoom>, RallyError> {
        let store = self.relay.rooms().clone();
        blocking(move || store.list_public_rooms()).await
    }

    // ---------------------------------------------------------------------
    // Members
    // ---------------------------------------------------------------------

    /// Grants `Leader` or `Member`. Host or admin only.
    pub async fn set_member_role(
        &self,
        caller: &Caller,
        code: &str,
        member: &MemberId,
        role: Role,
    ) -> Result<Member, RallyError> {
        let room = self.find_room(code).await?;
        if !self.caller_role(caller, &room).await?.is_host_or_admin() {
            return Err(RallyError::PermissionDenied(
                "only the host can change roles".into(),
            ));
        }

        let sessions = self.relay.sessions().await;
        let store = self.relay.rooms().clone();
        let m = member.clone();
        let rid = room.id;
        let updated = blocking(move || {
            if store.set_member_role(rid, &m, role)? == 0 {
                return Ok(None);
            }
            store.member(rid, &m)
        })
        .await?
        .ok_or_else(|| not_member(member, &room))?;

        self.relay
            .notify_member_updated(&sessions, &room.code, updated.clone());
        tracing::info!(%caller, room_code = %room.code, %member, %role, "audit: set-member-role");
        Ok(updated)
    }

    /// Sets or clears a job tag. The host, a leader, the member themself,
    /// or an admin may do this.
    pub async fn set_member_job_tag(
        &self,
        caller: &Caller,
        code: &str,
        member: &MemberId,
        job_tag: Option<&str>,
    ) -> Result<Member, RallyError> {
        let room = self.find_room(code).await?;
        let allowed = match self.caller_role(caller, &room).await? {
            Authority::Admin => true,
            Authority::Role(role) => role.can_dispatch() || caller.member_id() == Some(member),
            Authority::Outsider => false,
        };
        if !allowed {
            return Err(RallyError::PermissionDenied(
                "only the host, a leader or the member can change a job tag".into(),
            ));
        }

        let tag = JobTag::parse_optional(job_tag);
        let sessions = self.relay.sessions().await;
        let store = self.relay.rooms().clone();
        let m = member.clone();
        let rid = room.id;
        let t = tag.clone();
        let updated = blocking(move || {
            if store.set_member_job_tag(rid, &m, t)? == 0 {
                return Ok(None);
            }
            store.member(rid, &m)
        })
        .await?
        .ok_or_else(|| not_member(member, &room))?;

        self.relay
            .notify_member_updated(&sessions, &room.code, updated.clone());
        tracing::info!(%caller, room_code = %room.code, %member, tag = ?tag, "audit: set-member-job-tag");
        Ok(updated)
    }

    /// Removes a member from the room. Host or admin only; the host
    /// themself can't be kicked.
    pub async fn kick_member(
        &self,
        caller: &Caller,
        code: &str,
        member: &MemberId,
    ) -> Result<(), RallyError> {
        let room = self.find_room(code).await?;
        if !self.caller_role(caller, &room).await?.is_host_or_admin() {
            return Err(RallyError::PermissionDenied(
                "only the host can kick members".into(),
            ));
        }

        let mut sessions = self.relay.sessions().await;
        let store = self.relay.rooms().clone();
        let m = member.clone();
        let removed = blocking(move || store.remove_member(room.id, &m)).await?;
        if removed == 0 {
            return Err(not_member(member, &room));
        }
        self.relay.evict_member(&mut sessions, &room.code, member);
        tracing::info!(%caller, room_code = %room.code, %member, "audit: kick-member");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// The room and its members. Members of the room or admin only.
    pub async fn get_room_info(&self, caller: &Caller, code: &str) -> Result<RoomDetails, RallyError> {
        let room = self.find_room(code).await?;
        self.require_member_or_admin(caller, &room).await?;

        let store = self.relay.rooms().clone();
        let rid = room.id;
        blocking(move || store.room_details(rid))
            .await?
            .ok_or_else(|| StoreError::RoomNotFound(room.code.to_string()).into())
    }

    /// Newest-first command history. `limit` defaults to
    /// [`DEFAULT_HISTORY_LIMIT`] and is clamped to `1..=MAX_HISTORY_LIMIT`.
    pub async fn get_command_history(
        &self,
        caller: &Caller,
        code: &str,
        limit: Option<u32>,
    ) -> Result<Vec<HistoryEntry>, RallyError> {
        let room = self.find_room(code).await?;
        self.require_member_or_admin(caller, &room).await?;

        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        let log = self.relay.commands().clone();
        let rid = room.id;
        blocking(move || log.history(rid, limit)).await
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    async fn find_room(&self, code: &str) -> Result<Room, RallyError> {
        let code = RoomCode::parse(code)?;
        let store = self.relay.rooms().clone();
        let c = code.clone();
        blocking(move || store.room_by_code(&c))
            .await?
            .ok_or_else(|| StoreError::RoomNotFound(code.to_string()).into())
    }

    async fn caller_role(&self, caller: &Caller, room: &Room) -> Result<Authority, RallyError> {
        let Some(id) = caller.member_id() else {
            return Ok(Authority::Admin);
        };
        let store = self.relay.rooms().clone();
        let (rid, m) = (room.id, id.clone());
        let member = blocking(move || store.member(rid, &m)).await?;
        Ok(member.map_or(Authority::Outsider, |m| Authority::Role(m.role)))
    }

    async fn require_member_or_admin(&self, caller: &Caller, room: &Room) -> Result<(), RallyError> {
        match self.caller_role(caller, room).await? {
            Authority::Outsider => Err(not_member(
                caller.member_id().unwrap_or(&room.controller_id),
                room,
            )),
            _ => Ok(()),
        }
    }
}

impl<A: Authorizer> fmt::Debug for RoomService<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomService").finish_non_exhaustive()
    }
}

/// What a caller may do in one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Authority {
    Admin,
    Role(Role),
    /// Not a member of the room.
    Outsider,
}

impl Authority {
    fn is_host_or_admin(self) -> bool {
        matches!(self, Self::Admin | Self::Role(Role::Host))
    }
}

fn not_member(member: &MemberId, room: &Room) -> RallyError {
    StoreError::NotMember {
        member: member.clone(),
        room: room.id,
    }
    .into()
}
