//! Rooms and their members.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rallypoint_protocol::{
    JobTag, Member, MemberId, MemberProfile, PublicRoom, Role, Room, RoomCode, RoomDetails,
    RoomId, RoomStatus,
};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::clock::add_duration;
use crate::db::{opt_time_column, parsed_column, time_column, to_millis};
use crate::{Database, RolePattern, StoreConfig, StoreError, generate_unique_code};

const ROOM_COLUMNS: &str = "r.id, r.code, r.controller_id, r.name, r.max_members, r.status, \
                            r.created_at, r.expires_at, r.published_until";

const MEMBER_COLUMNS: &str = "m.room_id, m.member_id, m.display_name, m.world, m.role, \
                              m.job_tag, m.online, m.joined_at, m.last_active_at";

/// Longest room name accepted, in characters.
const MAX_NAME_LEN: usize = 64;

/// What a controller asks for when creating a room.
#[derive(Debug, Clone, Default)]
pub struct NewRoom {
    pub name: Option<String>,
    /// Seats excluding the host. `None` uses the configured default.
    pub max_members: Option<u32>,
    /// Lifetime. `None` uses the configured default.
    pub ttl: Option<Duration>,
    /// The controller's own display info.
    pub profile: MemberProfile,
}

/// Durable record of rooms, members, roles and job assignments.
///
/// This is the only authority on membership and permissions. The live
/// session registry says who is *reachable*; this says who is *allowed*.
///
/// # Capacity
///
/// `max_members` counts seats for everyone except the host. A room created
/// with `max_members = 2` holds its controller plus two members.
///
/// # Expiry
///
/// A room whose `expires_at` has passed is treated as closed by every read
/// that checks openness, even if the sweeper hasn't flipped its status yet.
#[derive(Debug, Clone)]
pub struct RoomStore {
    db: Arc<Database>,
    config: StoreConfig,
}

impl RoomStore {
    pub fn new(db: Arc<Database>, config: StoreConfig) -> Self {
        Self { db, config }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Creates a room controlled by `controller`, who becomes its `Host`.
    ///
    /// If the controller still owns an active room that has already
    /// expired, that room is closed first.
    ///
    /// # Errors
    /// - [`StoreError::DuplicateActiveRoom`] if the controller already owns
    ///   an open room
    /// - [`StoreError::CodeGenerationExhausted`] if no free code was found
    /// - [`StoreError::Validation`] for a blank controller, an overlong
    ///   name, or out-of-range limits
    pub fn create_room(&self, controller: &MemberId, new: NewRoom) -> Result<Room, StoreError> {
        if controller.is_blank() {
            return Err(StoreError::Validation("controller id is required".into()));
        }
        let name = clean_text(new.name);
        if name.as_ref().is_some_and(|n| n.chars().count() > MAX_NAME_LEN) {
            return Err(StoreError::Validation(format!(
                "room name longer than {MAX_NAME_LEN} characters"
            )));
        }
        let ttl = self.config.resolve_ttl(new.ttl)?;
        let max_members = self.config.resolve_max_members(new.max_members)?;
        let now = self.db.now();

        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;

            if let Some(existing) = active_room_for(&tx, controller)? {
                if existing.is_open_at(now) {
                    return Err(StoreError::DuplicateActiveRoom(controller.clone()));
                }
                close_room_tx(&tx, existing.id)?;
                tracing::info!(room_id = %existing.id, code = %existing.code, "closed expired room before create");
            }

            let mut rng = rand::rng();
            let code = generate_unique_code(&mut rng, self.config.max_code_attempts, |code| {
                let taken: Option<i64> = tx
                    .query_row(
                        "SELECT 1 FROM rooms WHERE code = ?1 AND status = 'active'",
                        [code.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(taken.is_some())
            })?;

            let expires_at = add_duration(now, ttl);
            tx.execute(
                "INSERT INTO rooms (code, controller_id, name, max_members, status, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?6)",
                params![
                    code.as_str(),
                    controller.as_str(),
                    name,
                    max_members,
                    to_millis(now),
                    to_millis(expires_at)
                ],
            )?;
            let room_id = RoomId(tx.last_insert_rowid());

            let profile = new.profile;
            tx.execute(
                "INSERT INTO members (room_id, member_id, display_name, world, role, online, joined_at, last_active_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
                params![
                    room_id.0,
                    controller.as_str(),
                    clean_text(profile.display_name),
                    clean_text(profile.world),
                    Role::Host.as_str(),
                    to_millis(now)
                ],
            )?;

            let room = load_room(&tx, room_id)?
                .ok_or_else(|| StoreError::RoomNotFound(room_id.to_string()))?;
            tx.commit()?;

            tracing::info!(%room_id, %code, %controller, max_members, "room created");
            Ok(room)
        })
    }

    /// Adds `member` to the room with join code `code`, or refreshes their
    /// display info if they are already in it.
    ///
    /// # Errors
    /// - [`StoreError::RoomNotFound`] if no room ever had this code
    /// - [`StoreError::RoomClosed`] if the room is closed or expired
    /// - [`StoreError::RoomFull`] if every non-host seat is taken
    pub fn join_room(
        &self,
        code: &RoomCode,
        member: &MemberId,
        profile: MemberProfile,
    ) -> Result<RoomDetails, StoreError> {
        if member.is_blank() {
            return Err(StoreError::Validation("member id is required".into()));
        }
        let now = self.db.now();
        let display_name = clean_text(profile.display_name);
        let world = clean_text(profile.world);

        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let room = load_room_by_code(&tx, code)?
                .ok_or_else(|| StoreError::RoomNotFound(code.to_string()))?;
            if !room.is_open_at(now) {
                return Err(StoreError::RoomClosed(room.code));
            }

            if load_member(&tx, room.id, member)?.is_some() {
                tx.execute(
                    "UPDATE members
                     SET display_name = COALESCE(?3, display_name),
                         world = COALESCE(?4, world),
                         last_active_at = ?5
                     WHERE room_id = ?1 AND member_id = ?2",
                    params![room.id.0, member.as_str(), display_name, world, to_millis(now)],
                )?;
                tracing::debug!(room_id = %room.id, %member, "member rejoined");
            } else {
                let seated: u32 = tx.query_row(
                    "SELECT COUNT(*) FROM members WHERE room_id = ?1 AND role != 'Host'",
                    [room.id.0],
                    |row| row.get(0),
                )?;
                if seated >= room.max_members {
                    return Err(StoreError::RoomFull {
                        code: room.code,
                        max: room.max_members,
                    });
                }
                tx.execute(
                    "INSERT INTO members (room_id, member_id, display_name, world, role, online, joined_at, last_active_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
                    params![
                        room.id.0,
                        member.as_str(),
                        display_name,
                        world,
                        Role::Member.as_str(),
                        to_millis(now)
                    ],
                )?;
                tracing::info!(room_id = %room.id, code = %room.code, %member, "member joined room");
            }

            let members = load_members(&tx, room.id)?;
            tx.commit()?;
            Ok(RoomDetails { room, members })
        })
    }

    /// Removes a member (leave or kick). Returns the number of rows
    /// removed: 0 if they weren't in the room.
    ///
    /// # Errors
    /// - [`StoreError::RoomNotFound`] if the room doesn't exist
    /// - [`StoreError::CannotRemoveHost`] for the controller; close the
    ///   room instead
    pub fn remove_member(&self, room_id: RoomId, member: &MemberId) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            let room = load_room(conn, room_id)?
                .ok_or_else(|| StoreError::RoomNotFound(room_id.to_string()))?;
            if &room.controller_id == member {
                return Err(StoreError::CannotRemoveHost(room.code));
            }
            let removed = conn.execute(
                "DELETE FROM members WHERE room_id = ?1 AND member_id = ?2",
                params![room_id.0, member.as_str()],
            )?;
            if removed > 0 {
                tracing::info!(%room_id, %member, "member removed");
            }
            Ok(removed)
        })
    }

    /// Closes a room. Returns `false` if it was already closed.
    ///
    /// Closing clears the publish window and marks every member offline.
    ///
    /// # Errors
    /// [`StoreError::RoomNotFound`] if the room doesn't exist.
    pub fn close_room(&self, room_id: RoomId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            if load_room(&tx, room_id)?.is_none() {
                return Err(StoreError::RoomNotFound(room_id.to_string()));
            }
            let changed = close_room_tx(&tx, room_id)?;
            tx.commit()?;
            if changed {
                tracing::info!(%room_id, "room closed");
            }
            Ok(changed)
        })
    }

    /// Deletes a room outright, along with its members and commands.
    pub fn delete_room(&self, room_id: RoomId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM rooms WHERE id = ?1", [room_id.0])?;
            if deleted > 0 {
                tracing::info!(%room_id, "room deleted");
            }
            Ok(deleted > 0)
        })
    }

    /// Deletes closed rooms whose expiry is older than `before`.
    pub fn purge_closed_rooms(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM rooms WHERE status = 'closed' AND expires_at < ?1",
                [to_millis(before)],
            )?)
        })
    }

    // -----------------------------------------------------------------
    // Roles and tags
    // -----------------------------------------------------------------

    /// Changes a member's role. Returns rows changed: 0 for a member that
    /// isn't in the room.
    ///
    /// # Errors
    /// [`StoreError::HostRoleImmutable`] when granting `Host`, or when the
    /// member is the host.
    pub fn set_member_role(
        &self,
        room_id: RoomId,
        member: &MemberId,
        role: Role,
    ) -> Result<usize, StoreError> {
        if role == Role::Host {
            return Err(StoreError::HostRoleImmutable);
        }
        self.db.with_conn(|conn| {
            let current = load_member(conn, room_id, member)?;
            match current {
                None => Ok(0),
                Some(m) if m.role == Role::Host => Err(StoreError::HostRoleImmutable),
                Some(_) => {
                    let changed = conn.execute(
                        "UPDATE members SET role = ?3 WHERE room_id = ?1 AND member_id = ?2",
                        params![room_id.0, member.as_str(), role.as_str()],
                    )?;
                    tracing::info!(%room_id, %member, %role, "member role changed");
                    Ok(changed)
                }
            }
        })
    }

    /// Sets or clears a member's job tag. Returns rows changed.
    pub fn set_member_job_tag(
        &self,
        room_id: RoomId,
        member: &MemberId,
        tag: Option<JobTag>,
    ) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE members SET job_tag = ?3 WHERE room_id = ?1 AND member_id = ?2",
                params![room_id.0, member.as_str(), tag.as_ref().map(JobTag::as_str)],
            )?;
            if changed > 0 {
                tracing::debug!(%room_id, %member, tag = ?tag, "job tag changed");
            }
            Ok(changed)
        })
    }

    // -----------------------------------------------------------------
    // Public discovery
    // -----------------------------------------------------------------

    /// Opens, extends or (with a zero duration) clears the public listing
    /// window. The window never outlives the room.
    ///
    /// # Errors
    /// - [`StoreError::RoomNotFound`] / [`StoreError::RoomClosed`]
    /// - [`StoreError::NotController`] if `caller` isn't the host
    pub fn publish_room(
        &self,
        code: &RoomCode,
        caller: &MemberId,
        duration: Duration,
    ) -> Result<Room, StoreError> {
        let now = self.db.now();
        self.db.with_conn(|conn| {
            let room = load_room_by_code(conn, code)?
                .ok_or_else(|| StoreError::RoomNotFound(code.to_string()))?;
            if !room.is_open_at(now) {
                return Err(StoreError::RoomClosed(room.code));
            }
            if &room.controller_id != caller {
                return Err(StoreError::NotController {
                    caller: caller.clone(),
                    code: room.code,
                });
            }

            let until = (!duration.is_zero()).then(|| add_duration(now, duration).min(room.expires_at));
            conn.execute(
                "UPDATE rooms SET published_until = ?2 WHERE id = ?1",
                params![room.id.0, until.map(to_millis)],
            )?;
            tracing::info!(room_id = %room.id, %code, until = ?until, "room publish window set");

            load_room(conn, room.id)?.ok_or_else(|| StoreError::RoomNotFound(code.to_string()))
        })
    }

    /// Rooms currently in the public listing, most recently published
    /// first. Read-only.
    pub fn list_public_rooms(&self) -> Result<Vec<PublicRoom>, StoreError> {
        let now = to_millis(self.db.now());
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {ROOM_COLUMNS}, h.display_name,
                        (SELECT COUNT(*) FROM members c WHERE c.room_id = r.id)
                 FROM rooms r
                 LEFT JOIN members h ON h.room_id = r.id AND h.member_id = r.controller_id
                 WHERE r.status = 'active' AND r.expires_at > ?1 AND r.published_until > ?1
                 ORDER BY r.published_until DESC, r.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([now], |row| {
                Ok(PublicRoom {
                    room: room_from_row(row)?,
                    controller_name: row.get(9)?,
                    member_count: row.get(10)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    // -----------------------------------------------------------------
    // Presence
    // -----------------------------------------------------------------

    /// Live members whose job tag matches `pattern`.
    ///
    /// The empty pattern selects every member with `online = true`.
    pub fn select_members_by_role_pattern(
        &self,
        room_id: RoomId,
        pattern: &str,
    ) -> Result<Vec<Member>, StoreError> {
        let pattern = RolePattern::parse(pattern);
        let online = self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {MEMBER_COLUMNS} FROM members m
                 WHERE m.room_id = ?1 AND m.online = 1
                 ORDER BY m.joined_at, m.member_id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([room_id.0], member_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })?;
        Ok(online
            .into_iter()
            .filter(|m| pattern.matches(m.job_tag.as_ref()))
            .collect())
    }

    /// Flips a member's live flag and bumps their activity time.
    pub fn set_member_online(
        &self,
        room_id: RoomId,
        member: &MemberId,
        online: bool,
    ) -> Result<usize, StoreError> {
        let now = to_millis(self.db.now());
        self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE members SET online = ?3, last_active_at = ?4
                 WHERE room_id = ?1 AND member_id = ?2",
                params![room_id.0, member.as_str(), online, now],
            )?)
        })
    }

    /// Marks every member of every room offline. Run at startup: live
    /// sessions don't survive a restart.
    pub fn reset_presence(&self) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.execute("UPDATE members SET online = 0 WHERE online = 1", [])?)
        })
    }

    /// Bumps a member's last-activity time.
    pub fn touch_member(&self, room_id: RoomId, member: &MemberId) -> Result<usize, StoreError> {
        let now = to_millis(self.db.now());
        self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE members SET last_active_at = ?3 WHERE room_id = ?1 AND member_id = ?2",
                params![room_id.0, member.as_str(), now],
            )?)
        })
    }

    // -----------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------

    pub fn room(&self, room_id: RoomId) -> Result<Option<Room>, StoreError> {
        self.db.with_conn(|conn| load_room(conn, room_id))
    }

    /// The room that holds `code`: the active one if any, otherwise the
    /// most recent closed one.
    pub fn room_by_code(&self, code: &RoomCode) -> Result<Option<Room>, StoreError> {
        self.db.with_conn(|conn| load_room_by_code(conn, code))
    }

    /// The room `controller` currently owns with status `active`. May be
    /// past its expiry.
    pub fn active_room_for_controller(
        &self,
        controller: &MemberId,
    ) -> Result<Option<Room>, StoreError> {
        self.db.with_conn(|conn| active_room_for(conn, controller))
    }

    pub fn member(&self, room_id: RoomId, member: &MemberId) -> Result<Option<Member>, StoreError> {
        self.db.with_conn(|conn| load_member(conn, room_id, member))
    }

    /// All members, host first, then in join order.
    pub fn members(&self, room_id: RoomId) -> Result<Vec<Member>, StoreError> {
        self.db.with_conn(|conn| load_members(conn, room_id))
    }

    pub fn room_details(&self, room_id: RoomId) -> Result<Option<RoomDetails>, StoreError> {
        self.db.with_conn(|conn| {
            let Some(room) = load_room(conn, room_id)? else {
                return Ok(None);
            };
            let members = load_members(conn, room_id)?;
            Ok(Some(RoomDetails { room, members }))
        })
    }

    /// Rooms still marked active whose expiry has passed.
    pub fn expired_active_rooms(&self) -> Result<Vec<Room>, StoreError> {
        let now = to_millis(self.db.now());
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {ROOM_COLUMNS} FROM rooms r
                 WHERE r.status = 'active' AND r.expires_at <= ?1
                 ORDER BY r.expires_at"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([now], room_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }
}

// ---------------------------------------------------------------------------
// Row access
// ---------------------------------------------------------------------------

fn clean_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn room_from_row(row: &Row<'_>) -> rusqlite::Result<Room> {
    Ok(Room {
        id: RoomId(row.get(0)?),
        code: parsed_column(row, 1)?,
        controller_id: MemberId(row.get(2)?),
        name: row.get(3)?,
        max_members: row.get(4)?,
        status: parsed_column(row, 5)?,
        created_at: time_column(row, 6)?,
        expires_at: time_column(row, 7)?,
        published_until: opt_time_column(row, 8)?,
    })
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<Member> {
    let job_tag = row
        .get::<_, Option<String>>(5)?
        .map(|raw| {
            raw.parse::<JobTag>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
            })
        })
        .transpose()?;
    Ok(Member {
        room_id: RoomId(row.get(0)?),
        member_id: MemberId(row.get(1)?),
        display_name: row.get(2)?,
        world: row.get(3)?,
        role: parsed_column(row, 4)?,
        job_tag,
        online: row.get(6)?,
        joined_at: time_column(row, 7)?,
        last_active_at: time_column(row, 8)?,
    })
}

fn load_room(conn: &Connection, room_id: RoomId) -> Result<Option<Room>, StoreError> {
    let sql = format!("SELECT {ROOM_COLUMNS} FROM rooms r WHERE r.id = ?1");
    Ok(conn.query_row(&sql, [room_id.0], room_from_row).optional()?)
}

fn load_room_by_code(conn: &Connection, code: &RoomCode) -> Result<Option<Room>, StoreError> {
    let sql = format!(
        "SELECT {ROOM_COLUMNS} FROM rooms r WHERE r.code = ?1
         ORDER BY (r.status = 'active') DESC, r.id DESC LIMIT 1"
    );
    Ok(conn.query_row(&sql, [code.as_str()], room_from_row).optional()?)
}

fn active_room_for(conn: &Connection, controller: &MemberId) -> Result<Option<Room>, StoreError> {
    let sql = format!(
        "SELECT {ROOM_COLUMNS} FROM rooms r WHERE r.controller_id = ?1 AND r.status = ?2"
    );
    Ok(conn
        .query_row(
            &sql,
            params![controller.as_str(), RoomStatus::Active.as_str()],
            room_from_row,
        )
        .optional()?)
}

fn load_member(
    conn: &Connection,
    room_id: RoomId,
    member: &MemberId,
) -> Result<Option<Member>, StoreError> {
    let sql = format!("SELECT {MEMBER_COLUMNS} FROM members m WHERE m.room_id = ?1 AND m.member_id = ?2");
    Ok(conn
        .query_row(&sql, params![room_id.0, member.as_str()], member_from_row)
        .optional()?)
}

fn load_members(conn: &Connection, room_id: RoomId) -> Result<Vec<Member>, StoreError> {
    let sql = format!(
        "SELECT {MEMBER_COLUMNS} FROM members m WHERE m.room_id = ?1
         ORDER BY (m.role = 'Host') DESC, m.joined_at, m.member_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([room_id.0], member_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn close_room_tx(conn: &Connection, room_id: RoomId) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE rooms SET status = 'closed', published_until = NULL
         WHERE id = ?1 AND status = 'active'",
        [room_id.0],
    )?;
    conn.execute("UPDATE members SET online = 0 WHERE room_id = ?1", [room_id.0])?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    fn store() -> (RoomStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let db = Arc::new(Database::in_memory(clock.clone()).unwrap());
        (RoomStore::new(db, StoreConfig::default()), clock)
    }

    #[test]
    fn test_clean_text_trims_and_drops_blank() {
        assert_eq!(clean_text(Some("  Alpha ".into())), Some("Alpha".into()));
        assert_eq!(clean_text(Some("   ".into())), None);
        assert_eq!(clean_text(None), None);
    }

    #[test]
    fn test_create_room_inserts_host_member() {
        let (store, _) = store();
        let host = MemberId::new("host");
        let room = store.create_room(&host, NewRoom::default()).unwrap();

        let members = store.members(room.id).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].member_id, host);
        assert_eq!(members[0].role, Role::Host);
        assert!(!members[0].online);
    }

    #[test]
    fn test_create_room_rejects_long_name() {
        let (store, _) = store();
        let new = NewRoom {
            name: Some("x".repeat(MAX_NAME_LEN + 1)),
            ..NewRoom::default()
        };
        let result = store.create_room(&MemberId::new("host"), new);
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_create_room_closes_expired_room_of_same_controller() {
        let (store, clock) = store();
        let host = MemberId::new("host");
        let first = store
            .create_room(
                &host,
                NewRoom {
                    ttl: Some(Duration::from_secs(60)),
                    ..NewRoom::default()
                },
            )
            .unwrap();
        clock.advance(Duration::from_secs(61));

        let second = store.create_room(&host, NewRoom::default()).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(store.room(first.id).unwrap().unwrap().status, RoomStatus::Closed);
    }

    #[test]
    fn test_reset_presence_clears_online_flags() {
        let (store, _) = store();
        let host = MemberId::new("host");
        let room = store.create_room(&host, NewRoom::default()).unwrap();
        store.set_member_online(room.id, &host, true).unwrap();

        assert_eq!(store.reset_presence().unwrap(), 1);
        assert!(store.select_members_by_role_pattern(room.id, "").unwrap().is_empty());
    }

    #[test]
    fn test_close_room_marks_members_offline() {
        let (store, _) = store();
        let host = MemberId::new("host");
        let room = store.create_room(&host, NewRoom::default()).unwrap();
        store.set_member_online(room.id, &host, true).unwrap();

        store.close_room(room.id).unwrap();

        assert!(!store.member(room.id, &host).unwrap().unwrap().online);
    }
}
