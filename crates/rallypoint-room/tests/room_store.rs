//! Integration tests for the room store and command log on SQLite.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rallypoint_protocol::{
    CommandKind, CommandStatus, JobTag, MemberId, MemberProfile, Params, Role, RoomCode,
    RoomStatus, Target,
};
use rallypoint_room::{
    Clock, CommandLog, Database, ManualClock, NewCommand, NewRoom, RoomStore, StoreConfig, StoreError,
};

// =========================================================================
// Helpers
// =========================================================================

struct Fixture {
    store: RoomStore,
    log: CommandLog,
    clock: Arc<ManualClock>,
}

fn fixture() -> Fixture {
    let clock = Arc::new(ManualClock::default());
    let db = Arc::new(Database::in_memory(clock.clone()).unwrap());
    Fixture {
        store: RoomStore::new(db.clone(), StoreConfig::default()),
        log: CommandLog::new(db),
        clock,
    }
}

fn mid(id: &str) -> MemberId {
    MemberId::new(id)
}

fn named(name: &str) -> MemberProfile {
    MemberProfile {
        display_name: Some(name.to_string()),
        world: None,
    }
}

fn room_with(max_members: u32) -> NewRoom {
    NewRoom {
        max_members: Some(max_members),
        ..NewRoom::default()
    }
}

fn broadcast(room_id: rallypoint_protocol::RoomId, sender: &str) -> NewCommand {
    NewCommand {
        room_id,
        sender_id: mid(sender),
        target: Target::All,
        kind: CommandKind::Chat,
        params: Params::new(),
    }
}

// =========================================================================
// create_room
// =========================================================================

#[test]
fn test_create_room_second_active_room_fails_duplicate() {
    let f = fixture();
    f.store.create_room(&mid("host"), NewRoom::default()).unwrap();

    let result = f.store.create_room(&mid("host"), NewRoom::default());

    assert!(matches!(result, Err(StoreError::DuplicateActiveRoom(_))));
}

#[test]
fn test_create_room_after_close_succeeds() {
    let f = fixture();
    let first = f.store.create_room(&mid("host"), NewRoom::default()).unwrap();
    f.store.close_room(first.id).unwrap();

    let second = f.store.create_room(&mid("host"), NewRoom::default());

    assert!(second.is_ok());
}

#[test]
fn test_create_room_codes_are_valid_and_distinct() {
    let f = fixture();
    let mut codes = HashSet::new();
    for i in 0..50 {
        let room = f
            .store
            .create_room(&mid(&format!("host-{i}")), NewRoom::default())
            .unwrap();
        let code = room.code.as_str();
        assert_eq!(code.len(), 6);
        assert!(code.bytes().all(|b| RoomCode::ALPHABET.contains(&b)));
        assert!(codes.insert(code.to_string()), "duplicate active code {code}");
    }
}

#[test]
fn test_create_room_exhausted_when_no_attempts_allowed() {
    let clock = Arc::new(ManualClock::default());
    let db = Arc::new(Database::in_memory(clock).unwrap());
    let config = StoreConfig {
        max_code_attempts: 0,
        ..StoreConfig::default()
    };
    let store = RoomStore::new(db, config);

    let result = store.create_room(&mid("host"), NewRoom::default());

    assert!(matches!(result, Err(StoreError::CodeGenerationExhausted(0))));
    assert!(store.active_room_for_controller(&mid("host")).unwrap().is_none());
}

#[test]
fn test_create_room_applies_ttl() {
    let f = fixture();
    let room = f
        .store
        .create_room(
            &mid("host"),
            NewRoom {
                ttl: Some(Duration::from_secs(600)),
                ..NewRoom::default()
            },
        )
        .unwrap();
    assert_eq!((room.expires_at - room.created_at).num_seconds(), 600);
    assert_eq!(room.status, RoomStatus::Active);
}

// =========================================================================
// join_room
// =========================================================================

#[test]
fn test_join_room_capacity_boundary() {
    let f = fixture();
    let room = f.store.create_room(&mid("host"), room_with(2)).unwrap();

    f.store.join_room(&room.code, &mid("a"), named("A")).unwrap();
    // At max - 1: succeeds.
    f.store.join_room(&room.code, &mid("b"), named("B")).unwrap();
    // At max: full.
    let result = f.store.join_room(&room.code, &mid("c"), named("C"));

    assert!(matches!(result, Err(StoreError::RoomFull { max: 2, .. })));
}

#[test]
fn test_join_room_rejoin_when_full_updates_profile() {
    let f = fixture();
    let room = f.store.create_room(&mid("host"), room_with(1)).unwrap();
    f.store.join_room(&room.code, &mid("a"), named("A")).unwrap();

    let details = f.store.join_room(&room.code, &mid("a"), named("Alpha")).unwrap();

    let a = details.members.iter().find(|m| m.member_id == mid("a")).unwrap();
    assert_eq!(a.display_name.as_deref(), Some("Alpha"));
    assert_eq!(details.members.len(), 2);
}

#[test]
fn test_join_room_rejoin_without_profile_keeps_old_name() {
    let f = fixture();
    let room = f.store.create_room(&mid("host"), NewRoom::default()).unwrap();
    f.store.join_room(&room.code, &mid("a"), named("A")).unwrap();

    f.store
        .join_room(&room.code, &mid("a"), MemberProfile::default())
        .unwrap();

    let a = f.store.member(room.id, &mid("a")).unwrap().unwrap();
    assert_eq!(a.display_name.as_deref(), Some("A"));
}

#[test]
fn test_join_room_unknown_code_not_found() {
    let f = fixture();
    let code = RoomCode::parse("ZZZZZZ").unwrap();
    let result = f.store.join_room(&code, &mid("a"), MemberProfile::default());
    assert!(matches!(result, Err(StoreError::RoomNotFound(_))));
}

#[test]
fn test_join_room_closed_room_rejected() {
    let f = fixture();
    let room = f.store.create_room(&mid("host"), NewRoom::default()).unwrap();
    f.store.close_room(room.id).unwrap();

    let result = f.store.join_room(&room.code, &mid("a"), MemberProfile::default());

    assert!(matches!(result, Err(StoreError::RoomClosed(_))));
}

#[test]
fn test_join_room_expired_room_treated_as_closed() {
    let f = fixture();
    let room = f
        .store
        .create_room(
            &mid("host"),
            NewRoom {
                ttl: Some(Duration::from_secs(60)),
                ..NewRoom::default()
            },
        )
        .unwrap();
    f.clock.advance(Duration::from_secs(60));

    let result = f.store.join_room(&room.code, &mid("a"), MemberProfile::default());

    assert!(matches!(result, Err(StoreError::RoomClosed(_))));
}

// =========================================================================
// leave / remove / roles
// =========================================================================

#[test]
fn test_remove_member_host_always_fails() {
    let f = fixture();
    let room = f.store.create_room(&mid("host"), NewRoom::default()).unwrap();

    let result = f.store.remove_member(room.id, &mid("host"));

    assert!(matches!(result, Err(StoreError::CannotRemoveHost(_))));
    assert!(f.store.member(room.id, &mid("host")).unwrap().is_some());
}

#[test]
fn test_remove_member_frees_a_seat() {
    let f = fixture();
    let room = f.store.create_room(&mid("host"), room_with(1)).unwrap();
    f.store.join_room(&room.code, &mid("a"), named("A")).unwrap();

    assert_eq!(f.store.remove_member(room.id, &mid("a")).unwrap(), 1);
    assert_eq!(f.store.remove_member(room.id, &mid("a")).unwrap(), 0);
    assert!(f.store.join_room(&room.code, &mid("b"), named("B")).is_ok());
}

#[test]
fn test_set_member_role_host_immutable_for_every_role() {
    let f = fixture();
    let room = f.store.create_room(&mid("host"), NewRoom::default()).unwrap();
    f.store.join_room(&room.code, &mid("a"), named("A")).unwrap();

    for role in [Role::Host, Role::Leader, Role::Member] {
        let result = f.store.set_member_role(room.id, &mid("host"), role);
        assert!(
            matches!(result, Err(StoreError::HostRoleImmutable)),
            "reassigning host to {role} should fail"
        );
    }
    let result = f.store.set_member_role(room.id, &mid("a"), Role::Host);
    assert!(matches!(result, Err(StoreError::HostRoleImmutable)));
    assert_eq!(
        f.store.member(room.id, &mid("host")).unwrap().unwrap().role,
        Role::Host
    );
}

#[test]
fn test_set_member_role_promotes_to_leader() {
    let f = fixture();
    let room = f.store.create_room(&mid("host"), NewRoom::default()).unwrap();
    f.store.join_room(&room.code, &mid("a"), named("A")).unwrap();

    assert_eq!(f.store.set_member_role(room.id, &mid("a"), Role::Leader).unwrap(), 1);
    assert_eq!(
        f.store.member(room.id, &mid("a")).unwrap().unwrap().role,
        Role::Leader
    );
}

#[test]
fn test_set_member_role_and_tag_unknown_member_zero_rows() {
    let f = fixture();
    let room = f.store.create_room(&mid("host"), NewRoom::default()).unwrap();

    assert_eq!(f.store.set_member_role(room.id, &mid("ghost"), Role::Leader).unwrap(), 0);
    assert_eq!(
        f.store
            .set_member_job_tag(room.id, &mid("ghost"), Some(JobTag::MT))
            .unwrap(),
        0
    );
}

// =========================================================================
// close / publish / discovery
// =========================================================================

#[test]
fn test_close_room_is_idempotent() {
    let f = fixture();
    let room = f.store.create_room(&mid("host"), NewRoom::default()).unwrap();

    assert!(f.store.close_room(room.id).unwrap());
    assert!(!f.store.close_room(room.id).unwrap());
}

#[test]
fn test_publish_room_requires_controller() {
    let f = fixture();
    let room = f.store.create_room(&mid("host"), NewRoom::default()).unwrap();
    f.store.join_room(&room.code, &mid("a"), named("A")).unwrap();

    let result = f.store.publish_room(&room.code, &mid("a"), Duration::from_secs(60));

    assert!(matches!(result, Err(StoreError::NotController { .. })));
}

#[test]
fn test_publish_room_closed_and_missing() {
    let f = fixture();
    let room = f.store.create_room(&mid("host"), NewRoom::default()).unwrap();
    f.store.close_room(room.id).unwrap();

    let closed = f.store.publish_room(&room.code, &mid("host"), Duration::from_secs(60));
    let missing = f.store.publish_room(
        &RoomCode::parse("QQQQQQ").unwrap(),
        &mid("host"),
        Duration::from_secs(60),
    );

    assert!(matches!(closed, Err(StoreError::RoomClosed(_))));
    assert!(matches!(missing, Err(StoreError::RoomNotFound(_))));
}

#[test]
fn test_publish_window_capped_at_room_expiry() {
    let f = fixture();
    let room = f
        .store
        .create_room(
            &mid("host"),
            NewRoom {
                ttl: Some(Duration::from_secs(300)),
                ..NewRoom::default()
            },
        )
        .unwrap();

    let published = f
        .store
        .publish_room(&room.code, &mid("host"), Duration::from_secs(3600))
        .unwrap();

    assert_eq!(published.published_until, Some(room.expires_at));
}

#[test]
fn test_list_public_rooms_tracks_window() {
    let f = fixture();
    let room = f.store.create_room(&mid("host"), NewRoom::default()).unwrap();
    f.store
        .join_room(&room.code, &mid("host"), named("Captain"))
        .unwrap();
    f.store.join_room(&room.code, &mid("a"), named("A")).unwrap();
    let _private = f.store.create_room(&mid("other"), NewRoom::default()).unwrap();

    assert!(f.store.list_public_rooms().unwrap().is_empty());

    f.store
        .publish_room(&room.code, &mid("host"), Duration::from_secs(120))
        .unwrap();
    let listed = f.store.list_public_rooms().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].room.id, room.id);
    assert_eq!(listed[0].controller_name.as_deref(), Some("Captain"));
    assert_eq!(listed[0].member_count, 2);

    f.clock.advance(Duration::from_secs(121));
    assert!(f.store.list_public_rooms().unwrap().is_empty());
}

#[test]
fn test_publish_zero_duration_unpublishes() {
    let f = fixture();
    let room = f.store.create_room(&mid("host"), NewRoom::default()).unwrap();
    f.store
        .publish_room(&room.code, &mid("host"), Duration::from_secs(120))
        .unwrap();

    let room = f
        .store
        .publish_room(&room.code, &mid("host"), Duration::ZERO)
        .unwrap();

    assert_eq!(room.published_until, None);
    assert!(f.store.list_public_rooms().unwrap().is_empty());
}

// =========================================================================
// select_members_by_role_pattern
// =========================================================================

fn tagged_room(f: &Fixture) -> rallypoint_protocol::RoomId {
    let room = f.store.create_room(&mid("host"), NewRoom::default()).unwrap();
    for (id, tag, online) in [
        ("tank", Some(JobTag::MT), true),
        ("off", Some(JobTag::ST), true),
        ("healer", Some(JobTag::H1), true),
        ("untagged", None, true),
        ("asleep", Some(JobTag::MT), false),
    ] {
        f.store.join_room(&room.code, &mid(id), named(id)).unwrap();
        f.store.set_member_job_tag(room.id, &mid(id), tag).unwrap();
        f.store.set_member_online(room.id, &mid(id), online).unwrap();
    }
    room.id
}

fn ids(members: &[rallypoint_protocol::Member]) -> HashSet<String> {
    members.iter().map(|m| m.member_id.0.clone()).collect()
}

#[test]
fn test_select_empty_pattern_returns_all_online() {
    let f = fixture();
    let room_id = tagged_room(&f);

    let selected = f.store.select_members_by_role_pattern(room_id, "").unwrap();

    let expected: HashSet<String> = ["tank", "off", "healer", "untagged"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(ids(&selected), expected);
}

#[test]
fn test_select_tank_pattern_only_live_tanks() {
    let f = fixture();
    let room_id = tagged_room(&f);

    let selected = f
        .store
        .select_members_by_role_pattern(room_id, "mt|st")
        .unwrap();

    let expected: HashSet<String> = ["tank", "off"].into_iter().map(String::from).collect();
    assert_eq!(ids(&selected), expected);
}

// =========================================================================
// expiry
// =========================================================================

#[test]
fn test_expired_active_rooms_only_past_expiry() {
    let f = fixture();
    let short = f
        .store
        .create_room(
            &mid("short"),
            NewRoom {
                ttl: Some(Duration::from_secs(60)),
                ..NewRoom::default()
            },
        )
        .unwrap();
    let _long = f.store.create_room(&mid("long"), NewRoom::default()).unwrap();
    f.clock.advance(Duration::from_secs(61));

    let expired = f.store.expired_active_rooms().unwrap();

    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, short.id);
}

#[test]
fn test_delete_room_cascades_members_and_commands() {
    let f = fixture();
    let room = f.store.create_room(&mid("host"), NewRoom::default()).unwrap();
    f.store.join_room(&room.code, &mid("a"), named("A")).unwrap();
    f.log.record(broadcast(room.id, "host")).unwrap();

    assert!(f.store.delete_room(room.id).unwrap());

    assert!(f.store.room(room.id).unwrap().is_none());
    assert!(f.store.members(room.id).unwrap().is_empty());
    assert_eq!(f.log.count(room.id).unwrap(), 0);
}

#[test]
fn test_purge_closed_rooms_respects_cutoff() {
    let f = fixture();
    let room = f
        .store
        .create_room(
            &mid("host"),
            NewRoom {
                ttl: Some(Duration::from_secs(60)),
                ..NewRoom::default()
            },
        )
        .unwrap();
    f.store.close_room(room.id).unwrap();

    assert_eq!(f.store.purge_closed_rooms(room.expires_at).unwrap(), 0);
    f.clock.advance(Duration::from_secs(3600));
    assert_eq!(f.store.purge_closed_rooms(f.clock_now()).unwrap(), 1);
}

impl Fixture {
    fn clock_now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}

// =========================================================================
// command log
// =========================================================================

#[test]
fn test_record_starts_pending() {
    let f = fixture();
    let room = f.store.create_room(&mid("host"), NewRoom::default()).unwrap();

    let record = f.log.record(broadcast(room.id, "host")).unwrap();

    assert_eq!(record.status, CommandStatus::Pending);
    assert_eq!(f.log.get(record.id).unwrap().unwrap(), record);
}

#[test]
fn test_update_status_second_ack_overwrites() {
    let f = fixture();
    let room = f.store.create_room(&mid("host"), NewRoom::default()).unwrap();
    let record = f.log.record(broadcast(room.id, "host")).unwrap();

    f.log.update_status(record.id, CommandStatus::Sent, None).unwrap();
    let changed = f
        .log
        .update_status(record.id, CommandStatus::Failed, Some("stuck"))
        .unwrap();

    assert_eq!(changed, 1);
    let stored = f.log.get(record.id).unwrap().unwrap();
    assert_eq!(stored.status, CommandStatus::Failed);
    assert_eq!(stored.error.as_deref(), Some("stuck"));
    assert!(stored.executed_at.is_some());
}

#[test]
fn test_mark_dispatched_does_not_clobber_ack() {
    let f = fixture();
    let room = f.store.create_room(&mid("host"), NewRoom::default()).unwrap();
    let record = f.log.record(broadcast(room.id, "host")).unwrap();
    f.log
        .update_status(record.id, CommandStatus::Failed, Some("early ack"))
        .unwrap();

    let changed = f.log.mark_dispatched(record.id, CommandStatus::Sent, None).unwrap();

    assert_eq!(changed, 0);
    assert_eq!(
        f.log.get(record.id).unwrap().unwrap().status,
        CommandStatus::Failed
    );
}

#[test]
fn test_update_status_unknown_id_is_zero_rows() {
    let f = fixture();
    let changed = f
        .log
        .update_status(rallypoint_protocol::CommandId(404), CommandStatus::Sent, None)
        .unwrap();
    assert_eq!(changed, 0);
}

#[test]
fn test_history_limit_newest_first() {
    let f = fixture();
    let room = f.store.create_room(&mid("host"), NewRoom::default()).unwrap();
    for _ in 0..7 {
        f.log.record(broadcast(room.id, "host")).unwrap();
        f.clock.advance(Duration::from_millis(10));
    }

    let history = f.log.history(room.id, 3).unwrap();

    assert_eq!(history.len(), 3);
    for pair in history.windows(2) {
        assert!(pair[0].record.created_at >= pair[1].record.created_at);
        assert!(pair[0].record.id.0 > pair[1].record.id.0);
    }
}

#[test]
fn test_history_labels() {
    let f = fixture();
    let room = f.store.create_room(&mid("host"), NewRoom::default()).unwrap();
    f.store
        .join_room(&room.code, &mid("host"), named("Captain"))
        .unwrap();
    f.store.join_room(&room.code, &mid("b"), named("Bravo")).unwrap();
    f.store
        .join_room(&room.code, &mid("c"), MemberProfile::default())
        .unwrap();

    let mut cmd = broadcast(room.id, "host");
    f.log.record(cmd.clone()).unwrap();
    cmd.target = Target::Member(mid("b"));
    f.log.record(cmd.clone()).unwrap();
    cmd.target = Target::Member(mid("c"));
    f.log.record(cmd.clone()).unwrap();
    cmd.target = Target::Member(mid("gone"));
    f.log.record(cmd.clone()).unwrap();
    cmd.target = Target::Pattern("MT|ST".into());
    f.log.record(cmd).unwrap();

    let labels: Vec<String> = f
        .log
        .history(room.id, 10)
        .unwrap()
        .into_iter()
        .rev()
        .map(|e| e.target_label)
        .collect();
    assert_eq!(
        labels,
        ["all members", "Bravo", "c", "specified member", "role MT|ST"]
    );
    let newest = &f.log.history(room.id, 1).unwrap()[0];
    assert_eq!(newest.sender_name.as_deref(), Some("Captain"));
}

#[test]
fn test_prune_before_deletes_old_rows_only() {
    let f = fixture();
    let room = f.store.create_room(&mid("host"), NewRoom::default()).unwrap();
    f.log.record(broadcast(room.id, "host")).unwrap();
    f.clock.advance(Duration::from_secs(100));
    let cutoff = f.clock_now();
    f.log.record(broadcast(room.id, "host")).unwrap();

    assert_eq!(f.log.prune_before(cutoff).unwrap(), 1);
    assert_eq!(f.log.count(room.id).unwrap(), 1);
}

// =========================================================================
// durability
// =========================================================================

#[test]
fn test_rooms_and_commands_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rally.db");
    let clock = Arc::new(ManualClock::default());

    let (room, command_id) = {
        let db = Arc::new(Database::open(&path, clock.clone()).unwrap());
        let store = RoomStore::new(db.clone(), StoreConfig::default());
        let log = CommandLog::new(db);
        let room = store.create_room(&mid("host"), NewRoom::default()).unwrap();
        store.join_room(&room.code, &mid("a"), named("A")).unwrap();
        store.set_member_job_tag(room.id, &mid("a"), Some(JobTag::H2)).unwrap();
        let cmd = log.record(broadcast(room.id, "host")).unwrap();
        (room, cmd.id)
    };

    let db = Arc::new(Database::open(&path, clock).unwrap());
    let store = RoomStore::new(db.clone(), StoreConfig::default());
    let log = CommandLog::new(db);

    assert_eq!(store.room_by_code(&room.code).unwrap().unwrap().id, room.id);
    let a = store.member(room.id, &mid("a")).unwrap().unwrap();
    assert_eq!(a.job_tag, Some(JobTag::H2));
    assert!(log.get(command_id).unwrap().is_some());
    assert!(matches!(
        store.create_room(&mid("host"), NewRoom::default()),
        Err(StoreError::DuplicateActiveRoom(_))
    ));
}
