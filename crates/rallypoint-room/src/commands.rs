//! The command log.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rallypoint_protocol::{
    CommandId, CommandKind, CommandRecord, CommandStatus, HistoryEntry, MemberId, Params,
    RoomId, Target,
};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params};

use crate::db::{opt_time_column, parsed_column, time_column, to_millis};
use crate::{Database, StoreError};

const COMMAND_COLUMNS: &str = "c.id, c.room_id, c.sender_id, c.target_kind, c.target_value, \
                               c.kind, c.params, c.status, c.error, c.created_at, c.executed_at";

/// A command about to be logged.
#[derive(Debug, Clone)]
pub struct NewCommand {
    pub room_id: RoomId,
    pub sender_id: MemberId,
    pub target: Target,
    pub kind: CommandKind,
    pub params: Params,
}

/// Durable, append-only record of every dispatched command.
///
/// Rows are immutable except for their status, error text and completion
/// time. Status updates are re-invocable: a duplicate acknowledgment simply
/// overwrites the previous one.
#[derive(Debug, Clone)]
pub struct CommandLog {
    db: Arc<Database>,
}

impl CommandLog {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Appends a command with status `pending`.
    pub fn record(&self, cmd: NewCommand) -> Result<CommandRecord, StoreError> {
        let now = self.db.now();
        let params_json = serde_json::to_string(&cmd.params)?;
        let id = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO commands (room_id, sender_id, target_kind, target_value, kind, params, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7)",
                params![
                    cmd.room_id.0,
                    cmd.sender_id.as_str(),
                    cmd.target.kind_str(),
                    cmd.target.value_str(),
                    cmd.kind.as_str(),
                    params_json,
                    to_millis(now)
                ],
            )?;
            Ok(CommandId(conn.last_insert_rowid()))
        })?;

        tracing::debug!(command_id = %id, room_id = %cmd.room_id, kind = %cmd.kind, "command recorded");
        Ok(CommandRecord {
            id,
            room_id: cmd.room_id,
            sender_id: cmd.sender_id,
            target: cmd.target,
            kind: cmd.kind,
            params: cmd.params,
            status: CommandStatus::Pending,
            error: None,
            created_at: now,
            executed_at: None,
        })
    }

    /// Records the outcome of the dispatch itself.
    ///
    /// Only rows still `pending` change, so an acknowledgment that landed
    /// first is never overwritten by the dispatch bookkeeping.
    pub fn mark_dispatched(
        &self,
        id: CommandId,
        status: CommandStatus,
        error: Option<&str>,
    ) -> Result<usize, StoreError> {
        let now = to_millis(self.db.now());
        self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE commands SET status = ?2, error = ?3, executed_at = ?4
                 WHERE id = ?1 AND status = 'pending'",
                params![id.0, status.as_str(), error, now],
            )?)
        })
    }

    /// Overwrites a command's status. Last write wins. Returns rows
    /// changed: 0 for an unknown id.
    pub fn update_status(
        &self,
        id: CommandId,
        status: CommandStatus,
        error: Option<&str>,
    ) -> Result<usize, StoreError> {
        let now = to_millis(self.db.now());
        self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE commands SET status = ?2, error = ?3, executed_at = ?4 WHERE id = ?1",
                params![id.0, status.as_str(), error, now],
            )?)
        })
    }

    pub fn get(&self, id: CommandId) -> Result<Option<CommandRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("SELECT {COMMAND_COLUMNS} FROM commands c WHERE c.id = ?1");
            Ok(conn.query_row(&sql, [id.0], command_from_row).optional()?)
        })
    }

    /// The newest `limit` commands of a room, newest first, with
    /// human-readable sender and target labels.
    pub fn history(&self, room_id: RoomId, limit: u32) -> Result<Vec<HistoryEntry>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {COMMAND_COLUMNS}, s.display_name, COALESCE(t.display_name, t.member_id)
                 FROM commands c
                 LEFT JOIN members s ON s.room_id = c.room_id AND s.member_id = c.sender_id
                 LEFT JOIN members t ON c.target_kind = 'member'
                      AND t.room_id = c.room_id AND t.member_id = c.target_value
                 WHERE c.room_id = ?1
                 ORDER BY c.created_at DESC, c.id DESC
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![room_id.0, limit], |row| {
                let record = command_from_row(row)?;
                let sender_name: Option<String> = row.get(11)?;
                let target_member: Option<String> = row.get(12)?;
                let target_label = target_label(&record.target, target_member.as_deref());
                Ok(HistoryEntry {
                    record,
                    sender_name,
                    target_label,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    /// Deletes commands created before `cutoff`. Returns rows removed.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM commands WHERE created_at < ?1",
                [to_millis(cutoff)],
            )?)
        })
    }

    /// Number of logged commands for a room.
    pub fn count(&self, room_id: RoomId) -> Result<u64, StoreError> {
        let count: i64 = self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM commands WHERE room_id = ?1",
                [room_id.0],
                |row| row.get(0),
            )?)
        })?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

/// The label shown for a command's target in history.
///
/// `member_label` is the target member's display name (or id) when they
/// are still in the room.
pub fn target_label(target: &Target, member_label: Option<&str>) -> String {
    match target {
        Target::All => "all members".to_string(),
        Target::Member(_) => member_label.unwrap_or("specified member").to_string(),
        Target::Pattern(pattern) => format!("role {pattern}"),
    }
}

fn command_from_row(row: &Row<'_>) -> rusqlite::Result<CommandRecord> {
    let target_kind: String = row.get(3)?;
    let target_value: Option<String> = row.get(4)?;
    let target = Target::from_parts(&target_kind, target_value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    let raw_params: String = row.get(6)?;
    let params: Params = serde_json::from_str(&raw_params)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(CommandRecord {
        id: CommandId(row.get(0)?),
        room_id: RoomId(row.get(1)?),
        sender_id: MemberId(row.get(2)?),
        target,
        kind: parsed_column(row, 5)?,
        params,
        status: parsed_column(row, 7)?,
        error: row.get(8)?,
        created_at: time_column(row, 9)?,
        executed_at: opt_time_column(row, 10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_label_all_members() {
        assert_eq!(target_label(&Target::All, None), "all members");
    }

    #[test]
    fn test_target_label_member_present_and_gone() {
        let target = Target::Member(MemberId::new("b"));
        assert_eq!(target_label(&target, Some("Bravo")), "Bravo");
        assert_eq!(target_label(&target, None), "specified member");
    }

    #[test]
    fn test_target_label_pattern() {
        assert_eq!(target_label(&Target::Pattern("MT|ST".into()), None), "role MT|ST");
    }
}
