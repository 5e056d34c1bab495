//! The shared SQLite connection and schema.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};

use crate::clock::sub_duration;
use crate::{Clock, StoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS rooms (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    code            TEXT    NOT NULL,
    controller_id   TEXT    NOT NULL,
    name            TEXT,
    max_members     INTEGER NOT NULL,
    status          TEXT    NOT NULL DEFAULT 'active',
    created_at      INTEGER NOT NULL,
    expires_at      INTEGER NOT NULL,
    published_until INTEGER
);
CREATE UNIQUE INDEX IF NOT EXISTS rooms_active_code
    ON rooms(code) WHERE status = 'active';
CREATE UNIQUE INDEX IF NOT EXISTS rooms_active_controller
    ON rooms(controller_id) WHERE status = 'active';
CREATE INDEX IF NOT EXISTS rooms_code ON rooms(code);

CREATE TABLE IF NOT EXISTS members (
    room_id        INTEGER NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
    member_id      TEXT    NOT NULL,
    display_name   TEXT,
    world          TEXT,
    role           TEXT    NOT NULL,
    job_tag        TEXT,
    online         INTEGER NOT NULL DEFAULT 0,
    joined_at      INTEGER NOT NULL,
    last_active_at INTEGER NOT NULL,
    PRIMARY KEY (room_id, member_id)
);

CREATE TABLE IF NOT EXISTS commands (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    room_id      INTEGER NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
    sender_id    TEXT    NOT NULL,
    target_kind  TEXT    NOT NULL,
    target_value TEXT,
    kind         TEXT    NOT NULL,
    params       TEXT    NOT NULL DEFAULT '{}',
    status       TEXT    NOT NULL DEFAULT 'pending',
    error        TEXT,
    created_at   INTEGER NOT NULL,
    executed_at  INTEGER
);
CREATE INDEX IF NOT EXISTS commands_room_created ON commands(room_id, created_at, id);
CREATE INDEX IF NOT EXISTS commands_created ON commands(created_at);
";

/// One SQLite connection shared by the room store and the command log.
///
/// The connection sits behind a mutex, so every call is serialized.
/// Rooms and members number in the dozens, not millions; a single writer
/// is plenty.
pub struct Database {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl Database {
    /// Opens (or creates) a database file and applies the schema.
    ///
    /// # Errors
    /// Returns [`StoreError::Database`] if the file cannot be opened or
    /// the schema cannot be applied.
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::info!(path = %path.display(), journal_mode = %mode, "room database opened");
        Self::init(conn, clock)
    }

    /// A private in-memory database. Gone when dropped.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, clock)
    }

    fn init(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    /// Current time according to the injected clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The instant `age` before now. Saturates instead of overflowing.
    pub fn ago(&self, age: Duration) -> DateTime<Utc> {
        sub_duration(self.clock.now(), age)
    }

    /// Runs `f` with exclusive access to the connection.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        // A panic mid-call leaves SQLite itself consistent; keep going.
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Column helpers
// ---------------------------------------------------------------------------

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    from_millis(idx, millis)
}

pub(crate) fn opt_time_column(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let millis: Option<i64> = row.get(idx)?;
    millis.map(|m| from_millis(idx, m)).transpose()
}

fn from_millis(idx: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp {millis} out of range").into(),
        )
    })
}

/// Reads a text column through the type's `FromStr`.
pub(crate) fn parsed_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    fn db() -> Database {
        Database::in_memory(Arc::new(ManualClock::default())).unwrap()
    }

    #[test]
    fn test_in_memory_applies_schema() {
        let db = db();
        let tables: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
                     AND name IN ('rooms', 'members', 'commands')",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(tables, 3);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let db = db();
        let enabled: bool = db
            .with_conn(|conn| Ok(conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?))
            .unwrap();
        assert!(enabled);
    }

    #[test]
    fn test_millis_round_trip_through_sqlite() {
        let db = db();
        let now = db.now();
        let back = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT ?1", [to_millis(now)], |row| time_column(row, 0))?)
            })
            .unwrap();
        assert_eq!(back, now);
    }
}
