//! Persistent SQLite store of per-group member activity.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// One tracked member of a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecord {
    pub user_id: String,
    /// Group or room ID. `None` for one-to-one chats.
    pub group_id: Option<String>,
    pub display_name: String,
    /// `None` means tracked but never seen speaking.
    pub last_active: Option<DateTime<Utc>>,
}

/// Activity database. One long-lived connection, serialized by a mutex.
pub struct Database {
    conn: Mutex<Connection>,
}

/// Direct chats have no group; they are keyed under the empty string so the
/// composite primary key stays unique.
fn group_key(group_id: Option<&str>) -> &str {
    group_id.unwrap_or("")
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ActivityRecord> {
    let group_id: String = row.get(1)?;
    Ok(ActivityRecord {
        user_id: row.get(0)?,
        group_id: if group_id.is_empty() { None } else { Some(group_id) },
        display_name: row.get(2)?,
        last_active: parse_timestamp(row.get(3)?),
    })
}

impl Database {
    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema()?;
        info!("Opened activity database at {:?} ({} records)", path, db.total()?);
        Ok(db)
    }

    /// Create a throwaway in-memory database.
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database lock poisoned")
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS user_activity (
                user_id TEXT NOT NULL,
                group_id TEXT NOT NULL DEFAULT '',
                display_name TEXT NOT NULL,
                last_active TEXT,
                PRIMARY KEY (user_id, group_id)
            );

            CREATE INDEX IF NOT EXISTS idx_user_activity_group ON user_activity(group_id);
        "#,
        )
    }

    fn total(&self) -> rusqlite::Result<usize> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM user_activity", [], |row| row.get::<_, i64>(0))
            .map(|n| n as usize)
    }

    /// Record a member.
    ///
    /// With `touch` the member is marked active now. Without it the record is
    /// created with no timestamp; an existing timestamp is kept and only the
    /// display name is refreshed.
    pub fn upsert(
        &self,
        user_id: &str,
        group_id: Option<&str>,
        display_name: &str,
        touch: bool,
    ) -> rusqlite::Result<()> {
        if touch {
            return self.upsert_at(user_id, group_id, display_name, Some(Utc::now()));
        }

        self.conn().execute(
            "INSERT INTO user_activity (user_id, group_id, display_name, last_active)
             VALUES (?1, ?2, ?3, NULL)
             ON CONFLICT(user_id, group_id) DO UPDATE SET display_name = excluded.display_name",
            params![user_id, group_key(group_id), display_name],
        )?;
        debug!("Tracked {} ({}) in {:?}", display_name, user_id, group_id);
        Ok(())
    }

    /// Insert or replace a record with an explicit timestamp.
    pub fn upsert_at(
        &self,
        user_id: &str,
        group_id: Option<&str>,
        display_name: &str,
        last_active: Option<DateTime<Utc>>,
    ) -> rusqlite::Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO user_activity (user_id, group_id, display_name, last_active)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                user_id,
                group_key(group_id),
                display_name,
                last_active.map(format_timestamp)
            ],
        )?;
        Ok(())
    }

    /// Delete a record. Removing an unknown member is not an error.
    pub fn remove(&self, user_id: &str, group_id: Option<&str>) -> rusqlite::Result<()> {
        let n = self.conn().execute(
            "DELETE FROM user_activity WHERE user_id = ?1 AND group_id = ?2",
            params![user_id, group_key(group_id)],
        )?;
        debug!("Removed {} record(s) for {} in {:?}", n, user_id, group_id);
        Ok(())
    }

    pub fn exists(&self, user_id: &str, group_id: Option<&str>) -> rusqlite::Result<bool> {
        self.conn()
            .query_row(
                "SELECT 1 FROM user_activity WHERE user_id = ?1 AND group_id = ?2",
                params![user_id, group_key(group_id)],
                |_| Ok(()),
            )
            .optional()
            .map(|found| found.is_some())
    }

    pub fn count(&self, group_id: &str) -> rusqlite::Result<usize> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM user_activity WHERE group_id = ?1",
                params![group_id],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as usize)
    }

    /// Names and last-active times of everyone tracked in a group. Unordered.
    pub fn list_by_group(
        &self,
        group_id: &str,
    ) -> rusqlite::Result<Vec<(String, Option<DateTime<Utc>>)>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT display_name, last_active FROM user_activity WHERE group_id = ?1")?;
        let rows = stmt.query_map(params![group_id], |row| {
            Ok((row.get::<_, String>(0)?, parse_timestamp(row.get(1)?)))
        })?;
        rows.collect()
    }

    /// Full records for a group, ordered by display name.
    pub fn list_with_ids(&self, group_id: &str) -> rusqlite::Result<Vec<ActivityRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT user_id, group_id, display_name, last_active FROM user_activity
             WHERE group_id = ?1 ORDER BY display_name, user_id",
        )?;
        let rows = stmt.query_map(params![group_id], record_from_row)?;
        rows.collect()
    }

    /// Members who never spoke or were last seen before `cutoff`.
    /// Never-spoken first, then oldest first.
    pub fn inactive_since(
        &self,
        group_id: &str,
        cutoff: DateTime<Utc>,
    ) -> rusqlite::Result<Vec<ActivityRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT user_id, group_id, display_name, last_active FROM user_activity
             WHERE group_id = ?1 AND (last_active IS NULL OR last_active < ?2)
             ORDER BY last_active IS NOT NULL, last_active, display_name",
        )?;
        let rows = stmt.query_map(params![group_id, format_timestamp(cutoff)], record_from_row)?;
        rows.collect()
    }
}
