//! # Torneo DB
//! Sqlite-backed persistence. One connection behind a mutex — the command
//! bridge serializes every read-modify-write above this layer, the inner
//! mutex only keeps rusqlite happy across tasks.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use torneo_core::error::{Result, TorneoError};
use torneo_core::types::{CalendarEvent, Notification, Participant, TriviaEntry};

/// All durable tournament state: participants, notification and calendar
/// rows, and the joke/trivia content banks.
pub struct TournamentDb {
    conn: Mutex<Connection>,
}

fn storage_err(e: impl std::fmt::Display) -> TorneoError {
    TorneoError::Storage(e.to_string())
}

impl TournamentDb {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(storage_err)?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    /// Ephemeral in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(storage_err)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS participants (
                user_id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                points INTEGER NOT NULL DEFAULT 0,
                medals INTEGER NOT NULL DEFAULT 0,
                stage INTEGER NOT NULL DEFAULT 1,
                badges TEXT NOT NULL DEFAULT '[]',   -- JSON array of tags
                joined_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                scheduled_time TEXT NOT NULL,
                recipients TEXT NOT NULL,
                message TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS calendar_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_time TEXT NOT NULL,
                description TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS jokes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                body TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS trivia (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                hint TEXT NOT NULL
            );

            -- process-wide scalars (current stage survives restarts)
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )
        .map_err(storage_err)?;
        Ok(())
    }

    // ─── Participants ──────────────────────────────────────

    pub fn upsert_participant(&self, p: &Participant) -> Result<()> {
        let conn = self.conn.lock().map_err(storage_err)?;
        let badges = serde_json::to_string(&p.badges).unwrap_or_else(|_| "[]".into());
        conn.execute(
            "INSERT INTO participants (user_id, display_name, points, medals, stage, badges, joined_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(user_id) DO UPDATE SET
                display_name = excluded.display_name,
                points = excluded.points,
                medals = excluded.medals,
                stage = excluded.stage,
                badges = excluded.badges",
            rusqlite::params![
                p.user_id,
                p.display_name,
                p.points,
                p.medals,
                p.stage,
                badges,
                p.joined_at.to_rfc3339(),
            ],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    pub fn get_participant(&self, user_id: &str) -> Result<Option<Participant>> {
        let conn = self.conn.lock().map_err(storage_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT user_id, display_name, points, medals, stage, badges, joined_at
                 FROM participants WHERE user_id = ?1",
            )
            .map_err(storage_err)?;
        let row = stmt
            .query_row([user_id], row_to_participant)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .map_err(storage_err)?;
        Ok(row)
    }

    /// All participants in registration order — the ranking tie-break.
    pub fn list_participants(&self) -> Result<Vec<Participant>> {
        let conn = self.conn.lock().map_err(storage_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT user_id, display_name, points, medals, stage, badges, joined_at
                 FROM participants ORDER BY joined_at, rowid",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([], row_to_participant)
            .map_err(storage_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Ok(rows)
    }

    /// User ids of everyone currently at the given stage.
    pub fn participants_at_stage(&self, stage: u32) -> Result<Vec<String>> {
        let conn = self.conn.lock().map_err(storage_err)?;
        let mut stmt = conn
            .prepare("SELECT user_id FROM participants WHERE stage = ?1 ORDER BY joined_at, rowid")
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([stage], |row| row.get::<_, String>(0))
            .map_err(storage_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Ok(rows)
    }

    /// Move every participant to `stage` in one statement.
    pub fn set_all_stages(&self, stage: u32) -> Result<()> {
        let conn = self.conn.lock().map_err(storage_err)?;
        conn.execute("UPDATE participants SET stage = ?1", [stage])
            .map_err(storage_err)?;
        Ok(())
    }

    /// Idempotent delete — removing an absent participant is a no-op.
    pub fn delete_participant(&self, user_id: &str) -> Result<()> {
        let conn = self.conn.lock().map_err(storage_err)?;
        conn.execute("DELETE FROM participants WHERE user_id = ?1", [user_id])
            .map_err(storage_err)?;
        Ok(())
    }

    // ─── Notifications ──────────────────────────────────────

    pub fn insert_notification(
        &self,
        scheduled_time: DateTime<Utc>,
        recipients: &str,
        message: &str,
    ) -> Result<i64> {
        let conn = self.conn.lock().map_err(storage_err)?;
        conn.execute(
            "INSERT INTO notifications (scheduled_time, recipients, message) VALUES (?1, ?2, ?3)",
            rusqlite::params![scheduled_time.to_rfc3339(), recipients, message],
        )
        .map_err(storage_err)?;
        Ok(conn.last_insert_rowid())
    }

    /// Every notification whose scheduled time is at or before `now`.
    pub fn due_notifications(&self, now: DateTime<Utc>) -> Result<Vec<Notification>> {
        let conn = self.conn.lock().map_err(storage_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, scheduled_time, recipients, message FROM notifications
                 WHERE scheduled_time <= ?1 ORDER BY scheduled_time, id",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([now.to_rfc3339()], row_to_notification)
            .map_err(storage_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Ok(rows)
    }

    pub fn list_notifications(&self) -> Result<Vec<Notification>> {
        let conn = self.conn.lock().map_err(storage_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, scheduled_time, recipients, message FROM notifications
                 ORDER BY scheduled_time, id",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([], row_to_notification)
            .map_err(storage_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Ok(rows)
    }

    pub fn delete_notification(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().map_err(storage_err)?;
        conn.execute("DELETE FROM notifications WHERE id = ?1", [id])
            .map_err(storage_err)?;
        Ok(())
    }

    // ─── Calendar ──────────────────────────────────────────

    pub fn insert_calendar_event(
        &self,
        event_time: DateTime<Utc>,
        description: &str,
    ) -> Result<i64> {
        let conn = self.conn.lock().map_err(storage_err)?;
        conn.execute(
            "INSERT INTO calendar_events (event_time, description) VALUES (?1, ?2)",
            rusqlite::params![event_time.to_rfc3339(), description],
        )
        .map_err(storage_err)?;
        Ok(conn.last_insert_rowid())
    }

    /// Events at or after `now`, soonest first.
    pub fn upcoming_events(&self, now: DateTime<Utc>) -> Result<Vec<CalendarEvent>> {
        let conn = self.conn.lock().map_err(storage_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, event_time, description FROM calendar_events
                 WHERE event_time >= ?1 ORDER BY event_time, id",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map([now.to_rfc3339()], |row| {
                Ok(CalendarEvent {
                    id: row.get(0)?,
                    event_time: parse_ts(row.get::<_, String>(1)?),
                    description: row.get(2)?,
                })
            })
            .map_err(storage_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Ok(rows)
    }

    // ─── Content banks ─────────────────────────────────────

    /// Batch-commit jokes from a capture session. One transaction.
    pub fn insert_jokes(&self, jokes: &[String]) -> Result<usize> {
        let mut conn = self.conn.lock().map_err(storage_err)?;
        let tx = conn.transaction().map_err(storage_err)?;
        for joke in jokes {
            tx.execute("INSERT INTO jokes (body) VALUES (?1)", [joke])
                .map_err(storage_err)?;
        }
        tx.commit().map_err(storage_err)?;
        Ok(jokes.len())
    }

    pub fn random_joke(&self) -> Result<Option<String>> {
        let conn = self.conn.lock().map_err(storage_err)?;
        let joke = conn
            .query_row("SELECT body FROM jokes ORDER BY RANDOM() LIMIT 1", [], |row| {
                row.get::<_, String>(0)
            })
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(String::new()),
                other => Err(other),
            })
            .map_err(storage_err)?;
        Ok(if joke.is_empty() { None } else { Some(joke) })
    }

    /// Batch-commit trivia entries from a capture session. One transaction.
    pub fn insert_trivia(&self, entries: &[TriviaEntry]) -> Result<usize> {
        let mut conn = self.conn.lock().map_err(storage_err)?;
        let tx = conn.transaction().map_err(storage_err)?;
        for t in entries {
            tx.execute(
                "INSERT INTO trivia (question, answer, hint) VALUES (?1, ?2, ?3)",
                rusqlite::params![t.question, t.answer, t.hint],
            )
            .map_err(storage_err)?;
        }
        tx.commit().map_err(storage_err)?;
        Ok(entries.len())
    }

    pub fn random_trivia(&self) -> Result<Option<TriviaEntry>> {
        let conn = self.conn.lock().map_err(storage_err)?;
        let entry = conn
            .query_row(
                "SELECT question, answer, hint FROM trivia ORDER BY RANDOM() LIMIT 1",
                [],
                |row| {
                    Ok(TriviaEntry {
                        question: row.get(0)?,
                        answer: row.get(1)?,
                        hint: row.get(2)?,
                    })
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .map_err(storage_err)?;
        Ok(entry)
    }

    // ─── Meta ──────────────────────────────────────────────

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().map_err(storage_err)?;
        let value = conn
            .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
                row.get::<_, String>(0)
            })
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .map_err(storage_err)?;
        Ok(value)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().map_err(storage_err)?;
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            [key, value],
        )
        .map_err(storage_err)?;
        Ok(())
    }
}

fn row_to_participant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Participant> {
    let badges: String = row.get(5)?;
    Ok(Participant {
        user_id: row.get(0)?,
        display_name: row.get(1)?,
        points: row.get(2)?,
        medals: row.get(3)?,
        stage: row.get(4)?,
        badges: serde_json::from_str(&badges).unwrap_or_default(),
        joined_at: parse_ts(row.get::<_, String>(6)?),
    })
}

fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        scheduled_time: parse_ts(row.get::<_, String>(1)?),
        recipients: row.get(2)?,
        message: row.get(3)?,
    })
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
