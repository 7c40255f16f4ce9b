//! SQLite persistence for accuracy state.
//!
//! Two tables:
//! - `accuracy_snapshots`: latest snapshot per tracker (restored on startup)
//! - `trade_outcomes`: append-only archive of resolved trades, one row per
//!   tracker and trade id

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::services::accuracy::{AccuracySnapshot, AccuracyStore};

/// SQLite store for accuracy snapshots and the outcome archive.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create a new SQLite store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("SQLite store initialized");
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!("In-memory SQLite store initialized");
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EngineError::Persistence("sqlite connection lock poisoned".to_string()))
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS accuracy_snapshots (
                name TEXT PRIMARY KEY,
                snapshot_json TEXT NOT NULL,
                hit_rate REAL NOT NULL,
                weight REAL NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trade_outcomes (
                tracker TEXT NOT NULL,
                trade_id TEXT NOT NULL,
                correct INTEGER NOT NULL,
                recorded_at INTEGER NOT NULL,
                PRIMARY KEY (tracker, trade_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_outcomes_recorded
             ON trade_outcomes(tracker, recorded_at DESC)",
            [],
        )?;

        info!("SQLite schema initialized");
        Ok(())
    }

    // ========== Outcome Archive ==========

    /// Archive a resolved trade. Returns false if it was already archived.
    pub fn archive_outcome(&self, tracker: &str, trade_id: &str, correct: bool) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO trade_outcomes (tracker, trade_id, correct, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![tracker, trade_id, correct, Utc::now().timestamp_millis()],
        )?;
        if inserted == 0 {
            debug!("Outcome {} already archived for {}", trade_id, tracker);
        }
        Ok(inserted > 0)
    }

    /// Most recent archived outcomes for a tracker, oldest first.
    pub fn recent_outcomes(&self, tracker: &str, limit: usize) -> Result<Vec<bool>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT correct FROM trade_outcomes
             WHERE tracker = ?1
             ORDER BY recorded_at DESC, rowid DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![tracker, limit as i64], |row| row.get::<_, bool>(0))?;
        let mut outcomes = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        outcomes.reverse();
        Ok(outcomes)
    }

    /// Total archived outcomes for a tracker.
    pub fn outcome_count(&self, tracker: &str) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM trade_outcomes WHERE tracker = ?1",
            params![tracker],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl AccuracyStore for SqliteStore {
    fn load(&self, name: &str) -> Result<Option<AccuracySnapshot>> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT snapshot_json FROM accuracy_snapshots WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => match serde_json::from_str(&json) {
                Ok(snapshot) => Ok(Some(snapshot)),
                Err(e) => {
                    warn!("Ignoring unreadable snapshot for {}: {}", name, e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    fn archive(&self, tracker: &str, trade_id: &str, correct: bool) -> Result<bool> {
        self.archive_outcome(tracker, trade_id, correct)
    }

    fn save(&self, name: &str, snapshot: &AccuracySnapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO accuracy_snapshots (name, snapshot_json, hit_rate, weight, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(name) DO UPDATE SET
                snapshot_json = excluded.snapshot_json,
                hit_rate = excluded.hit_rate,
                weight = excluded.weight,
                updated_at = excluded.updated_at",
            params![
                name,
                json,
                snapshot.hit_rate,
                snapshot.weight,
                snapshot.updated_at.timestamp_millis(),
            ],
        )?;
        debug!("Saved accuracy snapshot for {}", name);
        Ok(())
    }
}
