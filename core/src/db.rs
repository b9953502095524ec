use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension, params};

/// Key holding the serialized food log (JSON array of records).
pub const HISTORY_KEY: &str = "nutri_history";
/// Key holding the serialized daily goal (JSON object).
pub const GOAL_KEY: &str = "nutri_goal";

/// Flat key-value store backed by a single SQLite table.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS kv_store (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to read '{key}'"))?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO kv_store (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .with_context(|| format!("Failed to write '{key}'"))?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }
}

/// Something that went wrong while reading persisted state. Loads never fail;
/// they fall back to defaults and report what they absorbed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadIssue {
    #[error("could not read '{key}': {reason}")]
    Unavailable { key: &'static str, reason: String },
    #[error("stored '{key}' is malformed: {reason}")]
    Corrupt { key: &'static str, reason: String },
    #[error("skipped {count} unreadable entries in '{key}'")]
    SkippedEntries { key: &'static str, count: usize },
    #[error("'{key}' was missing {}, defaults used", .fields.join(", "))]
    MissingFields {
        key: &'static str,
        fields: Vec<&'static str>,
    },
}

#[derive(Debug)]
pub struct Loaded<T> {
    pub value: T,
    pub issues: Vec<LoadIssue>,
}

impl<T> Loaded<T> {
    #[must_use]
    pub fn clean(value: T) -> Self {
        Self {
            value,
            issues: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

#[cfg(test)]
impl Database {
    /// Reject every later write, to exercise failure paths.
    pub(crate) fn deny_writes(&self) {
        self.conn.pragma_update(None, "query_only", true).unwrap();
    }
}
