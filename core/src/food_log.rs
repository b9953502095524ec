use anyhow::Result;
use chrono::{DateTime, Local, LocalResult, NaiveTime, TimeZone};
use serde_json::Value;
use tracing::{debug, warn};

use crate::db::{Database, HISTORY_KEY, LoadIssue, Loaded};
use crate::models::NutritionRecord;

/// Today's logged entries in insertion (chronological) order. The whole
/// collection is written back under [`HISTORY_KEY`] after every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FoodLog {
    entries: Vec<NutritionRecord>,
}

impl FoodLog {
    pub fn load(db: &Database) -> Loaded<Self> {
        Self::load_at(db, Local::now())
    }

    /// Load the entries logged on the local calendar day containing `now`.
    /// Earlier entries are dropped and the trimmed log is written back.
    pub fn load_at(db: &Database, now: DateTime<Local>) -> Loaded<Self> {
        let raw = match db.get(HISTORY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Loaded::clean(Self::default()),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "failed to read food log, starting empty");
                return Loaded {
                    value: Self::default(),
                    issues: vec![LoadIssue::Unavailable {
                        key: HISTORY_KEY,
                        reason: format!("{e:#}"),
                    }],
                };
            }
        };

        let day_start = start_of_local_day(now);
        let parsed = parse_history(&raw, day_start);

        let log = Self {
            entries: parsed.entries,
        };

        if parsed.dropped > 0 || !parsed.issues.is_empty() {
            debug!(
                kept = log.entries.len(),
                dropped = parsed.dropped,
                "trimming stored food log to today"
            );
            if let Err(e) = log.save(db) {
                warn!(error = %format!("{e:#}"), "failed to write trimmed food log");
            }
        }

        Loaded {
            value: log,
            issues: parsed.issues,
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[NutritionRecord] {
        &self.entries
    }

    /// Entries in display order: most recently added first.
    pub fn recent_first(&self) -> impl Iterator<Item = &NutritionRecord> {
        self.entries.iter().rev()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&NutritionRecord> {
        self.entries.iter().find(|e| e.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add(&mut self, db: &Database, record: NutritionRecord) -> Result<()> {
        debug!(id = %record.id, name = %record.name, "adding entry");
        self.entries.push(record);
        if let Err(e) = self.save(db) {
            self.entries.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Remove the entry with `id`. Unknown ids leave the log as it is. When
    /// the write fails the entry stays in place.
    pub fn remove(&mut self, db: &Database, id: &str) -> Result<Option<NutritionRecord>> {
        let Some(idx) = self.entries.iter().position(|e| e.id == id) else {
            debug!(id, "no entry to remove");
            self.save(db)?;
            return Ok(None);
        };
        let removed = self.entries.remove(idx);
        if let Err(e) = self.save(db) {
            self.entries.insert(idx, removed);
            return Err(e);
        }
        Ok(Some(removed))
    }

    fn save(&self, db: &Database) -> Result<()> {
        let json = serde_json::to_string(&self.entries)?;
        db.set(HISTORY_KEY, &json)
    }
}

struct ParsedHistory {
    entries: Vec<NutritionRecord>,
    dropped: usize,
    issues: Vec<LoadIssue>,
}

/// Decode a stored history blob, keeping well-formed entries stamped at or
/// after `day_start` (epoch ms).
fn parse_history(raw: &str, day_start: i64) -> ParsedHistory {
    let items = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items,
        Ok(_) => {
            warn!("stored food log is not an array, starting empty");
            return ParsedHistory {
                entries: Vec::new(),
                dropped: 0,
                issues: vec![LoadIssue::Corrupt {
                    key: HISTORY_KEY,
                    reason: "expected an array".to_string(),
                }],
            };
        }
        Err(e) => {
            warn!(error = %e, "stored food log is not JSON, starting empty");
            return ParsedHistory {
                entries: Vec::new(),
                dropped: 0,
                issues: vec![LoadIssue::Corrupt {
                    key: HISTORY_KEY,
                    reason: e.to_string(),
                }],
            };
        }
    };

    let mut entries = Vec::with_capacity(items.len());
    let mut skipped = 0;
    let mut dropped = 0;
    for item in items {
        match serde_json::from_value::<NutritionRecord>(item) {
            Ok(record) if record.timestamp >= day_start => entries.push(record),
            Ok(_) => dropped += 1,
            Err(e) => {
                debug!(error = %e, "skipping unreadable food log entry");
                skipped += 1;
            }
        }
    }

    let mut issues = Vec::new();
    if skipped > 0 {
        warn!(count = skipped, "skipped unreadable food log entries");
        issues.push(LoadIssue::SkippedEntries {
            key: HISTORY_KEY,
            count: skipped,
        });
    }

    ParsedHistory {
        entries,
        dropped,
        issues,
    }
}

/// Epoch milliseconds of local 00:00:00.000 on the day containing `now`.
#[must_use]
pub fn start_of_local_day(now: DateTime<Local>) -> i64 {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&midnight) {
        LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => t.timestamp_millis(),
        // Midnight skipped by a DST jump: the day starts at the first valid instant
        LocalResult::None => {
            let utc_guess = midnight - *now.offset();
            Local.from_utc_datetime(&utc_guess).timestamp_millis()
        }
    }
}
