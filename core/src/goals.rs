use anyhow::Result;
use serde_json::Value;
use tracing::{debug, warn};

use crate::db::{Database, GOAL_KEY, LoadIssue, Loaded};
use crate::models::{DailyGoal, GoalField};

/// The user's daily targets. Every change is written back under [`GOAL_KEY`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoalStore {
    goal: DailyGoal,
}

impl GoalStore {
    /// Read the persisted goal. Absent or unreadable data yields the defaults;
    /// a partially specified goal is completed field by field.
    pub fn load(db: &Database) -> Loaded<Self> {
        let raw = match db.get(GOAL_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("no stored goal, using defaults");
                return Loaded::clean(Self::default());
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "failed to read goal, using defaults");
                return Loaded {
                    value: Self::default(),
                    issues: vec![LoadIssue::Unavailable {
                        key: GOAL_KEY,
                        reason: format!("{e:#}"),
                    }],
                };
            }
        };

        let stored: Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "stored goal is not JSON, using defaults");
                return Loaded {
                    value: Self::default(),
                    issues: vec![LoadIssue::Corrupt {
                        key: GOAL_KEY,
                        reason: e.to_string(),
                    }],
                };
            }
        };

        let (goal, missing) = merge_goal(&stored);
        let mut issues = Vec::new();
        if !stored.is_object() {
            warn!("stored goal is not an object, using defaults");
            issues.push(LoadIssue::Corrupt {
                key: GOAL_KEY,
                reason: "expected an object".to_string(),
            });
        } else if !missing.is_empty() {
            let fields: Vec<&'static str> = missing.iter().map(|f| f.as_str()).collect();
            warn!(?fields, "stored goal incomplete, filling defaults");
            issues.push(LoadIssue::MissingFields {
                key: GOAL_KEY,
                fields,
            });
        }

        Loaded {
            value: Self { goal },
            issues,
        }
    }

    #[must_use]
    pub fn goal(&self) -> &DailyGoal {
        &self.goal
    }

    /// Set one field from raw user input. Input that is not an integer counts
    /// as 0; this is not reported back.
    pub fn update(&mut self, db: &Database, field: GoalField, raw: &str) -> Result<DailyGoal> {
        let value = parse_goal_value(raw);
        let mut goal = self.goal;
        goal.set(field, value);
        save_goal(db, &goal)?;
        self.goal = goal;
        debug!(%field, value, "goal updated");
        Ok(goal)
    }

    pub fn reset(&mut self, db: &Database) -> Result<DailyGoal> {
        let goal = DailyGoal::default();
        save_goal(db, &goal)?;
        self.goal = goal;
        Ok(goal)
    }
}

fn save_goal(db: &Database, goal: &DailyGoal) -> Result<()> {
    let json = serde_json::to_string(goal)?;
    db.set(GOAL_KEY, &json)
}

/// Build a complete goal from a stored value, taking each field that holds a
/// number and the default for every other one. Returns the defaulted fields.
#[must_use]
pub fn merge_goal(stored: &Value) -> (DailyGoal, Vec<GoalField>) {
    let defaults = DailyGoal::default();
    let mut goal = defaults;
    let mut missing = Vec::new();

    for field in GoalField::ALL {
        match stored.get(field.as_str()).and_then(numeric_goal_value) {
            Some(v) => goal.set(field, v),
            None => {
                goal.set(field, defaults.get(field));
                missing.push(field);
            }
        }
    }

    (goal, missing)
}

fn numeric_goal_value(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| {
        v.as_f64()
            .filter(|f| f.is_finite())
            .map(|f| f.trunc() as i64)
    })
}

/// Leading-integer parse: optional whitespace and sign, then as many ASCII
/// digits as are present. `"12abc"` is 12, `"3.7"` is 3, `"abc"` is 0.
#[must_use]
pub fn parse_goal_value(raw: &str) -> i64 {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut value: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        value = value.saturating_mul(10).saturating_add(i64::from(b - b'0'));
    }

    if negative { -value } else { value }
}
