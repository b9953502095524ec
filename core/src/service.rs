use std::path::Path;

use anyhow::Result;
use tracing::{error, info};

use crate::db::{Database, LoadIssue};
use crate::estimate::{EstimationError, EstimationGateway, NutritionEstimator};
use crate::food_log::FoodLog;
use crate::goals::GoalStore;
use crate::models::{DailyGoal, GoalField, NutritionRecord};
use crate::summary::{NutritionSummary, summarize};

/// Owns the store and both state containers for one session. Callers get
/// read access to the state and go through these methods to change it.
pub struct NutriService {
    db: Database,
    goals: GoalStore,
    log: FoodLog,
    load_issues: Vec<LoadIssue>,
}

impl NutriService {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_database(Database::open(path)?))
    }

    pub fn new_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    #[must_use]
    pub fn from_database(db: Database) -> Self {
        let goals = GoalStore::load(&db);
        let log = FoodLog::load(&db);
        let mut load_issues = goals.issues;
        load_issues.extend(log.issues);
        Self {
            db,
            goals: goals.value,
            log: log.value,
            load_issues,
        }
    }

    /// Problems absorbed while loading persisted state.
    #[must_use]
    pub fn load_issues(&self) -> &[LoadIssue] {
        &self.load_issues
    }

    #[must_use]
    pub fn goal(&self) -> &DailyGoal {
        self.goals.goal()
    }

    #[must_use]
    pub fn log(&self) -> &FoodLog {
        &self.log
    }

    #[must_use]
    pub fn summary(&self) -> NutritionSummary {
        summarize(self.log.entries(), self.goals.goal())
    }

    pub fn update_goal(&mut self, field: GoalField, raw: &str) -> Result<DailyGoal> {
        self.goals.update(&self.db, field, raw)
    }

    pub fn reset_goal(&mut self) -> Result<DailyGoal> {
        self.goals.reset(&self.db)
    }

    pub fn add_record(&mut self, record: NutritionRecord) -> Result<()> {
        self.log.add(&self.db, record)
    }

    pub fn remove_entry(&mut self, id: &str) -> Result<Option<NutritionRecord>> {
        self.log.remove(&self.db, id)
    }

    /// Estimate a described food and log it. Blank input is ignored without
    /// contacting the service. On failure the log is left untouched and the
    /// error carries an [`EstimationError`].
    pub async fn log_text<E: NutritionEstimator>(
        &mut self,
        gateway: &EstimationGateway<E>,
        description: &str,
    ) -> Result<Option<NutritionRecord>> {
        let outcome = gateway.estimate_from_text(description).await;
        self.log_outcome(outcome)
    }

    pub async fn log_image<E: NutritionEstimator>(
        &mut self,
        gateway: &EstimationGateway<E>,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<Option<NutritionRecord>> {
        let outcome = gateway.estimate_from_image(bytes, mime_type).await;
        self.log_outcome(outcome)
    }

    fn log_outcome(
        &mut self,
        outcome: Result<NutritionRecord, EstimationError>,
    ) -> Result<Option<NutritionRecord>> {
        match outcome {
            Ok(record) => {
                info!(id = %record.id, name = %record.name, "logged estimate");
                self.log.add(&self.db, record.clone())?;
                Ok(Some(record))
            }
            Err(EstimationError::EmptyInput) => Ok(None),
            Err(e) => {
                error!(error = %e, "estimation failed");
                Err(e.into())
            }
        }
    }
}
