use serde::Serialize;

use crate::models::{DailyGoal, NutritionRecord};

/// Energy densities used for the calorie breakdown.
pub const PROTEIN_KCAL_PER_G: f64 = 4.0;
pub const CARBS_KCAL_PER_G: f64 = 4.0;
pub const FAT_KCAL_PER_G: f64 = 9.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Macro {
    Protein,
    Carbs,
    Fat,
}

impl Macro {
    pub const ALL: [Macro; 3] = [Macro::Protein, Macro::Carbs, Macro::Fat];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Macro::Protein => "Protein",
            Macro::Carbs => "Carbs",
            Macro::Fat => "Fat",
        }
    }

    #[must_use]
    pub fn kcal_per_gram(self) -> f64 {
        match self {
            Macro::Protein => PROTEIN_KCAL_PER_G,
            Macro::Carbs => CARBS_KCAL_PER_G,
            Macro::Fat => FAT_KCAL_PER_G,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl Totals {
    #[must_use]
    pub fn from_entries(entries: &[NutritionRecord]) -> Self {
        entries.iter().fold(Self::default(), |acc, e| Self {
            calories: acc.calories + e.calories,
            protein: acc.protein + e.protein,
            carbs: acc.carbs + e.carbs,
            fat: acc.fat + e.fat,
        })
    }

    #[must_use]
    pub fn grams(&self, m: Macro) -> f64 {
        match m {
            Macro::Protein => self.protein,
            Macro::Carbs => self.carbs,
            Macro::Fat => self.fat,
        }
    }
}

/// Calories contributed by each macro.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CalorieBreakdown {
    pub protein_kcal: f64,
    pub carbs_kcal: f64,
    pub fat_kcal: f64,
}

impl CalorieBreakdown {
    #[must_use]
    pub fn from_totals(totals: &Totals) -> Self {
        Self {
            protein_kcal: totals.protein * PROTEIN_KCAL_PER_G,
            carbs_kcal: totals.carbs * CARBS_KCAL_PER_G,
            fat_kcal: totals.fat * FAT_KCAL_PER_G,
        }
    }

    #[must_use]
    pub fn kcal(&self, m: Macro) -> f64 {
        match m {
            Macro::Protein => self.protein_kcal,
            Macro::Carbs => self.carbs_kcal,
            Macro::Fat => self.fat_kcal,
        }
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        self.protein_kcal + self.carbs_kcal + self.fat_kcal
    }

    /// Percent share of protein, carbs and fat. `None` when nothing was eaten.
    #[must_use]
    pub fn shares(&self) -> Option<[f64; 3]> {
        let total = self.total();
        if total <= 0.0 {
            return None;
        }
        Some([
            self.protein_kcal / total * 100.0,
            self.carbs_kcal / total * 100.0,
            self.fat_kcal / total * 100.0,
        ])
    }
}

/// Derived view over today's log and goal. Cheap enough to rebuild on every
/// render, so nothing here is cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NutritionSummary {
    pub entry_count: usize,
    pub totals: Totals,
    pub goal: DailyGoal,
    pub calorie_progress: f64,
    pub protein_progress: f64,
    pub carbs_progress: f64,
    pub fat_progress: f64,
    pub remaining_calories: f64,
    pub breakdown: CalorieBreakdown,
}

impl NutritionSummary {
    #[must_use]
    pub fn macro_progress(&self, m: Macro) -> f64 {
        match m {
            Macro::Protein => self.protein_progress,
            Macro::Carbs => self.carbs_progress,
            Macro::Fat => self.fat_progress,
        }
    }

    #[must_use]
    pub fn macro_goal(&self, m: Macro) -> i64 {
        match m {
            Macro::Protein => self.goal.protein,
            Macro::Carbs => self.goal.carbs,
            Macro::Fat => self.goal.fat,
        }
    }
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn summarize(entries: &[NutritionRecord], goal: &DailyGoal) -> NutritionSummary {
    let totals = Totals::from_entries(entries);
    NutritionSummary {
        entry_count: entries.len(),
        totals,
        goal: *goal,
        calorie_progress: capped_progress(totals.calories, goal.calories),
        protein_progress: capped_progress(totals.protein, goal.protein),
        carbs_progress: capped_progress(totals.carbs, goal.carbs),
        fat_progress: capped_progress(totals.fat, goal.fat),
        remaining_calories: goal.calories as f64 - totals.calories,
        breakdown: CalorieBreakdown::from_totals(&totals),
    }
}

/// `current / target` as a percentage clamped to `[0, 100]`. A target of zero
/// or less has nothing to measure against and reports 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn capped_progress(current: f64, target: i64) -> f64 {
    if target <= 0 {
        return 0.0;
    }
    let pct = current / target as f64 * 100.0;
    if pct.is_nan() {
        return 0.0;
    }
    pct.clamp(0.0, 100.0)
}
