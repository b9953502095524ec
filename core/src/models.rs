use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_FOOD_NAME: &str = "Unknown Food";
pub const DEFAULT_SERVING_SIZE: &str = "1 portion";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nutrient {
    pub name: String,
    pub amount: String,
}

/// One logged food item. Created only from a successful estimate and never
/// edited afterwards; the log can only drop it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionRecord {
    pub id: String,
    pub name: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
    pub sugar: f64,
    pub serving_size: String,
    #[serde(default)]
    pub additional_nutrients: Vec<Nutrient>,
    /// Creation time in epoch milliseconds.
    pub timestamp: i64,
    /// `data:<mime>;base64,<payload>` for entries estimated from a photo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl NutritionRecord {
    #[must_use]
    pub fn is_from_image(&self) -> bool {
        self.image.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyGoal {
    pub calories: i64,
    pub protein: i64,
    pub carbs: i64,
    pub fat: i64,
}

impl Default for DailyGoal {
    fn default() -> Self {
        Self {
            calories: 2000,
            protein: 150,
            carbs: 200,
            fat: 70,
        }
    }
}

impl DailyGoal {
    #[must_use]
    pub fn get(&self, field: GoalField) -> i64 {
        match field {
            GoalField::Calories => self.calories,
            GoalField::Protein => self.protein,
            GoalField::Carbs => self.carbs,
            GoalField::Fat => self.fat,
        }
    }

    pub fn set(&mut self, field: GoalField, value: i64) {
        match field {
            GoalField::Calories => self.calories = value,
            GoalField::Protein => self.protein = value,
            GoalField::Carbs => self.carbs = value,
            GoalField::Fat => self.fat = value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalField {
    Calories,
    Protein,
    Carbs,
    Fat,
}

impl GoalField {
    pub const ALL: [GoalField; 4] = [
        GoalField::Calories,
        GoalField::Protein,
        GoalField::Carbs,
        GoalField::Fat,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            GoalField::Calories => "calories",
            GoalField::Protein => "protein",
            GoalField::Carbs => "carbs",
            GoalField::Fat => "fat",
        }
    }

    #[must_use]
    pub fn unit(self) -> &'static str {
        match self {
            GoalField::Calories => "kcal",
            _ => "g",
        }
    }
}

impl fmt::Display for GoalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GoalField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "calories" | "kcal" => Ok(GoalField::Calories),
            "protein" => Ok(GoalField::Protein),
            "carbs" => Ok(GoalField::Carbs),
            "fat" => Ok(GoalField::Fat),
            _ => bail!("Invalid goal field: {s}. Use calories, protein, carbs, or fat"),
        }
    }
}
