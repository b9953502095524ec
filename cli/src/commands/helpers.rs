use std::path::Path;

use chrono::{Local, TimeZone};
use serde::Serialize;

use nutriscan_core::estimate::DEFAULT_IMAGE_MIME;
use nutriscan_core::food_log::FoodLog;
use nutriscan_core::models::{Nutrient, NutritionRecord};

/// How many extra nutrients a log row shows.
pub(crate) const NOTE_NUTRIENTS: usize = 3;

/// JSON shape of a log entry. The image data URL is replaced by a flag so
/// listings stay readable.
#[derive(Debug, Serialize)]
pub(crate) struct EntryView<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub serving_size: &'a str,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
    pub sugar: f64,
    pub additional_nutrients: &'a [Nutrient],
    pub timestamp: i64,
    pub time: String,
    pub has_image: bool,
}

impl<'a> From<&'a NutritionRecord> for EntryView<'a> {
    fn from(r: &'a NutritionRecord) -> Self {
        EntryView {
            id: &r.id,
            name: &r.name,
            serving_size: &r.serving_size,
            calories: r.calories,
            protein: r.protein,
            carbs: r.carbs,
            fat: r.fat,
            fiber: r.fiber,
            sugar: r.sugar,
            additional_nutrients: &r.additional_nutrients,
            timestamp: r.timestamp,
            time: format_time(r.timestamp),
            has_image: r.is_from_image(),
        }
    }
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

/// Local wall-clock `HH:MM` for a millisecond timestamp.
pub(crate) fn format_time(timestamp_ms: i64) -> String {
    Local
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .map_or_else(|| "--:--".to_string(), |t| t.format("%H:%M").to_string())
}

/// "Vitamin C: 8mg, Iron: 1mg" for the first few extra nutrients.
pub(crate) fn format_nutrients(nutrients: &[Nutrient], max: usize) -> String {
    nutrients
        .iter()
        .take(max)
        .map(|n| format!("{}: {}", n.name, n.amount))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Text bar of `width` cells filled in proportion to `pct` (0-100).
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub(crate) fn progress_bar(pct: f64, width: usize) -> String {
    let filled = ((pct.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    let filled = filled.min(width);
    format!("[{}{}]", "#".repeat(filled), ".".repeat(width - filled))
}

/// MIME type for an image file, judged by its extension.
pub(crate) fn mime_from_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "gif" => "image/gif",
        _ => DEFAULT_IMAGE_MIME,
    }
}

/// Find an entry by exact ID, or by a prefix that matches exactly one entry.
pub(crate) fn resolve_entry_id(log: &FoodLog, input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Some(e) = log.get(input) {
        return Some(e.id.clone());
    }
    let mut matches = log.entries().iter().filter(|e| e.id.starts_with(input));
    match (matches.next(), matches.next()) {
        (Some(e), None) => Some(e.id.clone()),
        _ => None,
    }
}
