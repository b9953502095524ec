use anyhow::Result;
use chrono::Local;

use nutriscan_core::service::NutriService;
use nutriscan_core::summary::{Macro, NutritionSummary};

use super::helpers::{no_neg_zero, progress_bar};

const BAR_WIDTH: usize = 20;

pub(crate) fn cmd_summary(service: &NutriService, json: bool) -> Result<()> {
    let summary = service.summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let date = Local::now().format("%Y-%m-%d");
    println!("=== Daily Progress {date} ===\n");
    for line in progress_lines(&summary) {
        println!("  {line}");
    }
    println!();

    let remaining = no_neg_zero(summary.remaining_calories);
    if remaining >= 0.0 {
        println!("  REMAINING: {remaining:.0} kcal");
    } else {
        let over = -remaining;
        println!("  OVER GOAL: {over:.0} kcal");
    }

    if let Some(shares) = summary.breakdown.shares() {
        let parts: Vec<String> = Macro::ALL
            .iter()
            .zip(shares)
            .map(|(m, pct)| format!("{} {pct:.0}%", m.label()))
            .collect();
        println!("  Calories from: {}", parts.join(" · "));
    }

    let count = summary.entry_count;
    let noun = if count == 1 { "entry" } else { "entries" };
    println!("\n  {count} {noun} today");
    Ok(())
}

fn progress_lines(summary: &NutritionSummary) -> Vec<String> {
    let cal = no_neg_zero(summary.totals.calories);
    let cal_goal = summary.goal.calories;
    let pct = summary.calorie_progress;
    let amount = format!("{cal:.0} / {cal_goal} kcal");
    let mut lines = vec![format!(
        "{:<9}{amount:>14}  {}  {pct:>3.0}%",
        "Calories",
        progress_bar(pct, BAR_WIDTH)
    )];

    for m in Macro::ALL {
        let grams = no_neg_zero(summary.totals.grams(m));
        let goal = summary.macro_goal(m);
        let pct = summary.macro_progress(m);
        let amount = format!("{grams:.1} / {goal}g");
        lines.push(format!(
            "{:<9}{amount:>14}  {}  {pct:>3.0}%",
            m.label(),
            progress_bar(pct, BAR_WIDTH)
        ));
    }
    lines
}
