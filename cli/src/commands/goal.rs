use anyhow::Result;

use nutriscan_core::models::{DailyGoal, GoalField};
use nutriscan_core::service::NutriService;

fn goal_lines(goal: &DailyGoal) -> Vec<String> {
    GoalField::ALL
        .iter()
        .map(|&f| {
            let label = f.as_str();
            let value = goal.get(f);
            let unit = f.unit();
            format!("{label:<9}{value:>6} {unit}")
        })
        .collect()
}

fn print_goal(goal: &DailyGoal, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(goal)?);
    } else {
        println!("Daily goal:");
        for line in goal_lines(goal) {
            println!("  {line}");
        }
    }
    Ok(())
}

pub(crate) fn cmd_goal_show(service: &NutriService, json: bool) -> Result<()> {
    print_goal(service.goal(), json)
}

pub(crate) fn cmd_goal_set(
    service: &mut NutriService,
    field: &str,
    value: &str,
    json: bool,
) -> Result<()> {
    let field: GoalField = field.parse()?;
    let goal = service.update_goal(field, value)?;
    if json {
        return print_goal(&goal, true);
    }
    let stored = goal.get(field);
    let unit = field.unit();
    println!("{field} goal set to {stored} {unit}");
    Ok(())
}

pub(crate) fn cmd_goal_reset(service: &mut NutriService, json: bool) -> Result<()> {
    let goal = service.reset_goal()?;
    if !json {
        println!("Goal reset to defaults.");
    }
    print_goal(&goal, json)
}
