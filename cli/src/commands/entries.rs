use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nutriscan_core::food_log::FoodLog;
use nutriscan_core::service::NutriService;

use super::helpers::{
    EntryView, NOTE_NUTRIENTS, format_nutrients, format_time, json_error, no_neg_zero,
    resolve_entry_id, truncate,
};

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Serving")]
    serving: String,
    #[tabled(rename = "Cal")]
    calories: String,
    #[tabled(rename = "P")]
    protein: String,
    #[tabled(rename = "C")]
    carbs: String,
    #[tabled(rename = "F")]
    fat: String,
    #[tabled(rename = "Notes")]
    notes: String,
}

fn entry_rows(log: &FoodLog) -> Vec<EntryRow> {
    log.recent_first()
        .map(|e| {
            let mut name = truncate(&e.name, 30);
            if e.is_from_image() {
                name.push_str(" [photo]");
            }
            EntryRow {
                time: format_time(e.timestamp),
                id: e.id.chars().take(8).collect(),
                name,
                serving: truncate(&e.serving_size, 20),
                calories: format!("{:.0}", no_neg_zero(e.calories)),
                protein: format!("{:.1}", no_neg_zero(e.protein)),
                carbs: format!("{:.1}", no_neg_zero(e.carbs)),
                fat: format!("{:.1}", no_neg_zero(e.fat)),
                notes: format_nutrients(&e.additional_nutrients, NOTE_NUTRIENTS),
            }
        })
        .collect()
}

pub(crate) fn cmd_today(service: &NutriService, json: bool) -> Result<()> {
    let log = service.log();

    if json {
        let views: Vec<EntryView> = log.recent_first().map(EntryView::from).collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    if log.is_empty() {
        eprintln!("No meals logged today.");
        eprintln!("Try: nutriscan add \"2 boiled eggs\"  or  nutriscan scan lunch.jpg");
        process::exit(2);
    }

    let count = log.len();
    println!("Recent Activity ({count} items)\n");
    let table = Table::new(entry_rows(log))
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..8)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_delete(service: &mut NutriService, entry_id: &str, json: bool) -> Result<()> {
    let Some(id) = resolve_entry_id(service.log(), entry_id) else {
        let message = format!("Entry {entry_id} not found");
        if json {
            println!("{}", json_error(&message));
        } else {
            eprintln!("{message}");
        }
        process::exit(2);
    };

    let removed = service.remove_entry(&id)?;
    if json {
        #[derive(serde::Serialize)]
        struct Deleted<'a> {
            deleted: &'a str,
        }
        println!("{}", serde_json::to_string(&Deleted { deleted: &id })?);
    } else if let Some(record) = removed {
        println!("Deleted {} ({})", record.name, record.id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use nutriscan_core::db::Database;
    use nutriscan_core::models::{Nutrient, NutritionRecord};

    fn record(id: &str, name: &str, timestamp: i64) -> NutritionRecord {
        NutritionRecord {
            id: id.to_string(),
            name: name.to_string(),
            calories: 210.0,
            protein: 12.0,
            carbs: 20.0,
            fat: -0.0,
            fiber: 0.0,
            sugar: 0.0,
            serving_size: "1 cup".to_string(),
            additional_nutrients: (1..=5)
                .map(|i| Nutrient {
                    name: format!("N{i}"),
                    amount: format!("{i}mg"),
                })
                .collect(),
            timestamp,
            image: None,
        }
    }

    #[test]
    fn test_entry_rows_recent_first() {
        let db = Database::open_in_memory().unwrap();
        let mut log = FoodLog::load(&db).value;
        let now = Local::now().timestamp_millis();
        log.add(&db, record("11111111-aaaa", "Oatmeal", now - 1000))
            .unwrap();
        let mut photo = record("22222222-bbbb", "Ramen", now);
        photo.image = Some("data:image/jpeg;base64,AA==".to_string());
        log.add(&db, photo).unwrap();

        let rows = entry_rows(&log);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Ramen [photo]");
        assert_eq!(rows[0].id, "22222222");
        assert_eq!(rows[1].name, "Oatmeal");
        assert_eq!(rows[1].fat, "0.0");
        assert_eq!(rows[1].notes, "N1: 1mg, N2: 2mg, N3: 3mg");
    }
}
