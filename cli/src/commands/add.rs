use std::path::Path;
use std::process;

use anyhow::{Context, Result, bail};
use tracing::debug;

use nutriscan_core::estimate::{EstimationError, EstimationGateway, InputMode};
use nutriscan_core::models::NutritionRecord;
use nutriscan_core::service::NutriService;

use crate::config::Config;

use super::helpers::{EntryView, json_error, mime_from_path};

pub(crate) async fn cmd_add(
    service: &mut NutriService,
    config: &Config,
    description: &str,
    json: bool,
) -> Result<()> {
    if description.trim().is_empty() {
        debug!("blank description, nothing to log");
        return Ok(());
    }

    let gateway = match config.gemini_client() {
        Ok(client) => EstimationGateway::new(client),
        Err(e) => estimation_failed(&e, InputMode::Text, json),
    };

    match service.log_text(&gateway, description).await {
        Ok(Some(record)) => print_logged(&record, json),
        Ok(None) => Ok(()),
        Err(e) => match e.downcast_ref::<EstimationError>() {
            Some(err) => estimation_failed(err, InputMode::Text, json),
            None => Err(e),
        },
    }
}

pub(crate) async fn cmd_scan(
    service: &mut NutriService,
    config: &Config,
    image: &Path,
    mime: Option<&str>,
    json: bool,
) -> Result<()> {
    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("Failed to read image: {}", image.display()))?;
    if bytes.is_empty() {
        bail!("Image file is empty: {}", image.display());
    }
    let mime = mime.unwrap_or_else(|| mime_from_path(image));
    debug!(path = %image.display(), mime, size = bytes.len(), "scanning image");

    let gateway = match config.gemini_client() {
        Ok(client) => EstimationGateway::new(client),
        Err(e) => estimation_failed(&e, InputMode::Image, json),
    };

    match service.log_image(&gateway, bytes, mime).await {
        Ok(Some(record)) => print_logged(&record, json),
        Ok(None) => Ok(()),
        Err(e) => match e.downcast_ref::<EstimationError>() {
            Some(err) => estimation_failed(err, InputMode::Image, json),
            None => Err(e),
        },
    }
}

/// Show the generic retry message and exit. The log keeps the detail.
fn estimation_failed(err: &EstimationError, mode: InputMode, json: bool) -> ! {
    let message = err.user_message(mode);
    if json {
        println!("{}", json_error(message));
    } else {
        eprintln!("{message}");
    }
    process::exit(1);
}

fn print_logged(record: &NutritionRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&EntryView::from(record))?);
    } else {
        println!("{}", logged_line(record));
        println!("  id: {}", record.id);
    }
    Ok(())
}

fn logged_line(r: &NutritionRecord) -> String {
    let name = &r.name;
    let serving = &r.serving_size;
    let (cal, p, c, f) = (r.calories, r.protein, r.carbs, r.fat);
    format!("Logged: {name} ({serving}) — {cal:.0} kcal | P:{p:.0}g C:{c:.0}g F:{f:.0}g")
}
