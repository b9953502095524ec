mod commands;
mod config;
mod gemini;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_add, cmd_delete, cmd_goal_reset, cmd_goal_set, cmd_goal_show, cmd_scan, cmd_summary,
    cmd_today,
};
use crate::config::Config;
use nutriscan_core::service::NutriService;

#[derive(Parser)]
#[command(
    name = "nutriscan",
    version,
    about = "Log what you eat from a description or a photo",
    long_about = "Log what you eat from a description or a photo.\n\n\
        Nutrition is estimated by a Gemini model (set GEMINI_API_KEY) and \
        tracked against your daily calorie and macro goals."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Describe a food and log its estimated nutrition
    Add {
        /// What you ate (e.g. "1 slice of pepperoni pizza")
        #[arg(required = true)]
        description: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log a food from a photo
    Scan {
        /// Image file (jpg, png, webp, heic, gif)
        image: PathBuf,
        /// MIME type of the image (default: guessed from the extension)
        #[arg(long)]
        mime: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List today's entries, most recent first
    Today {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show today's totals against your goal
    Summary {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an entry from today's log
    Delete {
        /// Entry ID, or a unique prefix of it
        entry_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or change your daily goal
    Goal {
        #[command(subcommand)]
        command: GoalCommands,
    },
}

#[derive(Subcommand)]
enum GoalCommands {
    /// Show the current daily goal
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set one goal field
    Set {
        /// Field: calories, protein, carbs, fat
        field: String,
        /// New value (whole number)
        #[arg(allow_hyphen_values = true)]
        value: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Restore the default goal (2000 kcal, 150g protein, 200g carbs, 70g fat)
    Reset {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Logs go to stderr so `--json` output stays clean. `LOG_FORMAT=json`
/// switches to structured lines.
fn init_tracing() {
    let filter = std::env::var("NUTRISCAN_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "warn".to_string());
    let env_filter = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    if json_logs {
        builder.json().with_target(false).init();
    } else {
        builder.with_target(false).compact().init();
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    debug!(db = %config.db_path.display(), model = %config.model, "starting");

    let mut service = NutriService::open(&config.db_path)?;
    debug!(issues = service.load_issues().len(), "state loaded");

    match cli.command {
        Commands::Add { description, json } => {
            cmd_add(&mut service, &config, &description.join(" "), json).await
        }
        Commands::Scan { image, mime, json } => {
            cmd_scan(&mut service, &config, &image, mime.as_deref(), json).await
        }
        Commands::Today { json } => cmd_today(&service, json),
        Commands::Summary { json } => cmd_summary(&service, json),
        Commands::Delete { entry_id, json } => cmd_delete(&mut service, &entry_id, json),
        Commands::Goal { command } => match command {
            GoalCommands::Show { json } => cmd_goal_show(&service, json),
            GoalCommands::Set { field, value, json } => {
                cmd_goal_set(&mut service, &field, &value, json)
            }
            GoalCommands::Reset { json } => cmd_goal_reset(&mut service, json),
        },
    }
}
