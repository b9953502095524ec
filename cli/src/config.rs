use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

use nutriscan_core::estimate::EstimationError;

use crate::gemini::{DEFAULT_API_BASE, DEFAULT_MODEL, GeminiClient};

pub struct Config {
    pub db_path: PathBuf,
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "nutriscan").context("Could not determine home directory")?;
        let config = Self::from_lookup(proj_dirs.data_dir().to_path_buf(), |name| {
            std::env::var(name).ok()
        });

        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create data directory: {}", parent.display())
            })?;
        }

        Ok(config)
    }

    /// Resolve settings from `var`, falling back to defaults rooted at `data_dir`.
    fn from_lookup(data_dir: PathBuf, var: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| var(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let db_path = non_empty("NUTRISCAN_DB")
            .map_or_else(|| data_dir.join("nutriscan.db"), PathBuf::from);

        Config {
            db_path,
            api_key: non_empty("GEMINI_API_KEY"),
            model: non_empty("NUTRISCAN_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_base: non_empty("NUTRISCAN_API_BASE")
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        }
    }

    pub fn gemini_client(&self) -> Result<GeminiClient, EstimationError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| EstimationError::NotConfigured("GEMINI_API_KEY is not set".to_string()))?;
        Ok(GeminiClient::new(key, &self.model)?.with_base_url(&self.api_base))
    }
}
