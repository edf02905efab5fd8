use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// File name of the database inside the data directory.
pub const DB_FILE_NAME: &str = "meal-planner.db";

pub struct Config {
    pub db_path: PathBuf,
}

impl Config {
    /// Resolve the database path. An explicit path (from `--db` or
    /// `MEALPLAN_DB`) wins over the platform data directory.
    pub fn load(db_override: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = db_override {
            return Self::with_db_path(path);
        }

        let proj_dirs =
            ProjectDirs::from("", "", "mealplan").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Config {
            db_path: data_dir.join(DB_FILE_NAME),
        })
    }

    fn with_db_path(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir(parent)?;
        }
        Ok(Config { db_path })
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create data directory: {}", dir.display()))
}
